pub mod attendance;
pub mod classes;
pub mod core;
pub mod grades;
pub mod reports;
pub mod students;
