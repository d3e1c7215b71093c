use thiserror::Error;

/// Failures of the import, aggregation and export workflows.
///
/// Import-side variants are reported once per upload; `Store` aborts only the
/// operation that hit it and carries the store's message verbatim.
#[derive(Debug, Error)]
pub enum ClassbookError {
    #[error("unsupported file format: {0} (expected .xlsx, .xls or .csv)")]
    UnsupportedFormat(String),
    #[error("could not read spreadsheet: {0}")]
    Parse(String),
    #[error("no valid rows found (studentId, firstName and lastName are required)")]
    NoValidRows,
    #[error("{0}")]
    Store(String),
    #[error("could not write report: {0}")]
    Export(String),
}

impl ClassbookError {
    pub fn code(&self) -> &'static str {
        match self {
            ClassbookError::UnsupportedFormat(_) => "unsupported_format",
            ClassbookError::Parse(_) => "parse_failed",
            ClassbookError::NoValidRows => "no_valid_rows",
            ClassbookError::Store(_) => "store_failed",
            ClassbookError::Export(_) => "export_failed",
        }
    }
}

impl From<rusqlite::Error> for ClassbookError {
    fn from(e: rusqlite::Error) -> Self {
        ClassbookError::Store(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClassbookError>;
