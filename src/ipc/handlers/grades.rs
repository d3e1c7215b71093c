use crate::db::{self, GradeRow};
use crate::grades::{self, GradeSubmission};
use crate::ipc::error::{db_conn, require_class, required_array, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;

fn grades_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    require_class(conn, &class_id)?;
    let students = db::students_list(conn, &class_id)?;
    let stored = db::grades_for_class(conn, &class_id)?;
    Ok(json!({ "rows": grades::grade_sheet(&students, &stored) }))
}

fn component(row: &serde_json::Value, key: &str) -> f64 {
    grades::clamp_component(row.get(key).unwrap_or(&serde_json::Value::Null))
}

fn grades_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let values = required_array(params, "grades")?;
    require_class(conn, &class_id)?;
    let roster = db::students_list(conn, &class_id)?
        .into_iter()
        .map(|s| s.id)
        .collect::<HashSet<_>>();

    let mut rows = Vec::with_capacity(values.len());
    for (index, v) in values.iter().enumerate() {
        let Some(id) = v.get("id").and_then(|x| x.as_str()) else {
            return Err(HandlerErr::bad_params("grade row missing id").with_details(json!({ "index": index })));
        };
        if !roster.contains(id) {
            return Err(HandlerErr::bad_params("student is not in this class")
                .with_details(json!({ "index": index, "id": id })));
        }
        rows.push(GradeRow {
            student_id: id.to_string(),
            midterm: component(v, "midterm"),
            final_exam: component(v, "final"),
            activity: component(v, "activity"),
        });
    }

    let saved = grades::save(conn, &GradeSubmission { class_id, rows })?;
    Ok(json!({ "saved": saved }))
}

fn handle_grades_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| grades_open(conn, &req.params)),
    )
}

fn handle_grades_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| grades_save(conn, &req.params)),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.open" => Some(handle_grades_open(state, req)),
        "grades.save" => Some(handle_grades_save(state, req)),
        _ => None,
    }
}
