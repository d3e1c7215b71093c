use crate::db::{self, StudentRow};
use crate::error::ClassbookError;
use crate::ipc::error::{db_conn, optional_str, require_class, required_array, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::roster::{self, PreviewRow, StagedImport};
use crate::spreadsheet;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

/// Case-insensitive substring match against "code first last email".
fn matches_search(s: &StudentRow, needle: &str) -> bool {
    format!(
        "{} {} {} {}",
        s.student_id,
        s.first_name,
        s.last_name,
        s.email.as_deref().unwrap_or("")
    )
    .to_lowercase()
    .contains(needle)
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    require_class(conn, &class_id)?;
    let mut students = db::students_list(conn, &class_id)?;
    if let Some(search) = optional_str(params, "search") {
        let needle = search.to_lowercase();
        students.retain(|s| matches_search(s, &needle));
    }
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let student_id = required_str(params, "studentId")?;
    let first_name = required_str(params, "firstName")?;
    let last_name = required_str(params, "lastName")?;
    let email = optional_str(params, "email");
    require_class(conn, &class_id)?;

    let student = db::student_insert(
        conn,
        &class_id,
        &student_id,
        &first_name,
        &last_name,
        email.as_deref(),
    )?;
    tracing::info!(class_id = %class_id, student_id = %student.student_id, "student added");
    Ok(json!({ "student": student }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let id = required_str(params, "id")?;
    if db::student_delete(conn, &id)? == 0 {
        return Err(HandlerErr::not_found("student not found").with_details(json!({ "id": id })));
    }
    tracing::info!(id = %id, "student deleted");
    Ok(json!({ "ok": true }))
}

fn students_import_preview(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let in_path = PathBuf::from(required_str(params, "inPath")?);
    require_class(conn, &class_id)?;

    let raw = spreadsheet::read_upload(&in_path)?;
    let staged = roster::stage(&class_id, &raw)?;
    let rows = roster::preview(conn, &staged)?;
    Ok(json!({
        "rows": rows,
        "rowsTotal": raw.len(),
        "rowsValid": staged.rows.len()
    }))
}

/// Confirmed rows come back from the caller, so they are trimmed and checked
/// again. A blank email is stored as no email.
fn confirmed_rows(values: &[serde_json::Value]) -> Result<Vec<PreviewRow>, HandlerErr> {
    let mut rows = Vec::with_capacity(values.len());
    for (index, v) in values.iter().enumerate() {
        let row: PreviewRow = serde_json::from_value(v.clone()).map_err(|e| {
            HandlerErr::bad_params(format!("invalid row: {}", e)).with_details(json!({ "index": index }))
        })?;
        let row = PreviewRow {
            student_id: row.student_id.trim().to_string(),
            first_name: row.first_name.trim().to_string(),
            last_name: row.last_name.trim().to_string(),
            email: row
                .email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        };
        if !row.is_complete() {
            return Err(HandlerErr::bad_params(
                "studentId, firstName and lastName are required",
            )
            .with_details(json!({ "index": index })));
        }
        rows.push(row);
    }
    Ok(rows)
}

fn students_import_confirm(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let rows = confirmed_rows(required_array(params, "rows")?)?;
    require_class(conn, &class_id)?;
    if rows.is_empty() {
        return Err(ClassbookError::NoValidRows.into());
    }

    let summary = roster::commit(conn, &StagedImport { class_id, rows })?;
    Ok(json!(summary))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| students_list(conn, &req.params)),
    )
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| students_create(conn, &req.params)),
    )
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| students_delete(conn, &req.params)),
    )
}

fn handle_students_import_preview(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| students_import_preview(conn, &req.params)),
    )
}

fn handle_students_import_confirm(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| students_import_confirm(conn, &req.params)),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.importPreview" => Some(handle_students_import_preview(state, req)),
        "students.importConfirm" => Some(handle_students_import_confirm(state, req)),
        _ => None,
    }
}
