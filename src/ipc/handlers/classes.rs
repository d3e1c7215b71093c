use crate::db;
use crate::ipc::error::{db_conn, require_class, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

fn classes_list(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let classes = db::classes_list(conn)?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let code = required_str(params, "code")?;
    let term = required_str(params, "term")?;
    let class = db::class_insert(conn, &name, &code, &term)?;
    tracing::info!(class_id = %class.id, code = %class.code, "class created");
    Ok(json!({ "class": class }))
}

fn classes_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let class = require_class(conn, &class_id)?;
    let student_count = db::students_count(conn, &class_id)?;
    let session_count = db::sessions_list(conn, &class_id, true)?.len();
    Ok(json!({
        "class": class,
        "studentCount": student_count,
        "sessionCount": session_count
    }))
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, db_conn(state).and_then(classes_list))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| classes_create(conn, &req.params)),
    )
}

fn handle_classes_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| classes_open(conn, &req.params)),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.open" => Some(handle_classes_open(state, req)),
        _ => None,
    }
}
