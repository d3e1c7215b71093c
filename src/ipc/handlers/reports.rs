use crate::ipc::error::{db_conn, optional_str, require_class, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report;
use serde_json::json;
use std::path::PathBuf;

fn reports_class_summary(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    let class = require_class(conn, &class_id)?;
    let summary = report::class_summary(conn, &class_id)?;
    Ok(json!({ "class": class, "summary": summary }))
}

/// Writes into `outDir` when given, otherwise into the workspace folder.
fn reports_export_class(state: &AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let class_id = required_str(params, "classId")?;
    require_class(conn, &class_id)?;
    let out_dir = match optional_str(params, "outDir") {
        Some(dir) => PathBuf::from(dir),
        None => state
            .workspace
            .clone()
            .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?,
    };
    let summary = report::export(conn, &class_id, &out_dir)?;
    Ok(json!(summary))
}

fn handle_reports_class_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, reports_class_summary(state, &req.params))
}

fn handle_reports_export_class(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, reports_export_class(state, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.classSummary" => Some(handle_reports_class_summary(state, req)),
        "reports.exportClass" => Some(handle_reports_export_class(state, req)),
        _ => None,
    }
}
