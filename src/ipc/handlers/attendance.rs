use crate::attendance::{self, AttendanceStatus, AttendanceSubmission};
use crate::db::{self, SessionRow};
use crate::ipc::error::{db_conn, optional_str, require_class, required_array, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashSet;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn today() -> String {
    chrono::Local::now().date_naive().format(DATE_FORMAT).to_string()
}

fn parse_date(raw: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map(|d| d.format(DATE_FORMAT).to_string())
        .map_err(|_| {
            HandlerErr::bad_params("date must be YYYY-MM-DD").with_details(json!({ "date": raw }))
        })
}

fn require_session(conn: &Connection, session_id: &str) -> Result<SessionRow, HandlerErr> {
    db::session_get(conn, session_id)?.ok_or_else(|| {
        HandlerErr::not_found("session not found").with_details(json!({ "sessionId": session_id }))
    })
}

fn sessions_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    require_class(conn, &class_id)?;
    let sessions = db::sessions_list(conn, &class_id, true)?;
    Ok(json!({ "sessions": sessions }))
}

fn sessions_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let date = match optional_str(params, "date") {
        Some(raw) => parse_date(&raw)?,
        None => today(),
    };
    require_class(conn, &class_id)?;
    let session = db::session_insert(conn, &class_id, &date)?;
    tracing::info!(class_id = %class_id, date = %session.date, "session created");
    Ok(json!({ "session": session }))
}

fn attendance_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = required_str(params, "sessionId")?;
    let session = require_session(conn, &session_id)?;
    let students = db::students_list(conn, &session.class_id)?;
    let records = db::attendance_for_session(conn, &session.id)?;
    let rows = attendance::entry_sheet(&students, &records);
    Ok(json!({ "session": session, "rows": rows }))
}

/// Every record must name a student of the session's class and a known
/// status. Repeated ids keep the last status.
fn submission_records(
    values: &[serde_json::Value],
    roster: &HashSet<String>,
) -> Result<Vec<(String, AttendanceStatus)>, HandlerErr> {
    let mut out: Vec<(String, AttendanceStatus)> = Vec::with_capacity(values.len());
    for (index, v) in values.iter().enumerate() {
        let id = v
            .get("id")
            .and_then(|x| x.as_str())
            .ok_or_else(|| HandlerErr::bad_params("record missing id").with_details(json!({ "index": index })))?;
        let raw_status = v.get("status").and_then(|x| x.as_str()).unwrap_or("");
        let Some(status) = AttendanceStatus::parse(raw_status) else {
            return Err(HandlerErr::bad_params("status must be present, absent or late")
                .with_details(json!({ "index": index, "status": raw_status })));
        };
        if !roster.contains(id) {
            return Err(HandlerErr::bad_params("student is not in this class")
                .with_details(json!({ "index": index, "id": id })));
        }
        match out.iter_mut().find(|(sid, _)| sid == id) {
            Some(existing) => existing.1 = status,
            None => out.push((id.to_string(), status)),
        }
    }
    Ok(out)
}

fn attendance_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = required_str(params, "sessionId")?;
    let values = required_array(params, "records")?;
    let session = require_session(conn, &session_id)?;
    let roster = db::students_list(conn, &session.class_id)?
        .into_iter()
        .map(|s| s.id)
        .collect::<HashSet<_>>();

    let submission = AttendanceSubmission {
        session_id: session.id,
        records: submission_records(values, &roster)?,
    };
    let saved = attendance::save(conn, &submission)?;
    Ok(json!({ "saved": saved }))
}

fn handle_sessions_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| sessions_list(conn, &req.params)),
    )
}

fn handle_sessions_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| sessions_create(conn, &req.params)),
    )
}

fn handle_attendance_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| attendance_open(conn, &req.params)),
    )
}

fn handle_attendance_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(
        &req.id,
        db_conn(state).and_then(|conn| attendance_save(conn, &req.params)),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "sessions.list" => Some(handle_sessions_list(state, req)),
        "sessions.create" => Some(handle_sessions_create(state, req)),
        "attendance.open" => Some(handle_attendance_open(state, req)),
        "attendance.save" => Some(handle_attendance_save(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_must_be_iso_calendar_days() {
        assert_eq!(parse_date("2026-02-28").expect("valid"), "2026-02-28");
        assert!(parse_date("2026-02-30").is_err());
        assert!(parse_date("02/03/2026").is_err());
        assert_eq!(today().len(), 10);
    }

    #[test]
    fn records_are_validated_against_roster() {
        let roster: HashSet<String> = ["s1".to_string(), "s2".to_string()].into_iter().collect();
        let ok = submission_records(
            &[
                json!({ "id": "s1", "status": "present" }),
                json!({ "id": "s2", "status": "late" }),
                json!({ "id": "s1", "status": "absent" }),
            ],
            &roster,
        )
        .expect("valid");
        assert_eq!(
            ok,
            vec![
                ("s1".to_string(), AttendanceStatus::Absent),
                ("s2".to_string(), AttendanceStatus::Late)
            ]
        );

        let e = submission_records(&[json!({ "id": "s1", "status": "excused" })], &roster)
            .expect_err("bad status");
        assert_eq!(e.code, "bad_params");
        let e = submission_records(&[json!({ "id": "s9", "status": "present" })], &roster)
            .expect_err("outsider");
        assert_eq!(e.code, "bad_params");
    }
}
