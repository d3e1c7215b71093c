//! Attendance statuses, the entry sheet and per-session aggregation.
//!
//! Missing records are treated differently depending on the caller:
//! the entry sheet and the export default them to `absent`, while the
//! aggregate counts only look at records that exist.

use crate::db::{self, SessionRow, StudentRow};
use crate::error::Result;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(AttendanceStatus::Present),
            "absent" => Some(AttendanceStatus::Absent),
            "late" => Some(AttendanceStatus::Late),
            _ => None,
        }
    }
}

impl ToSql for AttendanceStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AttendanceStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        AttendanceStatus::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown attendance status: {s}").into()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.absent + self.late
    }

    /// Late arrivals count as attended.
    pub fn attended(&self) -> usize {
        self.present + self.late
    }
}

pub fn tally<I>(records: I) -> StatusCounts
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut counts = StatusCounts::default();
    for s in records {
        counts.add(s);
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTally {
    pub session_id: String,
    pub date: String,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub sessions: Vec<SessionTally>,
    pub total_records: usize,
    pub attended: usize,
    pub rate_percent: u32,
}

/// `round(attended / total * 100)`, or 0 when nothing was recorded.
pub fn rate_percent(attended: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((attended as f64 / total as f64) * 100.0).round() as u32
}

/// Aggregates the records that exist for each session. Students without a
/// record are not counted as absent here.
pub fn summarize(
    sessions: &[SessionRow],
    records_by_session: &HashMap<String, Vec<AttendanceStatus>>,
) -> AttendanceSummary {
    let mut out = Vec::with_capacity(sessions.len());
    let mut total_records = 0usize;
    let mut attended = 0usize;
    for s in sessions {
        let counts = records_by_session
            .get(&s.id)
            .map(|recs| tally(recs.iter().copied()))
            .unwrap_or_default();
        total_records += counts.total();
        attended += counts.attended();
        out.push(SessionTally {
            session_id: s.id.clone(),
            date: s.date.clone(),
            counts,
        });
    }
    AttendanceSummary {
        sessions: out,
        total_records,
        attended,
        rate_percent: rate_percent(attended, total_records),
    }
}

/// Loads the class's sessions (oldest first) with their stored records and
/// aggregates them.
pub fn class_summary(conn: &Connection, class_id: &str) -> Result<AttendanceSummary> {
    let sessions = db::sessions_list(conn, class_id, false)?;
    let mut records_by_session = HashMap::new();
    for s in &sessions {
        let recs = db::attendance_for_session(conn, &s.id)?
            .into_iter()
            .map(|(_, status)| status)
            .collect::<Vec<_>>();
        records_by_session.insert(s.id.clone(), recs);
    }
    Ok(summarize(&sessions, &records_by_session))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRow {
    pub id: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub status: AttendanceStatus,
}

/// The sheet shown when taking attendance: every student starts absent and
/// stored records override.
pub fn entry_sheet(students: &[StudentRow], records: &[(String, AttendanceStatus)]) -> Vec<EntryRow> {
    let stored: HashMap<&str, AttendanceStatus> = records
        .iter()
        .map(|(id, status)| (id.as_str(), *status))
        .collect();
    students
        .iter()
        .map(|s| EntryRow {
            id: s.id.clone(),
            student_id: s.student_id.clone(),
            first_name: s.first_name.clone(),
            last_name: s.last_name.clone(),
            status: stored
                .get(s.id.as_str())
                .copied()
                .unwrap_or(AttendanceStatus::Absent),
        })
        .collect()
}

/// A filled-in attendance sheet waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct AttendanceSubmission {
    pub session_id: String,
    pub records: Vec<(String, AttendanceStatus)>,
}

/// Replaces the session's stored records with the submission.
pub fn save(conn: &Connection, submission: &AttendanceSubmission) -> Result<usize> {
    let n = db::attendance_replace(conn, &submission.session_id, &submission.records)?;
    tracing::info!(session_id = %submission.session_id, records = n, "attendance saved");
    Ok(n)
}
