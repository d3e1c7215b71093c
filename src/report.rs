use crate::attendance::{self, AttendanceStatus, AttendanceSummary};
use crate::db::{self, GradeRow, SessionRow, StudentRow};
use crate::error::{ClassbookError, Result};
use crate::grades::{self, GradeStats};
use crate::xlsx::{self, Cell};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Every class exports under the same file name.
pub const REPORT_FILE_NAME: &str = "class-report.xlsx";
pub const REPORT_SHEET_NAME: &str = "Class Report";

const IDENTITY_COLUMNS: [&str; 4] = ["Student ID", "First Name", "Last Name", "Email"];
const GRADE_COLUMNS: [&str; 4] = ["Midterm", "Final", "Activity", "Total"];

#[derive(Debug, Clone, PartialEq)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Session dates in session order, each date once.
fn date_columns(sessions: &[SessionRow]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for s in sessions {
        if !out.contains(&s.date) {
            out.push(s.date.clone());
        }
    }
    out
}

/// Flattens the class into one row per student. `statuses` is keyed by
/// `(session id, student row id)`; a missing pair exports as absent. When two
/// sessions share a date the later one fills the column.
pub fn assemble(
    students: &[StudentRow],
    sessions: &[SessionRow],
    statuses: &HashMap<(String, String), AttendanceStatus>,
    grade_rows: &[GradeRow],
) -> ReportTable {
    let dates = date_columns(sessions);
    let mut columns: Vec<String> = IDENTITY_COLUMNS.iter().map(|c| c.to_string()).collect();
    columns.extend(dates.iter().cloned());
    columns.extend(GRADE_COLUMNS.iter().map(|c| c.to_string()));

    let by_student: HashMap<&str, &GradeRow> = grade_rows
        .iter()
        .map(|g| (g.student_id.as_str(), g))
        .collect();

    let rows = students
        .iter()
        .map(|s| {
            let mut by_date: HashMap<&str, AttendanceStatus> = HashMap::new();
            for sess in sessions {
                let status = statuses
                    .get(&(sess.id.clone(), s.id.clone()))
                    .copied()
                    .unwrap_or(AttendanceStatus::Absent);
                by_date.insert(sess.date.as_str(), status);
            }

            let mut row: Vec<Cell> = vec![
                Cell::from(s.student_id.as_str()),
                Cell::from(s.first_name.as_str()),
                Cell::from(s.last_name.as_str()),
                Cell::from(s.email.clone().unwrap_or_default()),
            ];
            for d in &dates {
                let status = by_date
                    .get(d.as_str())
                    .copied()
                    .unwrap_or(AttendanceStatus::Absent);
                row.push(Cell::from(status.as_str()));
            }

            let (m, f, a) = by_student
                .get(s.id.as_str())
                .map(|g| (g.midterm, g.final_exam, g.activity))
                .unwrap_or((0.0, 0.0, 0.0));
            row.push(Cell::from(m));
            row.push(Cell::from(f));
            row.push(Cell::from(a));
            row.push(Cell::from(grades::total(m, f, a)));
            row
        })
        .collect();

    ReportTable { columns, rows }
}

/// Reads everything the report needs. Each `(student, session)` status is
/// its own lookup; results are joined by key.
pub fn build(conn: &Connection, class_id: &str) -> Result<ReportTable> {
    let students = db::students_list(conn, class_id)?;
    let sessions = db::sessions_list(conn, class_id, false)?;
    let grade_rows = db::grades_for_class(conn, class_id)?;

    let mut statuses = HashMap::new();
    for s in &students {
        for sess in &sessions {
            if let Some(status) = db::attendance_status(conn, &sess.id, &s.id)? {
                statuses.insert((sess.id.clone(), s.id.clone()), status);
            }
        }
    }
    Ok(assemble(&students, &sessions, &statuses, &grade_rows))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub path: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

/// Writes `class-report.xlsx` into `out_dir`. Nothing is written if any
/// read fails.
pub fn export(conn: &Connection, class_id: &str, out_dir: &Path) -> Result<ExportSummary> {
    let table = build(conn, class_id)?;
    let out_path: PathBuf = out_dir.join(REPORT_FILE_NAME);
    xlsx::write_workbook(&out_path, REPORT_SHEET_NAME, &table.columns, &table.rows)
        .map_err(|e| ClassbookError::Export(format!("{e:#}")))?;
    tracing::info!(
        class_id,
        rows = table.rows.len(),
        path = %out_path.to_string_lossy(),
        "class report exported"
    );
    Ok(ExportSummary {
        path: out_path.to_string_lossy().to_string(),
        row_count: table.rows.len(),
        columns: table.columns,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub total_students: i64,
    pub avg_attendance: u32,
    pub avg_grade: u32,
    pub attendance: AttendanceSummary,
    pub grades: GradeStats,
}

pub fn class_summary(conn: &Connection, class_id: &str) -> Result<ClassSummary> {
    let total_students = db::students_count(conn, class_id)?;
    let attendance = attendance::class_summary(conn, class_id)?;
    let grades = grades::class_stats(conn, class_id)?;
    Ok(ClassSummary {
        total_students,
        avg_attendance: attendance.rate_percent,
        avg_grade: grades.average,
        attendance,
        grades,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(id: &str, code: &str, email: Option<&str>) -> StudentRow {
        StudentRow {
            id: id.into(),
            class_id: "c1".into(),
            student_id: code.into(),
            first_name: format!("First{code}"),
            last_name: format!("Last{code}"),
            email: email.map(str::to_string),
        }
    }

    fn session(id: &str, date: &str) -> SessionRow {
        SessionRow {
            id: id.into(),
            class_id: "c1".into(),
            date: date.into(),
        }
    }

    #[test]
    fn missing_records_export_as_absent() {
        let students = vec![student("s1", "S001", None)];
        let sessions = vec![session("a", "2026-03-01"), session("b", "2026-03-02")];
        let table = assemble(&students, &sessions, &HashMap::new(), &[]);
        assert_eq!(
            table.columns,
            vec![
                "Student ID",
                "First Name",
                "Last Name",
                "Email",
                "2026-03-01",
                "2026-03-02",
                "Midterm",
                "Final",
                "Activity",
                "Total"
            ]
        );
        let row = &table.rows[0];
        assert_eq!(row[3], Cell::from(""));
        assert_eq!(row[4], Cell::from("absent"));
        assert_eq!(row[5], Cell::from("absent"));
        assert_eq!(row[9], Cell::Number(0.0));
    }

    #[test]
    fn statuses_and_grades_join_by_key() {
        let students = vec![
            student("s1", "S001", Some("a@x.org")),
            student("s2", "S002", None),
        ];
        let sessions = vec![session("a", "2026-03-01"), session("b", "2026-03-02")];
        let mut statuses = HashMap::new();
        statuses.insert(("b".to_string(), "s2".to_string()), AttendanceStatus::Late);
        statuses.insert(("a".to_string(), "s1".to_string()), AttendanceStatus::Present);
        let grade_rows = vec![GradeRow {
            student_id: "s2".into(),
            midterm: 20.0,
            final_exam: 30.0,
            activity: 10.5,
        }];
        let table = assemble(&students, &sessions, &statuses, &grade_rows);
        assert_eq!(table.rows[0][3], Cell::from("a@x.org"));
        assert_eq!(table.rows[0][4], Cell::from("present"));
        assert_eq!(table.rows[0][5], Cell::from("absent"));
        assert_eq!(table.rows[1][4], Cell::from("absent"));
        assert_eq!(table.rows[1][5], Cell::from("late"));
        assert_eq!(table.rows[1][9], Cell::Number(60.5));
    }

    #[test]
    fn sessions_on_the_same_date_share_a_column() {
        let students = vec![student("s1", "S001", None)];
        let sessions = vec![session("a", "2026-03-01"), session("b", "2026-03-01")];
        let mut statuses = HashMap::new();
        statuses.insert(("a".to_string(), "s1".to_string()), AttendanceStatus::Present);
        let table = assemble(&students, &sessions, &statuses, &[]);
        assert_eq!(table.columns.len(), 9);
        // Session b is later and has no record.
        assert_eq!(table.rows[0][4], Cell::from("absent"));
    }

    #[test]
    fn empty_class_summary_has_no_division_by_zero() {
        let conn = db::open_in_memory();
        let class = db::class_insert(&conn, "Empty", "E0", "Fall").expect("class");
        let s = class_summary(&conn, &class.id).expect("summary");
        assert_eq!(s.total_students, 0);
        assert_eq!(s.avg_attendance, 0);
        assert_eq!(s.avg_grade, 0);

        let table = build(&conn, &class.id).expect("build");
        assert!(table.rows.is_empty());
        assert_eq!(table.columns.len(), 8);
    }

    #[test]
    fn build_reads_per_pair_statuses_from_store() {
        let conn = db::open_in_memory();
        let class = db::class_insert(&conn, "Art", "A1", "Fall").expect("class");
        let s2 = db::student_insert(&conn, &class.id, "S002", "Bo", "Kim", None).expect("s2");
        let s1 = db::student_insert(&conn, &class.id, "S001", "Ana", "Lee", None).expect("s1");
        let a = db::session_insert(&conn, &class.id, "2026-03-02").expect("a");
        let b = db::session_insert(&conn, &class.id, "2026-03-01").expect("b");
        db::attendance_replace(&conn, &a.id, &[(s1.id.clone(), AttendanceStatus::Late)])
            .expect("attendance");

        let table = build(&conn, &class.id).expect("build");
        assert_eq!(table.columns[4], b.date);
        assert_eq!(table.columns[5], a.date);
        assert_eq!(table.rows[0][0], Cell::from("S001"));
        assert_eq!(table.rows[0][5], Cell::from("late"));
        assert_eq!(table.rows[1][0], Cell::from(s2.student_id.as_str()));
        assert_eq!(table.rows[1][4], Cell::from("absent"));
        assert_eq!(table.rows[1][5], Cell::from("absent"));
    }
}
