//! Roster import: raw spreadsheet rows -> staged rows -> committed roster.
//!
//! Staging never writes. The staged rows go back to the caller for a
//! preview and come back in the confirm step, which upserts them keyed by
//! `(class, student_id)`.

use crate::db;
use crate::error::{ClassbookError, Result};
use crate::spreadsheet::{RawRow, RawValue};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const STUDENT_ID_ALIASES: &[&str] = &["studentId", "Student ID", "student_id"];
const FIRST_NAME_ALIASES: &[&str] = &["firstName", "First Name", "first_name"];
const LAST_NAME_ALIASES: &[&str] = &["lastName", "Last Name", "last_name"];
const EMAIL_ALIASES: &[&str] = &["email", "Email"];

/// A normalized import candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl PreviewRow {
    pub fn is_complete(&self) -> bool {
        !self.student_id.is_empty() && !self.first_name.is_empty() && !self.last_name.is_empty()
    }
}

/// Rows staged for one class, waiting for confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedImport {
    pub class_id: String,
    pub rows: Vec<PreviewRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    New,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedRow {
    #[serde(flatten)]
    pub row: PreviewRow,
    pub status: RowAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub imported: usize,
    pub created: usize,
    pub updated: usize,
}

/// First alias holding a filled-in value wins.
fn pick(row: &RawRow, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|a| row.get(*a))
        .find(|v| RawValue::is_truthy(v))
        .map(RawValue::to_text)
}

pub fn normalize_row(row: &RawRow) -> Option<PreviewRow> {
    let candidate = PreviewRow {
        student_id: pick(row, STUDENT_ID_ALIASES).unwrap_or_default(),
        first_name: pick(row, FIRST_NAME_ALIASES).unwrap_or_default(),
        last_name: pick(row, LAST_NAME_ALIASES).unwrap_or_default(),
        email: pick(row, EMAIL_ALIASES),
    };
    candidate.is_complete().then_some(candidate)
}

/// Normalizes every row, silently dropping incomplete ones. Fails only when
/// nothing survives.
pub fn stage(class_id: &str, raw: &[RawRow]) -> Result<StagedImport> {
    let rows: Vec<PreviewRow> = raw.iter().filter_map(normalize_row).collect();
    if rows.is_empty() {
        return Err(ClassbookError::NoValidRows);
    }
    tracing::debug!(
        class_id,
        rows_total = raw.len(),
        rows_staged = rows.len(),
        "roster rows staged"
    );
    Ok(StagedImport {
        class_id: class_id.to_string(),
        rows,
    })
}

/// Marks each staged row as a new entry or an overwrite of an existing one.
/// A code repeated inside the batch is an update after its first occurrence.
pub fn annotate(staged: &StagedImport, existing_codes: &HashSet<String>) -> Vec<AnnotatedRow> {
    let mut seen = existing_codes.clone();
    staged
        .rows
        .iter()
        .map(|row| {
            let status = if seen.insert(row.student_id.clone()) {
                RowAction::New
            } else {
                RowAction::Update
            };
            AnnotatedRow {
                row: row.clone(),
                status,
            }
        })
        .collect()
}

pub fn preview(conn: &Connection, staged: &StagedImport) -> Result<Vec<AnnotatedRow>> {
    let existing = db::students_list(conn, &staged.class_id)?
        .into_iter()
        .map(|s| s.student_id)
        .collect::<HashSet<_>>();
    Ok(annotate(staged, &existing))
}

/// Upserts every staged row in one transaction. Duplicate codes in the batch
/// resolve to the last row.
pub fn commit(conn: &Connection, staged: &StagedImport) -> Result<CommitSummary> {
    let before = db::students_count(conn, &staged.class_id)?;
    let tx = conn.unchecked_transaction()?;
    for row in &staged.rows {
        db::student_upsert(
            &tx,
            &staged.class_id,
            &row.student_id,
            &row.first_name,
            &row.last_name,
            row.email.as_deref(),
        )?;
    }
    tx.commit()?;
    let after = db::students_count(conn, &staged.class_id)?;

    let created = (after - before).max(0) as usize;
    let summary = CommitSummary {
        imported: staged.rows.len(),
        created,
        updated: staged.rows.len() - created,
    };
    tracing::info!(
        class_id = %staged.class_id,
        imported = summary.imported,
        created = summary.created,
        "roster import committed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::parse_upload;

    fn raw(pairs: &[(&str, RawValue)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn drops_rows_missing_required_fields() {
        let rows = parse_upload(
            "roster.csv",
            b"Student ID,First Name,Last Name\nS001,Ana,Lee\nS002,,Kim\n".to_vec(),
        )
        .expect("parse");
        let staged = stage("c1", &rows).expect("stage");
        assert_eq!(staged.rows.len(), 1);
        assert_eq!(staged.rows[0].student_id, "S001");
        assert_eq!(staged.rows[0].email, None);
    }

    #[test]
    fn alias_priority_and_falsy_fallthrough() {
        let row = raw(&[
            ("studentId", text("A1")),
            ("Student ID", text("B2")),
            ("firstName", RawValue::Number(0.0)),
            ("First Name", text("Ana")),
            ("last_name", text("Lee")),
            ("Email", text("ana@example.com")),
        ]);
        let r = normalize_row(&row).expect("valid");
        assert_eq!(r.student_id, "A1");
        assert_eq!(r.first_name, "Ana");
        assert_eq!(r.last_name, "Lee");
        assert_eq!(r.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn numeric_ids_stringify() {
        let row = raw(&[
            ("student_id", RawValue::Number(1001.0)),
            ("first_name", text("Bo")),
            ("last_name", text("Kim")),
        ]);
        assert_eq!(normalize_row(&row).expect("valid").student_id, "1001");
    }

    #[test]
    fn unlisted_header_variants_are_not_matched() {
        let row = raw(&[
            ("STUDENT ID", text("S1")),
            ("First Name", text("Ana")),
            ("Last Name", text("Lee")),
        ]);
        assert!(normalize_row(&row).is_none());
    }

    #[test]
    fn no_valid_rows_is_an_error() {
        let rows = vec![raw(&[("Student ID", text("S1"))])];
        assert!(matches!(stage("c1", &rows), Err(ClassbookError::NoValidRows)));
        assert!(matches!(stage("c1", &[]), Err(ClassbookError::NoValidRows)));
    }

    #[test]
    fn annotate_marks_existing_and_repeated_codes() {
        let staged = StagedImport {
            class_id: "c1".into(),
            rows: vec![
                PreviewRow {
                    student_id: "S1".into(),
                    first_name: "A".into(),
                    last_name: "B".into(),
                    email: None,
                },
                PreviewRow {
                    student_id: "S2".into(),
                    first_name: "C".into(),
                    last_name: "D".into(),
                    email: None,
                },
                PreviewRow {
                    student_id: "S2".into(),
                    first_name: "E".into(),
                    last_name: "F".into(),
                    email: None,
                },
            ],
        };
        let existing: HashSet<String> = ["S1".to_string()].into_iter().collect();
        let out = annotate(&staged, &existing);
        let statuses = out.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(statuses, vec![RowAction::Update, RowAction::New, RowAction::Update]);
    }

    #[test]
    fn commit_is_idempotent_and_last_duplicate_wins() {
        let conn = db::open_in_memory();
        let class = db::class_insert(&conn, "Math", "M1", "Fall").expect("class");
        let file = b"studentId,firstName,lastName,email\nS1,Ana,Lee,ana@x.org\nS2,Bo,Kim,\nS3,Cy,Park,cy@x.org\n";
        let rows = parse_upload("roster.csv", file.to_vec()).expect("parse");
        let staged = stage(&class.id, &rows).expect("stage");

        let first = commit(&conn, &staged).expect("first commit");
        assert_eq!(first, CommitSummary { imported: 3, created: 3, updated: 0 });
        let roster_once = db::students_list(&conn, &class.id).expect("list");

        let second = commit(&conn, &staged).expect("second commit");
        assert_eq!(second, CommitSummary { imported: 3, created: 0, updated: 3 });
        let roster_twice = db::students_list(&conn, &class.id).expect("list");
        assert_eq!(roster_once, roster_twice);
        assert_eq!(roster_twice[1].email, None);

        let dupes = StagedImport {
            class_id: class.id.clone(),
            rows: vec![
                PreviewRow {
                    student_id: "S9".into(),
                    first_name: "First".into(),
                    last_name: "Try".into(),
                    email: None,
                },
                PreviewRow {
                    student_id: "S9".into(),
                    first_name: "Second".into(),
                    last_name: "Try".into(),
                    email: Some("s9@x.org".into()),
                },
            ],
        };
        let summary = commit(&conn, &dupes).expect("dupes");
        assert_eq!(summary.created, 1);
        let s9 = db::students_list(&conn, &class.id)
            .expect("list")
            .into_iter()
            .find(|s| s.student_id == "S9")
            .expect("S9");
        assert_eq!(s9.first_name, "Second");
        assert_eq!(s9.email.as_deref(), Some("s9@x.org"));
    }
}
