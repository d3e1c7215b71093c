use crate::db::{self, GradeRow, StudentRow};
use crate::error::Result;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

pub const COMPONENT_MIN: f64 = 0.0;
pub const COMPONENT_MAX: f64 = 100.0;

/// Clamps a numeric component into `[0, 100]`; NaN becomes 0.
pub fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        return COMPONENT_MIN;
    }
    v.clamp(COMPONENT_MIN, COMPONENT_MAX)
}

/// Reads a form string the way a browser's `Number()` would: surrounding
/// whitespace is ignored, blank is 0, `Infinity` is the only spelled-out
/// value, and `0x`/`0o`/`0b` prefixes select a radix. Anything else is NaN.
fn number_from_text(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &t[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        return digits.chars().try_fold(0.0_f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
        })
        .unwrap_or(f64::NAN);
    }

    // Rust also accepts "inf" and "nan"; restrict to decimal literal characters.
    if !t
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Interprets a raw form value as a grade component: `Number(v) || 0`,
/// then clamped.
pub fn clamp_component(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(COMPONENT_MIN),
        Value::String(s) => number_from_text(s),
        Value::Bool(true) => 1.0,
        _ => COMPONENT_MIN,
    };
    clamp_score(n)
}

/// Unweighted sum of the three components.
pub fn total(midterm: f64, final_exam: f64, activity: f64) -> f64 {
    midterm + final_exam + activity
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    F,
}

impl LetterGrade {
    pub const ALL: [LetterGrade; 5] = [
        LetterGrade::A,
        LetterGrade::B,
        LetterGrade::C,
        LetterGrade::D,
        LetterGrade::F,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LetterGrade::A => "A (90-100)",
            LetterGrade::B => "B (80-89)",
            LetterGrade::C => "C (70-79)",
            LetterGrade::D => "D (60-69)",
            LetterGrade::F => "F (<60)",
        }
    }
}

/// Lower bounds are inclusive. Everything at or above 90 is an A, which
/// also covers totals above 100.
pub fn bucket(total: f64) -> LetterGrade {
    if total >= 90.0 {
        LetterGrade::A
    } else if total >= 80.0 {
        LetterGrade::B
    } else if total >= 70.0 {
        LetterGrade::C
    } else if total >= 60.0 {
        LetterGrade::D
    } else {
        LetterGrade::F
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBand {
    pub grade: LetterGrade,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeStats {
    pub graded: usize,
    pub average: u32,
    pub distribution: Vec<DistributionBand>,
}

/// Letter distribution (always A through F, in order) and the rounded mean
/// of the totals. An empty input averages to 0.
pub fn stats(totals: &[f64]) -> GradeStats {
    let mut counts: HashMap<LetterGrade, usize> = HashMap::new();
    for t in totals {
        *counts.entry(bucket(*t)).or_default() += 1;
    }
    let average = if totals.is_empty() {
        0
    } else {
        (totals.iter().sum::<f64>() / totals.len() as f64)
            .round()
            .max(0.0) as u32
    };
    GradeStats {
        graded: totals.len(),
        average,
        distribution: LetterGrade::ALL
            .iter()
            .map(|g| DistributionBand {
                grade: *g,
                label: g.label(),
                count: counts.get(g).copied().unwrap_or(0),
            })
            .collect(),
    }
}

pub fn class_stats(conn: &Connection, class_id: &str) -> Result<GradeStats> {
    let totals = db::grades_for_class(conn, class_id)?
        .iter()
        .map(|g| total(g.midterm, g.final_exam, g.activity))
        .collect::<Vec<_>>();
    Ok(stats(&totals))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeSheetRow {
    pub id: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub midterm: f64,
    #[serde(rename = "final")]
    pub final_exam: f64,
    pub activity: f64,
    pub total: f64,
}

/// One editable row per student; students without a stored record start at 0.
pub fn grade_sheet(students: &[StudentRow], grades: &[GradeRow]) -> Vec<GradeSheetRow> {
    let by_student: HashMap<&str, &GradeRow> = grades
        .iter()
        .map(|g| (g.student_id.as_str(), g))
        .collect();
    students
        .iter()
        .map(|s| {
            let (m, f, a) = by_student
                .get(s.id.as_str())
                .map(|g| (g.midterm, g.final_exam, g.activity))
                .unwrap_or((0.0, 0.0, 0.0));
            GradeSheetRow {
                id: s.id.clone(),
                student_id: s.student_id.clone(),
                first_name: s.first_name.clone(),
                last_name: s.last_name.clone(),
                midterm: m,
                final_exam: f,
                activity: a,
                total: total(m, f, a),
            }
        })
        .collect()
}

/// Edited grade rows for one class, waiting to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeSubmission {
    pub class_id: String,
    pub rows: Vec<GradeRow>,
}

/// Clamps every component and upserts the rows by `(class, student)`.
pub fn save(conn: &Connection, submission: &GradeSubmission) -> Result<usize> {
    let rows = submission
        .rows
        .iter()
        .map(|g| GradeRow {
            student_id: g.student_id.clone(),
            midterm: clamp_score(g.midterm),
            final_exam: clamp_score(g.final_exam),
            activity: clamp_score(g.activity),
        })
        .collect::<Vec<_>>();
    let n = db::grades_upsert(conn, &submission.class_id, &rows)?;
    tracing::info!(class_id = %submission.class_id, rows = n, "grades saved");
    Ok(n)
}
