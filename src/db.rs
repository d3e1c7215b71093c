use crate::attendance::AttendanceStatus;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "classbook.sqlite3";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRow {
    pub id: String,
    pub name: String,
    pub code: String,
    pub term: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassListItem {
    #[serde(flatten)]
    pub class: ClassRow,
    pub student_count: i64,
    pub session_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRow {
    pub id: String,
    pub class_id: String,
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRow {
    pub id: String,
    pub class_id: String,
    pub date: String,
}

/// Stored grade components for one roster entry. `student_id` is the
/// student's row id, not the roster code.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRow {
    pub student_id: String,
    pub midterm: f64,
    #[serde(rename = "final")]
    pub final_exam: f64,
    pub activity: f64,
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            code TEXT NOT NULL,
            term TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_class ON sessions(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('present', 'absent', 'late')),
            FOREIGN KEY(session_id) REFERENCES sessions(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(session_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_session ON attendance(session_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            midterm REAL NOT NULL DEFAULT 0,
            final REAL NOT NULL DEFAULT 0,
            activity REAL NOT NULL DEFAULT 0,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(class_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class ON grades(class_id)",
        [],
    )?;

    Ok(())
}

fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

// Classes

pub fn classes_list(conn: &Connection) -> rusqlite::Result<Vec<ClassListItem>> {
    // Correlated subqueries keep the counts independent of each other.
    let mut stmt = conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.code,
           c.term,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM sessions se WHERE se.class_id = c.id) AS session_count
         FROM classes c
         ORDER BY c.created_at DESC, c.rowid DESC",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(ClassListItem {
                class: ClassRow {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    code: r.get(2)?,
                    term: r.get(3)?,
                },
                student_count: r.get(4)?,
                session_count: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn class_insert(
    conn: &Connection,
    name: &str,
    code: &str,
    term: &str,
) -> rusqlite::Result<ClassRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, code, term, created_at) VALUES(?, ?, ?, ?, ?)",
        (&id, name, code, term, now_timestamp()),
    )?;
    Ok(ClassRow {
        id,
        name: name.to_string(),
        code: code.to_string(),
        term: term.to_string(),
    })
}

pub fn class_get(conn: &Connection, class_id: &str) -> rusqlite::Result<Option<ClassRow>> {
    conn.query_row(
        "SELECT id, name, code, term FROM classes WHERE id = ?",
        [class_id],
        |r| {
            Ok(ClassRow {
                id: r.get(0)?,
                name: r.get(1)?,
                code: r.get(2)?,
                term: r.get(3)?,
            })
        },
    )
    .optional()
}

// Students

fn map_student(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentRow> {
    Ok(StudentRow {
        id: r.get(0)?,
        class_id: r.get(1)?,
        student_id: r.get(2)?,
        first_name: r.get(3)?,
        last_name: r.get(4)?,
        email: r.get(5)?,
    })
}

pub fn students_list(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<StudentRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, class_id, student_id, first_name, last_name, email
         FROM students
         WHERE class_id = ?
         ORDER BY student_id",
    )?;
    let rows = stmt
        .query_map([class_id], map_student)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn students_count(conn: &Connection, class_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM students WHERE class_id = ?",
        [class_id],
        |r| r.get(0),
    )
}

/// Plain insert; a duplicate roster code in the class is a store error.
pub fn student_insert(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
) -> rusqlite::Result<StudentRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, student_id, first_name, last_name, email, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            class_id,
            student_id,
            first_name,
            last_name,
            email,
            now_timestamp(),
        ),
    )?;
    Ok(StudentRow {
        id,
        class_id: class_id.to_string(),
        student_id: student_id.to_string(),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.map(str::to_string),
    })
}

/// Upsert keyed by `(class_id, student_id)`. The row id of an existing entry
/// is kept so attendance and grades stay attached.
pub fn student_upsert(
    conn: &Connection,
    class_id: &str,
    student_id: &str,
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO students(id, class_id, student_id, first_name, last_name, email, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(class_id, student_id) DO UPDATE SET
           first_name = excluded.first_name,
           last_name = excluded.last_name,
           email = excluded.email,
           updated_at = excluded.updated_at",
        (
            Uuid::new_v4().to_string(),
            class_id,
            student_id,
            first_name,
            last_name,
            email,
            now_timestamp(),
        ),
    )?;
    Ok(())
}

/// Deletes a roster entry together with its attendance and grade rows.
/// Returns the number of student rows removed (0 or 1).
pub fn student_delete(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    // No ON DELETE CASCADE: dependents go first, in one transaction.
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE student_id = ?", [id])?;
    tx.execute("DELETE FROM grades WHERE student_id = ?", [id])?;
    let n = tx.execute("DELETE FROM students WHERE id = ?", [id])?;
    tx.commit()?;
    Ok(n)
}

// Sessions

fn map_session(r: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: r.get(0)?,
        class_id: r.get(1)?,
        date: r.get(2)?,
    })
}

pub fn sessions_list(
    conn: &Connection,
    class_id: &str,
    newest_first: bool,
) -> rusqlite::Result<Vec<SessionRow>> {
    let sql = if newest_first {
        "SELECT id, class_id, date FROM sessions WHERE class_id = ? ORDER BY date DESC, rowid DESC"
    } else {
        "SELECT id, class_id, date FROM sessions WHERE class_id = ? ORDER BY date ASC, rowid ASC"
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([class_id], map_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn session_get(conn: &Connection, id: &str) -> rusqlite::Result<Option<SessionRow>> {
    conn.query_row(
        "SELECT id, class_id, date FROM sessions WHERE id = ?",
        [id],
        map_session,
    )
    .optional()
}

pub fn session_insert(conn: &Connection, class_id: &str, date: &str) -> rusqlite::Result<SessionRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO sessions(id, class_id, date, created_at) VALUES(?, ?, ?, ?)",
        (&id, class_id, date, now_timestamp()),
    )?;
    Ok(SessionRow {
        id,
        class_id: class_id.to_string(),
        date: date.to_string(),
    })
}

// Attendance

pub fn attendance_for_session(
    conn: &Connection,
    session_id: &str,
) -> rusqlite::Result<Vec<(String, AttendanceStatus)>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, status FROM attendance WHERE session_id = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([session_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn attendance_status(
    conn: &Connection,
    session_id: &str,
    student_id: &str,
) -> rusqlite::Result<Option<AttendanceStatus>> {
    conn.query_row(
        "SELECT status FROM attendance WHERE session_id = ? AND student_id = ?",
        (session_id, student_id),
        |r| r.get(0),
    )
    .optional()
}

/// Replaces every record of a session with `records`, atomically.
pub fn attendance_replace(
    conn: &Connection,
    session_id: &str,
    records: &[(String, AttendanceStatus)],
) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM attendance WHERE session_id = ?", [session_id])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO attendance(id, session_id, student_id, status) VALUES(?, ?, ?, ?)
             ON CONFLICT(session_id, student_id) DO UPDATE SET status = excluded.status",
        )?;
        for (student_id, status) in records {
            stmt.execute((Uuid::new_v4().to_string(), session_id, student_id, status))?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

// Grades

pub fn grades_for_class(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<GradeRow>> {
    let mut stmt = conn.prepare(
        "SELECT student_id, midterm, final, activity FROM grades WHERE class_id = ? ORDER BY rowid",
    )?;
    let rows = stmt
        .query_map([class_id], |r| {
            Ok(GradeRow {
                student_id: r.get(0)?,
                midterm: r.get(1)?,
                final_exam: r.get(2)?,
                activity: r.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Upsert keyed by `(class_id, student_id)`; all three components are
/// rewritten together.
pub fn grades_upsert(conn: &Connection, class_id: &str, rows: &[GradeRow]) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO grades(id, class_id, student_id, midterm, final, activity, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(class_id, student_id) DO UPDATE SET
               midterm = excluded.midterm,
               final = excluded.final,
               activity = excluded.activity,
               updated_at = excluded.updated_at",
        )?;
        let now = now_timestamp();
        for g in rows {
            stmt.execute((
                Uuid::new_v4().to_string(),
                class_id,
                &g.student_id,
                g.midterm,
                g.final_exam,
                g.activity,
                &now,
            ))?;
        }
    }
    tx.commit()?;
    Ok(rows.len())
}

#[cfg(test)]
pub fn open_in_memory() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    init_schema(&conn).expect("init schema");
    conn
}
