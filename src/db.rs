use crate::calc::{CalcError, RosterStudent, ScoreSource};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub const DEFAULT_SUBJECTS: [(&str, &str); 20] = [
    ("MATH", "Mathematics"),
    ("ENG", "English"),
    ("PHY", "Physics"),
    ("CHEM", "Chemistry"),
    ("BIO", "Biology"),
    ("HIST", "History"),
    ("GEO", "Geography"),
    ("COMM", "Commerce"),
    ("ACC", "Accounts"),
    ("AGRIC", "Agricultural Science"),
    ("LIT", "Literature"),
    ("FRENCH", "French"),
    ("ARABIC", "Arabic"),
    ("IRS", "Islamic Studies"),
    ("CRK", "Christian Knowledge"),
    ("CIVIC", "Civic Education"),
    ("COMP", "Computer Science"),
    ("FOOD", "Food & Nutrition"),
    ("ART", "Fine Arts"),
    ("MUSIC", "Music"),
];

pub struct OpenedDb {
    pub conn: Connection,
    pub seeded_subjects: usize,
}

pub fn open_db(workspace: &Path) -> anyhow::Result<OpenedDb> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    debug!(path = %db_path.display(), "opening workspace db");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            student_no TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            class_name TEXT NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_name)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            term INTEGER NOT NULL,
            ca REAL NOT NULL DEFAULT 0,
            exam REAL NOT NULL DEFAULT 0,
            total REAL NOT NULL DEFAULT 0,
            grade TEXT,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(subject_id) REFERENCES subjects(id),
            UNIQUE(student_id, subject_id, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_student_term ON marks(student_id, term)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            present INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY(student_id, date),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS fees(
            student_id TEXT NOT NULL,
            term INTEGER NOT NULL,
            amount_due REAL NOT NULL DEFAULT 0,
            amount_paid REAL NOT NULL DEFAULT 0,
            PRIMARY KEY(student_id, term),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    let seeded_subjects = seed_default_subjects(&conn)?;
    if seeded_subjects > 0 {
        info!(count = seeded_subjects, "seeded default subjects");
    }

    Ok(OpenedDb {
        conn,
        seeded_subjects,
    })
}

/// Fills an empty subjects table with the default catalogue. A workspace that
/// already has any subject is left alone.
fn seed_default_subjects(conn: &Connection) -> anyhow::Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(0);
    }

    let tx = conn.unchecked_transaction()?;
    for (i, (code, name)) in DEFAULT_SUBJECTS.iter().enumerate() {
        tx.execute(
            "INSERT INTO subjects(id, code, name, sort_order) VALUES(?, ?, ?, ?)",
            (Uuid::new_v4().to_string(), code, name, i as i64),
        )?;
    }
    tx.commit()?;
    Ok(DEFAULT_SUBJECTS.len())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn query_failed(e: rusqlite::Error) -> CalcError {
    CalcError::new("db_query_failed", e.to_string())
}

/// `ScoreSource` over the workspace connection.
pub struct SqliteScores<'a> {
    pub conn: &'a Connection,
}

impl<'a> SqliteScores<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ScoreSource for SqliteScores<'_> {
    fn average_total(&self, student_id: &str, term: i64) -> Result<Option<f64>, CalcError> {
        self.conn
            .query_row(
                "SELECT AVG(total) FROM marks WHERE student_id = ? AND term = ?",
                (student_id, term),
                |r| r.get::<_, Option<f64>>(0),
            )
            .map_err(query_failed)
    }

    fn students_in_class(&self, class_name: &str) -> Result<Vec<RosterStudent>, CalcError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name
                 FROM students
                 WHERE class_name = ?
                 ORDER BY name, student_no",
            )
            .map_err(query_failed)?;
        stmt.query_map([class_name], |r| {
            Ok(RosterStudent {
                id: r.get(0)?,
                name: r.get(1)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)
    }
}

/// Runs `f` inside one read transaction so the separate term lookups of a
/// cumulative average or ranking all see the same state of the workspace.
pub fn read_snapshot<T, E, F>(conn: &Connection, f: F) -> Result<T, E>
where
    E: From<CalcError>,
    F: FnOnce(&SqliteScores<'_>) -> Result<T, E>,
{
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| CalcError::new("db_tx_failed", e.to_string()))?;
    let out = f(&SqliteScores::new(&tx))?;
    tx.commit()
        .map_err(|e| CalcError::new("db_commit_failed", e.to_string()))?;
    Ok(out)
}
