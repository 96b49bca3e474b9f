use crate::calc::{self, CalcError};
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub struct HandlerErr {
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn db(code: &str, e: impl ToString) -> Self {
        Self::new(code, e.to_string())
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, &self.code, self.message, self.details)
    }
}

impl From<CalcError> for HandlerErr {
    fn from(e: CalcError) -> Self {
        Self {
            code: e.code,
            message: e.message,
            details: e.details,
        }
    }
}

/// Runs `f` against the open workspace and wraps the outcome in the response
/// envelope.
pub fn with_conn<F>(state: &AppState, req: &Request, f: F) -> serde_json::Value
where
    F: FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
{
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_required_trimmed(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    let v = get_required_str(params, key)?.trim().to_string();
    if v.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(v)
}

/// Class names are matched exactly as stored; surrounding whitespace is part
/// of the name.
pub fn get_class_name(params: &serde_json::Value) -> Result<String, HandlerErr> {
    let v = get_required_str(params, "className")?;
    if v.trim().is_empty() {
        return Err(HandlerErr::bad_params("className must not be empty"));
    }
    Ok(v)
}

pub fn get_optional_f64(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a number", key))),
    }
}

pub fn get_required_f64(params: &serde_json::Value, key: &str) -> Result<f64, HandlerErr> {
    get_optional_f64(params, key)?.ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Reads `term` and rejects anything outside 1..=3 as `invalid_argument`.
pub fn get_term(params: &serde_json::Value) -> Result<i64, HandlerErr> {
    let raw = params
        .get("term")
        .ok_or_else(|| HandlerErr::bad_params("missing term"))?;
    let term = match raw.as_i64() {
        Some(n) => n,
        None => raw
            .as_str()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| HandlerErr::bad_params("term must be an integer"))?,
    };
    Ok(calc::check_term(term)?)
}

#[derive(Debug, Clone)]
pub struct StudentRow {
    pub id: String,
    pub student_no: String,
    pub name: String,
    pub class_name: String,
}

impl StudentRow {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "studentNo": self.student_no,
            "name": self.name,
            "className": self.class_name,
        })
    }
}

pub fn find_student(conn: &Connection, student_id: &str) -> Result<Option<StudentRow>, HandlerErr> {
    conn.query_row(
        "SELECT id, student_no, name, class_name FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(StudentRow {
                id: r.get(0)?,
                student_no: r.get(1)?,
                name: r.get(2)?,
                class_name: r.get(3)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub fn require_student(conn: &Connection, student_id: &str) -> Result<StudentRow, HandlerErr> {
    find_student(conn, student_id)?.ok_or_else(|| {
        HandlerErr::new("not_found", "student not found")
            .with_details(json!({ "studentId": student_id }))
    })
}

pub fn list_class_students(conn: &Connection, class_name: &str) -> Result<Vec<StudentRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_no, name, class_name
             FROM students
             WHERE class_name = ?
             ORDER BY name, student_no",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([class_name], |r| {
        Ok(StudentRow {
            id: r.get(0)?,
            student_no: r.get(1)?,
            name: r.get(2)?,
            class_name: r.get(3)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

#[derive(Debug, Clone)]
pub struct SubjectRow {
    pub id: String,
    pub code: String,
    pub name: String,
}

pub fn list_subjects(conn: &Connection) -> Result<Vec<SubjectRow>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, code, name FROM subjects ORDER BY sort_order, code")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([], |r| {
        Ok(SubjectRow {
            id: r.get(0)?,
            code: r.get(1)?,
            name: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}
