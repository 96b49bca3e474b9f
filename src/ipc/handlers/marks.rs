use crate::calc::{self, calculate_grade};
use crate::db;
use crate::ipc::helpers::{get_required_str, get_term, require_student, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Score entry fields are forgiving: a missing, empty or non-numeric value
/// counts as 0 rather than rejecting the whole save.
fn lenient_score(v: Option<&serde_json::Value>) -> f64 {
    let Some(v) = v else {
        return 0.0;
    };
    if let Some(n) = v.as_f64() {
        return if n.is_finite() { n } else { 0.0 };
    }
    v.as_str()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

fn marks_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term = get_term(params)?;
    let student = require_student(conn, &student_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.code, s.name, m.ca, m.exam, m.total, m.grade
             FROM subjects s
             LEFT JOIN marks m
               ON m.subject_id = s.id AND m.student_id = ? AND m.term = ?
             ORDER BY s.sort_order, s.code",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = stmt
        .query_map((&student_id, term), |r| {
            let subject_id: String = r.get(0)?;
            let code: String = r.get(1)?;
            let name: String = r.get(2)?;
            let ca: Option<f64> = r.get(3)?;
            let exam: Option<f64> = r.get(4)?;
            let total: Option<f64> = r.get(5)?;
            let grade: Option<String> = r.get(6)?;
            Ok(json!({
                "subjectId": subject_id,
                "code": code,
                "name": name,
                "ca": ca,
                "exam": exam,
                "total": total,
                "grade": grade,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let term_average = calc::get_term_average(&db::SqliteScores::new(conn), &student_id, term)?;

    Ok(json!({
        "student": student.to_json(),
        "term": term,
        "marks": rows,
        "termAverage": term_average,
    }))
}

fn marks_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term = get_term(params)?;
    let student = require_student(conn, &student_id)?;
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut saved: Vec<serde_json::Value> = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let Some(subject_id) = entry.get("subjectId").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params(format!(
                "entries[{}].subjectId missing",
                i
            )));
        };
        if !seen.insert(subject_id.to_string()) {
            return Err(HandlerErr::bad_params(format!(
                "entries[{}].subjectId repeats an earlier entry",
                i
            )));
        }
        let known: Option<i64> = tx
            .query_row("SELECT 1 FROM subjects WHERE id = ?", [subject_id], |r| {
                r.get(0)
            })
            .optional()
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        if known.is_none() {
            return Err(HandlerErr::new("not_found", "subject not found")
                .with_details(json!({ "subjectId": subject_id, "index": i })));
        }

        let ca = lenient_score(entry.get("ca"));
        let exam = lenient_score(entry.get("exam"));
        let total = ca + exam;
        if !total.is_finite() {
            return Err(HandlerErr::bad_params(format!(
                "entries[{}] total is out of range",
                i
            ))
            .with_details(json!({ "subjectId": subject_id, "index": i })));
        }
        let grade = calculate_grade(total);

        tx.execute(
            "INSERT INTO marks(id, student_id, subject_id, term, ca, exam, total, grade, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, subject_id, term) DO UPDATE SET
               ca = excluded.ca,
               exam = excluded.exam,
               total = excluded.total,
               grade = excluded.grade,
               updated_at = excluded.updated_at",
            (
                Uuid::new_v4().to_string(),
                &student_id,
                subject_id,
                term,
                ca,
                exam,
                total,
                grade.as_str(),
                db::now_timestamp(),
            ),
        )
        .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "marks" })))?;

        saved.push(json!({
            "subjectId": subject_id,
            "ca": ca,
            "exam": exam,
            "total": total,
            "grade": grade,
        }));
    }

    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    info!(
        student_id = %student_id,
        term,
        count = saved.len(),
        "marks saved"
    );
    Ok(json!({
        "studentName": student.name,
        "term": term,
        "saved": saved,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.get" => Some(with_conn(state, req, marks_get)),
        "marks.save" => Some(with_conn(state, req, marks_save)),
        _ => None,
    }
}
