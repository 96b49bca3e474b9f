use crate::ipc::helpers::{
    get_class_name, list_class_students, require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

fn parse_date(raw: &str) -> Result<String, HandlerErr> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| {
            HandlerErr::bad_params("date must be YYYY-MM-DD").with_details(json!({ "date": raw }))
        })
}

/// Present days over loaded days, as a percentage. No loaded days is 0%.
fn attendance_percentage(present_days: usize, total_days: usize) -> f64 {
    if total_days == 0 {
        0.0
    } else {
        100.0 * present_days as f64 / total_days as f64
    }
}

fn attendance_class_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_class_name(params)?;
    let students = list_class_students(conn, &class_name)?;

    // Dates already recorded for anyone in the class, plus any new columns
    // the caller wants to open.
    let mut dates: BTreeSet<String> = BTreeSet::new();
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT a.date
             FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE s.class_name = ?",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let recorded = stmt
        .query_map([&class_name], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    dates.extend(recorded);
    if let Some(extra) = params.get("dates") {
        let Some(arr) = extra.as_array() else {
            return Err(HandlerErr::bad_params("dates must be an array"));
        };
        for v in arr {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params("dates must contain strings"));
            };
            dates.insert(parse_date(s)?);
        }
    }

    let mut present_by_pair: HashMap<(String, String), bool> = HashMap::new();
    let mut rec_stmt = conn
        .prepare(
            "SELECT a.student_id, a.date, a.present
             FROM attendance a
             JOIN students s ON s.id = a.student_id
             WHERE s.class_name = ?",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows = rec_stmt
        .query_map([&class_name], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, i64>(2)? != 0,
            ))
        })
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    for row in rows {
        let (student_id, date, present) = row.map_err(|e| HandlerErr::db("db_query_failed", e))?;
        present_by_pair.insert((student_id, date), present);
    }

    let dates: Vec<String> = dates.into_iter().collect();
    let student_rows: Vec<serde_json::Value> = students
        .iter()
        .map(|s| {
            // No record for a loaded date counts as absent.
            let marks: Vec<bool> = dates
                .iter()
                .map(|d| {
                    present_by_pair
                        .get(&(s.id.clone(), d.clone()))
                        .copied()
                        .unwrap_or(false)
                })
                .collect();
            let present_days = marks.iter().filter(|p| **p).count();
            json!({
                "studentId": s.id,
                "name": s.name,
                "present": marks,
                "presentDays": present_days,
                "percentage": attendance_percentage(present_days, dates.len()),
            })
        })
        .collect();

    Ok(json!({
        "className": class_name,
        "dates": dates,
        "students": student_rows,
    }))
}

fn attendance_save(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(entries) = params.get("entries").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("entries must be an array"));
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    for (i, entry) in entries.iter().enumerate() {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params(format!(
                "entries[{}].studentId missing",
                i
            )));
        };
        let Some(date_raw) = entry.get("date").and_then(|v| v.as_str()) else {
            return Err(HandlerErr::bad_params(format!("entries[{}].date missing", i)));
        };
        let Some(present) = entry.get("present").and_then(|v| v.as_bool()) else {
            return Err(HandlerErr::bad_params(format!(
                "entries[{}].present must be a boolean",
                i
            )));
        };
        let date = parse_date(date_raw)?;
        require_student(&tx, student_id)?;

        tx.execute(
            "INSERT INTO attendance(student_id, date, present) VALUES(?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET present = excluded.present",
            (student_id, &date, present as i64),
        )
        .map_err(|e| {
            HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "attendance" }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "saved": entries.len() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.classOpen" => Some(with_conn(state, req, attendance_class_open)),
        "attendance.save" => Some(with_conn(state, req, attendance_save)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_over_loaded_days() {
        assert_eq!(attendance_percentage(0, 0), 0.0);
        assert_eq!(attendance_percentage(3, 4), 75.0);
        assert_eq!(attendance_percentage(2, 2), 100.0);
    }

    #[test]
    fn dates_are_normalized_and_validated() {
        assert_eq!(parse_date(" 2024-09-02 ").ok().as_deref(), Some("2024-09-02"));
        assert!(parse_date("2024-13-01").is_err());
        assert!(parse_date("02/09/2024").is_err());
    }
}
