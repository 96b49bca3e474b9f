use crate::ipc::helpers::{
    get_class_name, get_optional_f64, get_required_f64, get_required_str, get_term,
    list_class_students, require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::info;

fn fee_status(amount_due: f64, amount_paid: f64) -> &'static str {
    if amount_paid >= amount_due {
        "paid"
    } else {
        "pending"
    }
}

fn fee_row(conn: &Connection, student_id: &str, term: i64) -> Result<(f64, f64), HandlerErr> {
    conn.query_row(
        "SELECT amount_due, amount_paid FROM fees WHERE student_id = ? AND term = ?",
        (student_id, term),
        |r| Ok((r.get::<_, f64>(0)?, r.get::<_, f64>(1)?)),
    )
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn ensure_fee_row(conn: &Connection, student_id: &str, term: i64) -> Result<(), HandlerErr> {
    conn.execute(
        "INSERT OR IGNORE INTO fees(student_id, term, amount_due, amount_paid) VALUES(?, ?, 0, 0)",
        (student_id, term),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "fees" })))?;
    Ok(())
}

/// Lists fee status for a class and term. Students without a fee row get a
/// zeroed one, so every listed student has a row to update afterwards.
fn fees_class_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_class_name(params)?;
    let term = get_term(params)?;
    let students = list_class_students(conn, &class_name)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    let mut rows: Vec<serde_json::Value> = Vec::with_capacity(students.len());
    for s in &students {
        ensure_fee_row(&tx, &s.id, term)?;
        let (amount_due, amount_paid) = fee_row(&tx, &s.id, term)?;
        rows.push(json!({
            "studentId": s.id,
            "name": s.name,
            "amountDue": amount_due,
            "amountPaid": amount_paid,
            "status": fee_status(amount_due, amount_paid),
        }));
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({
        "className": class_name,
        "term": term,
        "fees": rows,
    }))
}

fn fees_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term = get_term(params)?;
    let amount_paid = get_required_f64(params, "amountPaid")?;
    let amount_due = get_optional_f64(params, "amountDue")?;
    if amount_paid < 0.0 || amount_due.map(|d| d < 0.0).unwrap_or(false) {
        return Err(HandlerErr::bad_params("fee amounts must not be negative"));
    }
    require_student(conn, &student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    ensure_fee_row(&tx, &student_id, term)?;
    tx.execute(
        "UPDATE fees SET amount_paid = ?, amount_due = COALESCE(?, amount_due)
         WHERE student_id = ? AND term = ?",
        (amount_paid, amount_due, &student_id, term),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    let (amount_due, amount_paid) = fee_row(&tx, &student_id, term)?;
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    info!(student_id = %student_id, term, amount_paid, "fee updated");
    Ok(json!({
        "studentId": student_id,
        "term": term,
        "amountDue": amount_due,
        "amountPaid": amount_paid,
        "status": fee_status(amount_due, amount_paid),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.classOpen" => Some(with_conn(state, req, fees_class_open)),
        "fees.update" => Some(with_conn(state, req, fees_update)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{fee_status, fees_update};
    use crate::db;
    use serde_json::json;

    #[test]
    fn status_is_paid_once_paid_covers_due() {
        assert_eq!(fee_status(0.0, 0.0), "paid");
        assert_eq!(fee_status(5000.0, 4999.99), "pending");
        assert_eq!(fee_status(5000.0, 5000.0), "paid");
        assert_eq!(fee_status(5000.0, 6000.0), "paid");
    }

    #[test]
    fn failed_update_leaves_no_fee_row_behind() {
        let ws = std::env::temp_dir().join(format!(
            "gradebook-fees-rollback-{}",
            uuid::Uuid::new_v4()
        ));
        let opened = db::open_db(&ws).expect("open");
        let conn = &opened.conn;
        conn.execute(
            "INSERT INTO students(id, student_no, name, class_name) VALUES('s1', 'F9', 'Fola', 'SSS1')",
            [],
        )
        .expect("insert student");
        conn.execute_batch(
            "CREATE TRIGGER fees_frozen BEFORE UPDATE ON fees
             BEGIN SELECT RAISE(ABORT, 'fees frozen'); END;",
        )
        .expect("trigger");

        let res = fees_update(conn, &json!({ "studentId": "s1", "term": 1, "amountPaid": 10 }));
        assert_eq!(res.err().map(|e| e.code).as_deref(), Some("db_update_failed"));

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM fees", [], |r| r.get(0))
            .expect("count");
        assert_eq!(rows, 0);

        drop(opened);
        let _ = std::fs::remove_dir_all(ws);
    }
}
