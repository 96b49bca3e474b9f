use crate::db;
use crate::ipc::helpers::{
    get_required_str, get_required_trimmed, list_class_students, require_student, with_conn,
    HandlerErr, StudentRow,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = params
        .get("className")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string());

    let students = match class_name {
        Some(c) => list_class_students(conn, &c)?,
        None => {
            let mut stmt = conn
                .prepare(
                    "SELECT id, student_no, name, class_name
                     FROM students
                     ORDER BY class_name, name, student_no",
                )
                .map_err(|e| HandlerErr::db("db_query_failed", e))?;
            stmt.query_map([], |r| {
                Ok(StudentRow {
                    id: r.get(0)?,
                    student_no: r.get(1)?,
                    name: r.get(2)?,
                    class_name: r.get(3)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| HandlerErr::db("db_query_failed", e))?
        }
    };

    Ok(json!({
        "students": students.iter().map(|s| s.to_json()).collect::<Vec<_>>()
    }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_no = get_required_trimmed(params, "studentNo")?;
    let name = get_required_trimmed(params, "name")?;
    let class_name = get_required_trimmed(params, "className")?;

    let taken: Option<String> = conn
        .query_row(
            "SELECT id FROM students WHERE student_no = ?",
            [&student_no],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if let Some(existing) = taken {
        return Err(HandlerErr::new(
            "conflict",
            format!("student number '{}' already exists", student_no),
        )
        .with_details(json!({ "studentId": existing })));
    }

    let student_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, student_no, name, class_name, updated_at) VALUES(?, ?, ?, ?, ?)",
        (&student_id, &student_no, &name, &class_name, db::now_timestamp()),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" }))
    })?;

    info!(student_id = %student_id, class_name = %class_name, "student registered");
    Ok(json!({ "studentId": student_id }))
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let current = require_student(conn, &student_id)?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing patch"));
    };

    let mut name = current.name;
    let mut class_name = current.class_name;
    if let Some(v) = patch.get("name") {
        let s = v.as_str().map(|s| s.trim()).unwrap_or("");
        if s.is_empty() {
            return Err(HandlerErr::bad_params("patch.name must be a non-empty string"));
        }
        name = s.to_string();
    }
    if let Some(v) = patch.get("className") {
        let s = v.as_str().map(|s| s.trim()).unwrap_or("");
        if s.is_empty() {
            return Err(HandlerErr::bad_params(
                "patch.className must be a non-empty string",
            ));
        }
        class_name = s.to_string();
    }

    conn.execute(
        "UPDATE students SET name = ?, class_name = ?, updated_at = ? WHERE id = ?",
        (&name, &class_name, db::now_timestamp(), &student_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    Ok(json!({ "ok": true }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    require_student(conn, &student_id)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    // No ON DELETE CASCADE; children first.
    for table in ["marks", "attendance", "fees"] {
        tx.execute(
            &format!("DELETE FROM {} WHERE student_id = ?", table),
            [&student_id],
        )
        .map_err(|e| {
            HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": table }))
        })?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| {
            HandlerErr::db("db_delete_failed", e).with_details(json!({ "table": "students" }))
        })?;
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    info!(student_id = %student_id, "student deleted");
    Ok(json!({ "ok": true }))
}

fn classes_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT class_name, COUNT(*)
             FROM students
             GROUP BY class_name
             ORDER BY class_name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let classes = stmt
        .query_map([], |r| {
            let name: String = r.get(0)?;
            let count: i64 = r.get(1)?;
            Ok(json!({ "name": name, "studentCount": count }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "classes": classes }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_conn(state, req, students_list)),
        "students.create" => Some(with_conn(state, req, students_create)),
        "students.update" => Some(with_conn(state, req, students_update)),
        "students.delete" => Some(with_conn(state, req, students_delete)),
        "classes.list" => Some(with_conn(state, req, classes_list)),
        _ => None,
    }
}
