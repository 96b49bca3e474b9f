use crate::ipc::helpers::{get_required_trimmed, list_subjects, with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn subjects_list(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subjects: Vec<serde_json::Value> = list_subjects(conn)?
        .into_iter()
        .map(|s| json!({ "id": s.id, "code": s.code, "name": s.name }))
        .collect();
    Ok(json!({ "subjects": subjects }))
}

fn subjects_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_trimmed(params, "code")?.to_ascii_uppercase();
    let name = get_required_trimmed(params, "name")?;

    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM subjects WHERE code = ?", [&code], |r| r.get(0))
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_some() {
        return Err(HandlerErr::new(
            "conflict",
            format!("subject code '{}' already exists", code),
        ));
    }

    let next_sort: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM subjects",
            [],
            |r| r.get(0),
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, code, name, sort_order) VALUES(?, ?, ?, ?)",
        (&subject_id, &code, &name, next_sort),
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "subjects" }))
    })?;

    Ok(json!({ "subjectId": subject_id, "code": code }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(with_conn(state, req, subjects_list)),
        "subjects.create" => Some(with_conn(state, req, subjects_create)),
        _ => None,
    }
}
