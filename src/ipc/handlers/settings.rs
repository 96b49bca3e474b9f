use crate::calc;
use crate::db;
use crate::ipc::helpers::{with_conn, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

const SCHOOL_NAME: &str = "school.name";
const CURRENT_TERM: &str = "school.currentTerm";

fn read_settings(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let name = db::settings_get_json(conn, SCHOOL_NAME)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .unwrap_or_else(|| json!(""));
    let term = db::settings_get_json(conn, CURRENT_TERM)
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .unwrap_or_else(|| json!(1));
    Ok(json!({
        "schoolName": name,
        "currentTerm": term,
    }))
}

fn settings_get(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    read_settings(conn)
}

fn settings_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing patch"));
    };

    if let Some(v) = patch.get("schoolName") {
        let Some(name) = v.as_str() else {
            return Err(HandlerErr::bad_params("patch.schoolName must be a string"));
        };
        db::settings_set_json(conn, SCHOOL_NAME, &json!(name.trim()))
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }
    if let Some(v) = patch.get("currentTerm") {
        let Some(term) = v.as_i64() else {
            return Err(HandlerErr::bad_params("patch.currentTerm must be an integer"));
        };
        calc::check_term(term)?;
        db::settings_set_json(conn, CURRENT_TERM, &json!(term))
            .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }

    read_settings(conn)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(with_conn(state, req, settings_get)),
        "settings.update" => Some(with_conn(state, req, settings_update)),
        _ => None,
    }
}
