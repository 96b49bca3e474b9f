use crate::calc;
use crate::db;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    get_class_name, get_required_f64, get_required_str, get_term, require_student,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use tracing::debug;

// Pure lookup; works without a workspace.
fn handle_calc_grade(req: &Request) -> serde_json::Value {
    match get_required_f64(&req.params, "score") {
        Ok(score) => ok(&req.id, json!({ "grade": calc::calculate_grade(score) })),
        Err(e) => e.response(&req.id),
    }
}

fn calc_term_average(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term = get_term(params)?;
    require_student(conn, &student_id)?;

    let average = calc::get_term_average(&db::SqliteScores::new(conn), &student_id, term)?;
    Ok(json!({
        "studentId": student_id,
        "term": term,
        "average": average,
        "grade": calc::calculate_grade(average),
    }))
}

fn calc_cumulative_average(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let term = get_term(params)?;
    require_student(conn, &student_id)?;

    let average = db::read_snapshot(conn, |scores| {
        calc::calculate_cumulative_average(scores, &student_id, term)
    })?;
    Ok(json!({
        "studentId": student_id,
        "term": term,
        "average": average,
        "grade": calc::calculate_grade(average),
    }))
}

fn calc_class_positions(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_class_name(params)?;
    let term = get_term(params)?;

    let ranked = db::read_snapshot(conn, |scores| calc::class_ranking(scores, term, &class_name))?;
    debug!(class_name = %class_name, term, students = ranked.len(), "class ranked");

    let positions: serde_json::Map<String, serde_json::Value> = ranked
        .iter()
        .map(|r| (r.student_id.clone(), json!(r.position)))
        .collect();
    let rows: Vec<serde_json::Value> = ranked
        .iter()
        .map(|r| {
            json!({
                "studentId": r.student_id,
                "name": r.display_name,
                "average": r.average,
                "grade": calc::calculate_grade(r.average),
                "position": r.position,
            })
        })
        .collect();

    Ok(json!({
        "className": class_name,
        "term": term,
        "positions": positions,
        "rows": rows,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calc.grade" => Some(handle_calc_grade(req)),
        "calc.termAverage" => Some(with_conn(state, req, calc_term_average)),
        "calc.cumulativeAverage" => Some(with_conn(state, req, calc_cumulative_average)),
        "calc.classPositions" => Some(with_conn(state, req, calc_class_positions)),
        _ => None,
    }
}
