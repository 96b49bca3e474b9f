use crate::calc::{self, TERMS};
use crate::db;
use crate::ipc::helpers::{
    get_class_name, get_required_str, get_term, list_class_students, list_subjects,
    require_student, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

/// Students x subjects grid of totals for one class and term, with each
/// student's term-appropriate average and class position.
fn reports_broadsheet(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_name = get_class_name(params)?;
    let term = get_term(params)?;

    db::read_snapshot(conn, |scores| -> Result<serde_json::Value, HandlerErr> {
        let conn = scores.conn;
        let students = list_class_students(conn, &class_name)?;
        let subjects = list_subjects(conn)?;

        let mut stmt = conn
            .prepare(
                "SELECT m.student_id, m.subject_id, m.total
                 FROM marks m
                 JOIN students s ON s.id = m.student_id
                 WHERE m.term = ? AND s.class_name = ?",
            )
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let mut totals: HashMap<(String, String), f64> = HashMap::new();
        let rows = stmt
            .query_map((term, &class_name), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, f64>(2)?,
                ))
            })
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        for row in rows {
            let (student_id, subject_id, total) =
                row.map_err(|e| HandlerErr::db("db_query_failed", e))?;
            totals.insert((student_id, subject_id), total);
        }

        let ranking: HashMap<String, (f64, usize)> = calc::class_ranking(scores, term, &class_name)?
            .into_iter()
            .map(|r| (r.student_id, (r.average, r.position)))
            .collect();

        let student_rows: Vec<serde_json::Value> = students
            .iter()
            .map(|s| {
                let cells: Vec<Option<f64>> = subjects
                    .iter()
                    .map(|sub| totals.get(&(s.id.clone(), sub.id.clone())).copied())
                    .collect();
                let (average, position) = ranking.get(&s.id).copied().unwrap_or((0.0, 0));
                json!({
                    "studentId": s.id,
                    "studentNo": s.student_no,
                    "name": s.name,
                    "totals": cells,
                    "average": average,
                    "grade": calc::calculate_grade(average),
                    "position": position,
                })
            })
            .collect();

        Ok(json!({
            "className": class_name,
            "term": term,
            "subjects": subjects
                .iter()
                .map(|s| json!({ "id": s.id, "code": s.code, "name": s.name }))
                .collect::<Vec<_>>(),
            "students": student_rows,
        }))
    })
}

/// Every mark a student has, grouped by term, with the term average,
/// cumulative average and class position for each term.
fn reports_student_results(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = require_student(conn, &student_id)?;

    db::read_snapshot(conn, |scores| -> Result<serde_json::Value, HandlerErr> {
        let mut stmt = scores
            .conn
            .prepare(
                "SELECT m.term, s.code, s.name, m.ca, m.exam, m.total, m.grade
                 FROM marks m
                 JOIN subjects s ON s.id = m.subject_id
                 WHERE m.student_id = ?
                 ORDER BY m.term, s.sort_order, s.code",
            )
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let mut by_term: HashMap<i64, Vec<serde_json::Value>> = HashMap::new();
        let rows = stmt
            .query_map([&student_id], |r| {
                let term: i64 = r.get(0)?;
                let code: String = r.get(1)?;
                let name: String = r.get(2)?;
                let ca: f64 = r.get(3)?;
                let exam: f64 = r.get(4)?;
                let total: f64 = r.get(5)?;
                let grade: Option<String> = r.get(6)?;
                Ok((
                    term,
                    json!({
                        "code": code,
                        "name": name,
                        "ca": ca,
                        "exam": exam,
                        "total": total,
                        "grade": grade,
                    }),
                ))
            })
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        for row in rows {
            let (term, mark) = row.map_err(|e| HandlerErr::db("db_query_failed", e))?;
            by_term.entry(term).or_default().push(mark);
        }

        let mut terms: Vec<serde_json::Value> = Vec::with_capacity(TERMS.len());
        for term in TERMS {
            let term_average = calc::get_term_average(scores, &student_id, term)?;
            let cumulative = calc::calculate_cumulative_average(scores, &student_id, term)?;
            let position = calc::calculate_class_positions(scores, term, &student.class_name)?
                .get(&student_id)
                .copied();
            terms.push(json!({
                "term": term,
                "marks": by_term.remove(&term).unwrap_or_default(),
                "termAverage": term_average,
                "cumulativeAverage": cumulative,
                "grade": calc::calculate_grade(cumulative),
                "position": position,
            }));
        }

        Ok(json!({
            "student": student.to_json(),
            "terms": terms,
        }))
    })
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.broadsheet" => Some(with_conn(state, req, reports_broadsheet)),
        "reports.studentResults" => Some(with_conn(state, req, reports_student_results)),
        _ => None,
    }
}
