use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calc;
use crate::ipc::helpers::{
    optional_f64, optional_str, required_f64, required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

use super::subjects::{load_grade_entries, load_subject};

fn handle_grades_add(conn: &Connection, user_id: &str, params: &Value) -> Result<Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let name = required_str(params, "name")?;
    let value = required_f64(params, "value")?;
    let weight = optional_f64(params, "weight").unwrap_or(1.0);
    let unit = optional_str(params, "unit");

    if load_subject(conn, user_id, &subject_id)?.is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }

    let grade_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, subject_id, name, weight, value, unit) VALUES(?, ?, ?, ?, ?, ?)",
        (&grade_id, &subject_id, &name, weight, value, &unit),
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "grades" }))
    })?;

    // Hand back the fresh totals so the detail view can re-render without a
    // second round trip.
    let entries = load_grade_entries(conn, &subject_id)?;
    let (total_weight, _) = calc::grade_totals(entries.iter().copied());
    let average = calc::weighted_average(entries);

    Ok(json!({
        "grade": {
            "id": grade_id,
            "subjectId": subject_id,
            "name": name,
            "weight": weight,
            "value": value,
            "unit": unit,
        },
        "average": average,
        "totalWeight": total_weight,
    }))
}

fn handle_grades_delete(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let grade_id = required_str(params, "gradeId")?;

    let subject_id: Option<String> = conn
        .query_row(
            "SELECT g.subject_id
             FROM grades g
             JOIN subjects s ON s.id = g.subject_id
             WHERE g.id = ? AND s.user_id = ?",
            [&grade_id, &user_id.to_string()],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some(subject_id) = subject_id else {
        return Err(HandlerErr::not_found("grade not found"));
    };

    conn.execute("DELETE FROM grades WHERE id = ?", [&grade_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;

    let entries = load_grade_entries(conn, &subject_id)?;
    let (total_weight, _) = calc::grade_totals(entries.iter().copied());
    let average = calc::weighted_average(entries);

    Ok(json!({
        "ok": true,
        "subjectId": subject_id,
        "average": average,
        "totalWeight": total_weight,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.add" => Some(with_db(state, req, handle_grades_add)),
        "grades.delete" => Some(with_db(state, req, handle_grades_delete)),
        _ => None,
    }
}
