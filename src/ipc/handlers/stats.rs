use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::calc;
use crate::ipc::helpers::{with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

use super::subjects::load_subjects;

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn handle_stats_overview(
    conn: &Connection,
    user_id: &str,
    _params: &Value,
) -> Result<Value, HandlerErr> {
    // Per-subject averages. Subjects that have grade rows count toward the
    // overall mean even when every weight is zero (their average is 0);
    // the chart series additionally hides zero averages.
    let mut grade_stmt = conn
        .prepare("SELECT value, weight FROM grades WHERE subject_id = ?")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut total_sum = 0.0_f64;
    let mut total_count = 0_i64;
    let mut performance = Vec::new();
    for s in load_subjects(conn, user_id)? {
        let entries: Vec<calc::GradeEntry> = grade_stmt
            .query_map([&s.id], |r| {
                Ok(calc::GradeEntry {
                    value: r.get(0)?,
                    weight: r.get(1)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        let average = calc::weighted_average(entries.iter().copied());
        if !entries.is_empty() {
            total_sum += average;
            total_count += 1;
        }
        if average > 0.0 {
            performance.push(json!({
                "acronym": calc::acronym(&s.name),
                "name": s.name,
                "average": round1(average),
            }));
        }
    }
    let overall_average = if total_count > 0 {
        round1(total_sum / total_count as f64)
    } else {
        0.0
    };

    // Focus time grouped by subject; untagged sessions pool under "General".
    let mut session_stmt = conn
        .prepare(
            "SELECT ss.minutes, s.name
             FROM study_sessions ss
             LEFT JOIN subjects s ON s.id = ss.subject_id
             WHERE ss.user_id = ?",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let rows: Vec<(i64, Option<String>)> = session_stmt
        .query_map([user_id], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut minutes_by_subject: HashMap<String, i64> = HashMap::new();
    let mut total_minutes = 0_i64;
    for (minutes, name) in rows {
        let key = name.unwrap_or_else(|| "General".to_string());
        *minutes_by_subject.entry(key).or_insert(0) += minutes;
        total_minutes += minutes;
    }
    let mut study_by_subject: Vec<(String, i64)> = minutes_by_subject.into_iter().collect();
    study_by_subject.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let study_by_subject: Vec<Value> = study_by_subject
        .into_iter()
        .map(|(name, minutes)| json!({ "name": name, "minutes": minutes }))
        .collect();

    Ok(json!({
        "overallAverage": overall_average,
        "performance": performance,
        "totalStudyMinutes": total_minutes,
        "studyBySubject": study_by_subject,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.overview" => Some(with_db(state, req, handle_stats_overview)),
        _ => None,
    }
}
