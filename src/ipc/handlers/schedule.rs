use chrono::{Datelike, Timelike};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calc;
use crate::ipc::helpers::{
    optional_i64, optional_str, required_i64, required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

fn handle_schedule_list(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let day_filter = match optional_i64(params, "dayOfWeek") {
        Some(d) if !(1..=6).contains(&d) => {
            return Err(HandlerErr::bad_params("dayOfWeek must be in 1..=6"));
        }
        other => other,
    };

    let mut stmt = conn
        .prepare(
            "SELECT sc.id, sc.subject_id, s.name, s.professor, sc.day_of_week,
                    sc.start_time, sc.end_time, sc.location
             FROM schedules sc
             JOIN subjects s ON s.id = sc.subject_id
             WHERE sc.user_id = ?
             ORDER BY sc.day_of_week, sc.start_time",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let now = chrono::Local::now();
    let now_day = now.weekday().num_days_from_sunday() as i64;
    let now_minutes = now.hour() * 60 + now.minute();

    let entries: Vec<Value> = stmt
        .query_map([user_id], |r| {
            let id: String = r.get(0)?;
            let subject_id: String = r.get(1)?;
            let subject_name: String = r.get(2)?;
            let professor: Option<String> = r.get(3)?;
            let day_of_week: i64 = r.get(4)?;
            let start_time: String = r.get(5)?;
            let end_time: String = r.get(6)?;
            let location: Option<String> = r.get(7)?;
            Ok((
                id,
                subject_id,
                subject_name,
                professor,
                day_of_week,
                start_time,
                end_time,
                location,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .into_iter()
        .filter(|row| day_filter.map(|d| row.4 == d).unwrap_or(true))
        .map(
            |(id, subject_id, subject_name, professor, day_of_week, start, end, location)| {
                let active =
                    calc::is_happening_now(day_of_week, &start, &end, now_day, now_minutes);
                json!({
                    "id": id,
                    "subject": { "id": subject_id, "name": subject_name, "professor": professor },
                    "dayOfWeek": day_of_week,
                    "startTime": start,
                    "endTime": end,
                    "location": location,
                    "happeningNow": active,
                })
            },
        )
        .collect();

    Ok(json!({ "entries": entries }))
}

fn handle_schedule_create(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let day_of_week = required_i64(params, "dayOfWeek")?;
    if !(1..=6).contains(&day_of_week) {
        return Err(HandlerErr::bad_params("dayOfWeek must be in 1..=6"));
    }
    let start_time = required_str(params, "startTime")?;
    let end_time = required_str(params, "endTime")?;
    if calc::parse_hhmm(&start_time).is_none() || calc::parse_hhmm(&end_time).is_none() {
        return Err(HandlerErr::bad_params("times must be HH:MM"));
    }
    let location = optional_str(params, "location");
    let professor = optional_str(params, "professor");

    let owned: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects WHERE id = ? AND user_id = ?",
            [&subject_id, &user_id.to_string()],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if owned.is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }

    let schedule_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schedules(id, user_id, subject_id, day_of_week, start_time, end_time, location)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &schedule_id,
            user_id,
            &subject_id,
            day_of_week,
            &start_time,
            &end_time,
            &location,
        ),
    )
    .map_err(|e| {
        HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "schedules" }),
        )
    })?;

    // The slot form doubles as the place people first type the professor's
    // name; persist it on the subject so every view picks it up.
    if let Some(prof) = professor {
        conn.execute(
            "UPDATE subjects SET professor = ? WHERE id = ?",
            [&prof, &subject_id],
        )
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    }

    Ok(json!({ "scheduleId": schedule_id }))
}

fn handle_schedule_delete(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let schedule_id = required_str(params, "scheduleId")?;
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM schedules WHERE id = ? AND user_id = ?",
            [&schedule_id, &user_id.to_string()],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("schedule entry not found"));
    }
    conn.execute("DELETE FROM schedules WHERE id = ?", [&schedule_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.list" => Some(with_db(state, req, handle_schedule_list)),
        "schedule.create" => Some(with_db(state, req, handle_schedule_create)),
        "schedule.delete" => Some(with_db(state, req, handle_schedule_delete)),
        _ => None,
    }
}
