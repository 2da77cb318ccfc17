use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calc;
use crate::ipc::helpers::{now_ts, optional_str, required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

const STATUS_PENDING: &str = "pending";
const STATUS_DONE: &str = "done";

const TASK_KINDS: [&str; 4] = ["exam", "assignment", "study", "other"];

const DUE_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn parse_due_at(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DUE_AT_FORMAT).ok()
}

fn handle_tasks_list(conn: &Connection, user_id: &str, params: &Value) -> Result<Value, HandlerErr> {
    let status = optional_str(params, "status").unwrap_or_else(|| STATUS_PENDING.to_string());
    if status != STATUS_PENDING && status != STATUS_DONE {
        return Err(HandlerErr::bad_params("status must be pending or done"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.title, t.kind, t.due_at, t.status, t.subject_id, s.name
             FROM tasks t
             LEFT JOIN subjects s ON s.id = t.subject_id
             WHERE t.user_id = ? AND t.status = ?
             ORDER BY t.due_at",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let now = chrono::Local::now().naive_local();
    let tasks: Vec<Value> = stmt
        .query_map([user_id, status.as_str()], |r| {
            let id: String = r.get(0)?;
            let title: String = r.get(1)?;
            let kind: String = r.get(2)?;
            let due_at: String = r.get(3)?;
            let status: String = r.get(4)?;
            let subject_id: Option<String> = r.get(5)?;
            let subject_name: Option<String> = r.get(6)?;
            Ok((id, title, kind, due_at, status, subject_id, subject_name))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .into_iter()
        .map(|(id, title, kind, due_at, status, subject_id, subject_name)| {
            // Unparsable timestamps should never happen, but a bad row must
            // not take the whole agenda down; bucket it as normal.
            let urgency = parse_due_at(&due_at)
                .map(|due| calc::urgency(due, now))
                .unwrap_or(calc::Urgency {
                    bucket: calc::UrgencyBucket::Normal,
                    days_left: None,
                    label: due_at.clone(),
                });
            json!({
                "id": id,
                "title": title,
                "kind": kind,
                "dueAt": due_at,
                "status": status,
                "subject": subject_id.map(|sid| json!({ "id": sid, "name": subject_name })),
                "urgency": {
                    "bucket": urgency.bucket.as_str(),
                    "daysLeft": urgency.days_left,
                    "label": urgency.label,
                },
            })
        })
        .collect();

    Ok(json!({ "tasks": tasks }))
}

fn handle_tasks_create(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let title = required_str(params, "title")?;
    let kind = optional_str(params, "kind").unwrap_or_else(|| "study".to_string());
    if !TASK_KINDS.contains(&kind.as_str()) {
        return Err(HandlerErr::bad_params(
            "kind must be exam, assignment, study or other",
        ));
    }

    // The form submits a date plus an optional time; they merge into one
    // absolute timestamp, defaulting to end of day.
    let date = required_str(params, "date")?;
    let time = optional_str(params, "time").unwrap_or_else(|| "23:59".to_string());
    if NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_err() {
        return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
    }
    if calc::parse_hhmm(&time).is_none() {
        return Err(HandlerErr::bad_params("time must be HH:MM"));
    }
    let due_at = format!("{}T{}:00", date, time);
    if parse_due_at(&due_at).is_none() {
        return Err(HandlerErr::bad_params("invalid due date"));
    }

    let subject_id = optional_str(params, "subjectId");
    if let Some(ref sid) = subject_id {
        let owned: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM subjects WHERE id = ? AND user_id = ?",
                [sid, &user_id.to_string()],
                |r| r.get(0),
            )
            .optional()
            .map_err(|e| HandlerErr::db("db_query_failed", e))?;
        if owned.is_none() {
            return Err(HandlerErr::not_found("subject not found"));
        }
    }

    let task_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tasks(id, user_id, subject_id, title, kind, due_at, status, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &task_id,
            user_id,
            &subject_id,
            &title,
            &kind,
            &due_at,
            STATUS_PENDING,
            now_ts(),
        ),
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "tasks" }))
    })?;

    Ok(json!({
        "taskId": task_id,
        "title": title,
        "kind": kind,
        "dueAt": due_at,
        "status": STATUS_PENDING,
    }))
}

fn handle_tasks_toggle_status(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let task_id = required_str(params, "taskId")?;
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM tasks WHERE id = ? AND user_id = ?",
            [&task_id, &user_id.to_string()],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some(status) = status else {
        return Err(HandlerErr::not_found("task not found"));
    };

    let next = if status == STATUS_PENDING {
        STATUS_DONE
    } else {
        STATUS_PENDING
    };
    conn.execute(
        "UPDATE tasks SET status = ? WHERE id = ?",
        [next, task_id.as_str()],
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    Ok(json!({ "taskId": task_id, "status": next }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "tasks.list" => Some(with_db(state, req, handle_tasks_list)),
        "tasks.create" => Some(with_db(state, req, handle_tasks_create)),
        "tasks.toggleStatus" => Some(with_db(state, req, handle_tasks_toggle_status)),
        _ => None,
    }
}
