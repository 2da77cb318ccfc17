use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calc;
use crate::ipc::helpers::{
    now_ts, optional_str, required_i64, required_str, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};

const STATUS_IN_PROGRESS: &str = "in_progress";
const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, Clone)]
struct CourseRow {
    id: String,
    name: String,
    provider: Option<String>,
    total_modules: i64,
    completed_modules: i64,
    status: String,
}

fn course_json(c: &CourseRow) -> Value {
    let progress = calc::course_progress(c.completed_modules, c.total_modules);
    json!({
        "id": c.id,
        "name": c.name,
        "provider": c.provider,
        "totalModules": c.total_modules,
        "completedModules": c.completed_modules,
        "status": c.status,
        "progressPercent": progress,
        "done": c.status == STATUS_COMPLETED,
    })
}

fn load_course(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<CourseRow>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, provider, total_modules, completed_modules, status
         FROM courses
         WHERE id = ? AND user_id = ?",
        [course_id, user_id],
        |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                name: r.get(1)?,
                provider: r.get(2)?,
                total_modules: r.get(3)?,
                completed_modules: r.get(4)?,
                status: r.get(5)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn handle_courses_list(
    conn: &Connection,
    user_id: &str,
    _params: &Value,
) -> Result<Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, provider, total_modules, completed_modules, status
             FROM courses
             WHERE user_id = ?
             ORDER BY created_at DESC, id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let courses: Vec<Value> = stmt
        .query_map([user_id], |r| {
            Ok(CourseRow {
                id: r.get(0)?,
                name: r.get(1)?,
                provider: r.get(2)?,
                total_modules: r.get(3)?,
                completed_modules: r.get(4)?,
                status: r.get(5)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .iter()
        .map(course_json)
        .collect();

    Ok(json!({ "courses": courses }))
}

fn handle_courses_create(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let provider = optional_str(params, "provider");
    let total_modules = required_i64(params, "totalModules")?;
    if total_modules < 1 {
        return Err(HandlerErr::bad_params("totalModules must be >= 1"));
    }

    let course_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO courses(id, user_id, name, provider, total_modules, completed_modules, status, created_at)
         VALUES(?, ?, ?, ?, ?, 0, ?, ?)",
        (
            &course_id,
            user_id,
            &name,
            &provider,
            total_modules,
            STATUS_IN_PROGRESS,
            now_ts(),
        ),
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "courses" }))
    })?;

    let Some(row) = load_course(conn, user_id, &course_id)? else {
        return Err(HandlerErr::db("db_query_failed", "course row missing after insert"));
    };
    Ok(json!({ "course": course_json(&row) }))
}

/// Steps the completed-module counter. Completion status is derived, never
/// set directly: completed whenever the counter reaches the total.
fn handle_courses_adjust_progress(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let course_id = required_str(params, "courseId")?;
    let delta = required_i64(params, "delta")?;
    if delta != 1 && delta != -1 {
        return Err(HandlerErr::bad_params("delta must be 1 or -1"));
    }

    let Some(mut course) = load_course(conn, user_id, &course_id)? else {
        return Err(HandlerErr::not_found("course not found"));
    };

    let next = (course.completed_modules + delta).clamp(0, course.total_modules);
    let status = if next >= course.total_modules {
        STATUS_COMPLETED
    } else {
        STATUS_IN_PROGRESS
    };
    conn.execute(
        "UPDATE courses SET completed_modules = ?, status = ? WHERE id = ?",
        (next, status, &course_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    course.completed_modules = next;
    course.status = status.to_string();
    Ok(json!({ "course": course_json(&course) }))
}

fn handle_courses_delete(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let course_id = required_str(params, "courseId")?;
    if load_course(conn, user_id, &course_id)?.is_none() {
        return Err(HandlerErr::not_found("course not found"));
    }
    conn.execute("DELETE FROM courses WHERE id = ?", [&course_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(with_db(state, req, handle_courses_list)),
        "courses.create" => Some(with_db(state, req, handle_courses_create)),
        "courses.adjustProgress" => Some(with_db(state, req, handle_courses_adjust_progress)),
        "courses.delete" => Some(with_db(state, req, handle_courses_delete)),
        _ => None,
    }
}
