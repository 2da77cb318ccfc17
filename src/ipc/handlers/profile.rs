use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ipc::error::err;
use crate::ipc::helpers::{now_ts, required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

fn profile_json(conn: &Connection, user_id: &str) -> Result<Value, HandlerErr> {
    conn.query_row(
        "SELECT id, full_name, course_name, total_semesters, passing_grade, avatar_path, updated_at
         FROM profiles
         WHERE id = ?",
        [user_id],
        |r| {
            let id: String = r.get(0)?;
            let full_name: Option<String> = r.get(1)?;
            let course_name: Option<String> = r.get(2)?;
            let total_semesters: i64 = r.get(3)?;
            let passing_grade: f64 = r.get(4)?;
            let avatar_path: Option<String> = r.get(5)?;
            let updated_at: Option<String> = r.get(6)?;
            Ok(json!({
                "id": id,
                "fullName": full_name,
                "courseName": course_name,
                "totalSemesters": total_semesters,
                "passingGrade": passing_grade,
                "avatarPath": avatar_path,
                "updatedAt": updated_at,
            }))
        },
    )
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn handle_profile_get(conn: &Connection, user_id: &str, _params: &Value) -> Result<Value, HandlerErr> {
    profile_json(conn, user_id)
}

fn handle_profile_update(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing patch object"));
    };

    let mut sets: Vec<&'static str> = Vec::new();
    let mut binds: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(v) = patch.get("fullName") {
        let Some(name) = v.as_str() else {
            return Err(HandlerErr::bad_params("fullName must be string"));
        };
        sets.push("full_name = ?");
        binds.push(rusqlite::types::Value::Text(name.trim().to_string()));
    }
    if let Some(v) = patch.get("courseName") {
        let Some(course) = v.as_str() else {
            return Err(HandlerErr::bad_params("courseName must be string"));
        };
        sets.push("course_name = ?");
        binds.push(rusqlite::types::Value::Text(course.trim().to_string()));
    }
    if let Some(v) = patch.get("totalSemesters") {
        let Some(n) = v.as_i64() else {
            return Err(HandlerErr::bad_params("totalSemesters must be integer"));
        };
        if !(1..=16).contains(&n) {
            return Err(HandlerErr::bad_params("totalSemesters must be in 1..=16"));
        }
        sets.push("total_semesters = ?");
        binds.push(rusqlite::types::Value::Integer(n));
    }
    if let Some(v) = patch.get("passingGrade") {
        let Some(g) = v.as_f64() else {
            return Err(HandlerErr::bad_params("passingGrade must be a number"));
        };
        if !(0.0..=10.0).contains(&g) {
            return Err(HandlerErr::bad_params("passingGrade must be in 0..=10"));
        }
        sets.push("passing_grade = ?");
        binds.push(rusqlite::types::Value::Real(g));
    }

    if sets.is_empty() {
        return Err(HandlerErr::bad_params("patch has no supported fields"));
    }

    sets.push("updated_at = ?");
    binds.push(rusqlite::types::Value::Text(now_ts()));
    binds.push(rusqlite::types::Value::Text(user_id.to_string()));

    let sql = format!("UPDATE profiles SET {} WHERE id = ?", sets.join(", "));
    conn.execute(&sql, rusqlite::params_from_iter(binds))
        .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    profile_json(conn, user_id)
}

/// Copies a local image into the workspace's asset folder and points the
/// profile at it. The stored path is workspace-relative so bundles stay
/// portable.
fn handle_profile_set_avatar(state: &AppState, req: &Request) -> serde_json::Value {
    let (Some(conn), Some(user_id), Some(workspace)) = (
        state.db.as_ref(),
        state.user_id.as_deref(),
        state.workspace.as_ref(),
    ) else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let source = match required_str(&req.params, "sourcePath") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let source_path = std::path::Path::new(&source);
    if !source_path.is_file() {
        return err(&req.id, "not_found", "avatar source file not found", None);
    }

    let ext = source_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("png")
        .to_ascii_lowercase();
    let rel = format!("assets/avatars/{}.{}", Uuid::new_v4(), ext);
    let dest = workspace.join(&rel);
    if let Some(parent) = dest.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return err(&req.id, "asset_write_failed", e.to_string(), None);
        }
    }
    if let Err(e) = std::fs::copy(source_path, &dest) {
        return err(&req.id, "asset_write_failed", e.to_string(), None);
    }

    if let Err(e) = conn.execute(
        "UPDATE profiles SET avatar_path = ?, updated_at = ? WHERE id = ?",
        (&rel, now_ts(), user_id),
    ) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    crate::ipc::error::ok(&req.id, json!({ "avatarPath": rel }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profile.get" => Some(with_db(state, req, handle_profile_get)),
        "profile.update" => Some(with_db(state, req, handle_profile_update)),
        "profile.setAvatar" => Some(handle_profile_set_avatar(state, req)),
        _ => None,
    }
}
