use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "userId": state.user_id,
        }),
    )
}

/// Loads the stable local user id, minting one (plus its profile row) the
/// first time a workspace opens.
pub(crate) fn ensure_local_user(conn: &rusqlite::Connection) -> anyhow::Result<String> {
    if let Some(v) = db::settings_get_json(conn, "session.userId")? {
        if let Some(id) = v.as_str() {
            conn.execute("INSERT OR IGNORE INTO profiles(id) VALUES(?)", [id])?;
            return Ok(id.to_string());
        }
    }
    let id = Uuid::new_v4().to_string();
    db::settings_set_json(conn, "session.userId", &json!(id))?;
    conn.execute("INSERT OR IGNORE INTO profiles(id) VALUES(?)", [&id])?;
    Ok(id)
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match db::open_db(&path) {
        Ok(conn) => {
            let user_id = match ensure_local_user(&conn) {
                Ok(id) => id,
                Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
            };
            state.workspace = Some(path.clone());
            state.user_id = Some(user_id.clone());
            state.db = Some(conn);
            ok(
                &req.id,
                json!({
                    "workspacePath": path.to_string_lossy(),
                    "userId": user_id,
                }),
            )
        }
        Err(e) => err(&req.id, "db_open_failed", format!("{e:?}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
