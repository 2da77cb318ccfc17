use serde_json::json;
use std::path::PathBuf;

use crate::backup;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};

use super::core::ensure_local_user;

fn param_path(params: &serde_json::Value, key: &str) -> Option<PathBuf> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
}

fn handle_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = match param_path(&req.params, "workspacePath")
        .or_else(|| state.workspace.clone())
    {
        Some(p) => p,
        None => return err(&req.id, "bad_params", "missing workspacePath", None),
    };
    let Some(out_path) = param_path(&req.params, "outPath") else {
        return err(&req.id, "bad_params", "missing outPath", None);
    };

    match backup::export_workspace_bundle(&workspace, &out_path) {
        Ok(summary) => ok(
            &req.id,
            json!({
                "outPath": out_path.to_string_lossy(),
                "bundleFormat": summary.bundle_format,
                "entryCount": summary.entry_count,
            }),
        ),
        Err(e) => err(&req.id, "backup_export_failed", format!("{e:?}"), None),
    }
}

fn handle_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let workspace = match param_path(&req.params, "workspacePath")
        .or_else(|| state.workspace.clone())
    {
        Some(p) => p,
        None => return err(&req.id, "bad_params", "missing workspacePath", None),
    };
    let Some(in_path) = param_path(&req.params, "inPath") else {
        return err(&req.id, "bad_params", "missing inPath", None);
    };

    // Release the live connection before the file swap when restoring into
    // the currently open workspace.
    let replacing_current = state.workspace.as_deref() == Some(workspace.as_path());
    if replacing_current {
        state.db = None;
    }

    let summary = match backup::import_workspace_bundle(&in_path, &workspace) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "backup_import_failed", format!("{e:?}"), None),
    };

    if replacing_current {
        match db::open_db(&workspace) {
            Ok(conn) => match ensure_local_user(&conn) {
                Ok(user_id) => {
                    state.user_id = Some(user_id);
                    state.db = Some(conn);
                }
                Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
            },
            Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
        }
    }

    ok(
        &req.id,
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "bundleFormatDetected": summary.bundle_format_detected,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.exportWorkspaceBundle" => Some(handle_export(state, req)),
        "backup.importWorkspaceBundle" => Some(handle_import(state, req)),
        _ => None,
    }
}
