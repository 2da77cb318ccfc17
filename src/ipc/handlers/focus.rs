use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{now_ts, optional_i64, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::timer::{Completion, FocusTimer, TimerMode};

fn timer_json(t: &FocusTimer) -> Value {
    json!({
        "mode": t.mode().as_str(),
        "state": t.state().as_str(),
        "remainingSeconds": t.remaining_seconds(),
        "totalSeconds": t.total_seconds(),
        "progress": t.progress(),
        "sessionSaved": t.session_saved(),
        "subjectId": t.subject_id(),
    })
}

fn workspace_open(state: &AppState) -> bool {
    state.db.is_some() && state.user_id.is_some()
}

fn no_workspace(req: &Request) -> Value {
    err(&req.id, "no_workspace", "select a workspace first", None)
}

fn handle_focus_state(state: &AppState, req: &Request) -> Value {
    if !workspace_open(state) {
        return no_workspace(req);
    }
    ok(&req.id, json!({ "timer": timer_json(&state.timer) }))
}

fn handle_focus_start(state: &mut AppState, req: &Request) -> Value {
    if !workspace_open(state) {
        return no_workspace(req);
    }

    let subject_id = optional_str(&req.params, "subjectId");
    if let Some(ref sid) = subject_id {
        let (Some(conn), Some(user_id)) = (state.db.as_ref(), state.user_id.as_deref()) else {
            return no_workspace(req);
        };
        let owned: Result<Option<i64>, _> = conn
            .query_row(
                "SELECT 1 FROM subjects WHERE id = ? AND user_id = ?",
                [sid.as_str(), user_id],
                |r| r.get(0),
            )
            .optional();
        match owned {
            Ok(Some(_)) => {}
            Ok(None) => return err(&req.id, "not_found", "subject not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    match state.timer.start(subject_id) {
        Ok(()) => ok(&req.id, json!({ "timer": timer_json(&state.timer) })),
        Err(e) => err(&req.id, "invalid_state", e.message, None),
    }
}

fn handle_focus_pause(state: &mut AppState, req: &Request) -> Value {
    if !workspace_open(state) {
        return no_workspace(req);
    }
    match state.timer.pause() {
        Ok(()) => ok(&req.id, json!({ "timer": timer_json(&state.timer) })),
        Err(e) => err(&req.id, "invalid_state", e.message, None),
    }
}

fn handle_focus_reset(state: &mut AppState, req: &Request) -> Value {
    if !workspace_open(state) {
        return no_workspace(req);
    }
    state.timer.reset();
    ok(&req.id, json!({ "timer": timer_json(&state.timer) }))
}

fn handle_focus_switch_mode(state: &mut AppState, req: &Request) -> Value {
    if !workspace_open(state) {
        return no_workspace(req);
    }
    let raw = match required_str(&req.params, "mode") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(mode) = TimerMode::parse(&raw) else {
        return err(
            &req.id,
            "bad_params",
            "mode must be focus, shortBreak or longBreak",
            None,
        );
    };
    match state.timer.switch_mode(mode) {
        Ok(()) => ok(&req.id, json!({ "timer": timer_json(&state.timer) })),
        Err(e) => err(&req.id, "invalid_state", e.message, None),
    }
}

/// Advances the countdown by the client's elapsed ticks. Completing a focus
/// cycle writes the study session here, inside the same request, so the
/// record exists before the client ever sees the completed state.
fn handle_focus_tick(state: &mut AppState, req: &Request) -> Value {
    if !workspace_open(state) {
        return no_workspace(req);
    }
    let seconds = optional_i64(&req.params, "seconds").unwrap_or(1);
    if !(1..=24 * 60 * 60).contains(&seconds) {
        return err(&req.id, "bad_params", "seconds must be in 1..=86400", None);
    }

    let completion = state.timer.tick_many(seconds as u32);
    let event = match completion {
        None => Value::Null,
        Some(Completion::BreakFinished) => json!({ "kind": "breakFinished" }),
        Some(Completion::FocusFinished {
            minutes,
            subject_id,
        }) => {
            let (Some(conn), Some(user_id)) = (state.db.as_ref(), state.user_id.as_deref()) else {
                return no_workspace(req);
            };
            let session_id = Uuid::new_v4().to_string();
            if let Err(e) = conn.execute(
                "INSERT INTO study_sessions(id, user_id, subject_id, minutes, created_at)
                 VALUES(?, ?, ?, ?, ?)",
                (&session_id, user_id, &subject_id, minutes, now_ts()),
            ) {
                return err(
                    &req.id,
                    "db_insert_failed",
                    e.to_string(),
                    Some(json!({ "table": "study_sessions" })),
                );
            }
            json!({
                "kind": "focusFinished",
                "minutes": minutes,
                "sessionId": session_id,
                "subjectId": subject_id,
            })
        }
    };

    ok(
        &req.id,
        json!({
            "timer": timer_json(&state.timer),
            "event": event,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "focus.state" => Some(handle_focus_state(state, req)),
        "focus.start" => Some(handle_focus_start(state, req)),
        "focus.pause" => Some(handle_focus_pause(state, req)),
        "focus.reset" => Some(handle_focus_reset(state, req)),
        "focus.switchMode" => Some(handle_focus_switch_mode(state, req)),
        "focus.tick" => Some(handle_focus_tick(state, req)),
        _ => None,
    }
}
