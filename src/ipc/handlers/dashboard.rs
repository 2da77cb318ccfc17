use rusqlite::Connection;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::calc;
use crate::ipc::helpers::{with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

use super::subjects::{load_grade_entries, load_subjects, subject_card_json, SubjectRow};

struct ProfileHeader {
    full_name: Option<String>,
    course_name: Option<String>,
    avatar_path: Option<String>,
    total_semesters: i64,
    passing_grade: f64,
}

fn load_profile_header(conn: &Connection, user_id: &str) -> Result<ProfileHeader, HandlerErr> {
    conn.query_row(
        "SELECT full_name, course_name, avatar_path, total_semesters, passing_grade
         FROM profiles
         WHERE id = ?",
        [user_id],
        |r| {
            Ok(ProfileHeader {
                full_name: r.get(0)?,
                course_name: r.get(1)?,
                avatar_path: r.get(2)?,
                total_semesters: r.get(3)?,
                passing_grade: r.get(4)?,
            })
        },
    )
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

/// Whether a subject counts as passed for period progress. The dashboard
/// measures everyone against the profile-wide target, not the subject's
/// own threshold; subjects without weighted grades sit at 0 and fail it.
fn passes_profile_target(
    conn: &Connection,
    subject: &SubjectRow,
    passing_grade: f64,
) -> Result<bool, HandlerErr> {
    let entries = load_grade_entries(conn, &subject.id)?;
    let average = calc::weighted_average(entries);
    Ok(average >= passing_grade)
}

fn handle_dashboard_overview(
    conn: &Connection,
    user_id: &str,
    _params: &Value,
) -> Result<Value, HandlerErr> {
    let profile = load_profile_header(conn, user_id)?;
    let subjects = load_subjects(conn, user_id)?;

    let mut by_period: HashMap<String, Vec<&SubjectRow>> = HashMap::new();
    for s in &subjects {
        let label = s
            .period
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| calc::EXTRAS_PERIOD.to_string());
        by_period.entry(label).or_default().push(s);
    }

    let expected = profile.total_semesters.max(1) as usize;
    let mut periods = Vec::with_capacity(expected);
    let mut period_percents = Vec::with_capacity(expected);
    for i in 0..expected {
        let label = calc::period_label(i);
        let subs = by_period.get(&label).cloned().unwrap_or_default();
        let mut passed_flags = Vec::with_capacity(subs.len());
        let mut cards = Vec::with_capacity(subs.len());
        for s in &subs {
            passed_flags.push(passes_profile_target(conn, s, profile.passing_grade)?);
            cards.push(subject_card_json(conn, s)?);
        }
        let progress = calc::period_progress(&passed_flags);
        period_percents.push(progress);
        periods.push(json!({
            "label": label,
            "subjects": cards,
            "progress": progress,
            "completed": progress == 100 && !subs.is_empty(),
        }));
    }

    // Unlabeled subjects are listed but stay out of the global mean.
    let extras = match by_period.get(calc::EXTRAS_PERIOD) {
        Some(subs) if !subs.is_empty() => {
            let mut passed_flags = Vec::with_capacity(subs.len());
            let mut cards = Vec::with_capacity(subs.len());
            for s in subs {
                passed_flags.push(passes_profile_target(conn, s, profile.passing_grade)?);
                cards.push(subject_card_json(conn, s)?);
            }
            json!({
                "label": calc::EXTRAS_PERIOD,
                "subjects": cards,
                "progress": calc::period_progress(&passed_flags),
            })
        }
        _ => Value::Null,
    };

    Ok(json!({
        "profile": {
            "fullName": profile.full_name,
            "courseName": profile.course_name,
            "avatarPath": profile.avatar_path,
            "totalSemesters": profile.total_semesters,
            "passingGrade": profile.passing_grade,
        },
        "periods": periods,
        "extras": extras,
        "globalProgress": calc::global_progress(&period_percents),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.overview" => Some(with_db(state, req, handle_dashboard_overview)),
        _ => None,
    }
}
