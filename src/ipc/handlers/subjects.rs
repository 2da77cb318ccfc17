use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::calc;
use crate::ipc::helpers::{
    now_ts, optional_f64, optional_i64, optional_str, required_i64, required_str, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};

#[derive(Debug, Clone)]
pub(crate) struct SubjectRow {
    pub id: String,
    pub name: String,
    pub professor: Option<String>,
    pub period: Option<String>,
    pub max_absences: i64,
    pub current_absences: i64,
    pub passing_grade: f64,
}

pub(crate) fn load_subjects(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<SubjectRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, name, professor, period, max_absences, current_absences, passing_grade
             FROM subjects
             WHERE user_id = ?
             ORDER BY created_at, id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([user_id], |r| {
        Ok(SubjectRow {
            id: r.get(0)?,
            name: r.get(1)?,
            professor: r.get(2)?,
            period: r.get(3)?,
            max_absences: r.get(4)?,
            current_absences: r.get(5)?,
            passing_grade: r.get(6)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub(crate) fn load_subject(
    conn: &Connection,
    user_id: &str,
    subject_id: &str,
) -> Result<Option<SubjectRow>, HandlerErr> {
    conn.query_row(
        "SELECT id, name, professor, period, max_absences, current_absences, passing_grade
         FROM subjects
         WHERE id = ? AND user_id = ?",
        [subject_id, user_id],
        |r| {
            Ok(SubjectRow {
                id: r.get(0)?,
                name: r.get(1)?,
                professor: r.get(2)?,
                period: r.get(3)?,
                max_absences: r.get(4)?,
                current_absences: r.get(5)?,
                passing_grade: r.get(6)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

pub(crate) fn load_grade_entries(
    conn: &Connection,
    subject_id: &str,
) -> Result<Vec<calc::GradeEntry>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT value, weight FROM grades WHERE subject_id = ?")
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    stmt.query_map([subject_id], |r| {
        Ok(calc::GradeEntry {
            value: r.get(0)?,
            weight: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

/// Card payload the subject list and dashboard share: raw fields plus the
/// derived average and indicator colors.
pub(crate) fn subject_card_json(conn: &Connection, s: &SubjectRow) -> Result<Value, HandlerErr> {
    let entries = load_grade_entries(conn, &s.id)?;
    let (total_weight, _) = calc::grade_totals(entries.iter().copied());
    let average = calc::weighted_average(entries);
    let classification = calc::classify(
        average,
        Some(s.passing_grade),
        s.current_absences,
        s.max_absences,
    );
    let light = calc::status_light(
        average,
        total_weight,
        Some(s.passing_grade),
        s.current_absences,
        s.max_absences,
    );
    Ok(json!({
        "id": s.id,
        "name": s.name,
        "professor": s.professor,
        "period": s.period,
        "maxAbsences": s.max_absences,
        "currentAbsences": s.current_absences,
        "passingGrade": s.passing_grade,
        "average": average,
        "hasGrades": total_weight > 0.0,
        "passed": classification.passed,
        "attendanceRisk": classification.attendance_risk.as_str(),
        "statusLight": light.as_str(),
    }))
}

fn handle_subjects_list(
    conn: &Connection,
    user_id: &str,
    _params: &Value,
) -> Result<Value, HandlerErr> {
    let mut cards = Vec::new();
    for s in load_subjects(conn, user_id)? {
        cards.push(subject_card_json(conn, &s)?);
    }
    Ok(json!({ "subjects": cards }))
}

fn handle_subjects_create(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let professor = optional_str(params, "professor");
    let period = optional_str(params, "period");
    let max_absences = optional_i64(params, "maxAbsences").unwrap_or(calc::DEFAULT_MAX_ABSENCES);
    if max_absences < 0 {
        return Err(HandlerErr::bad_params("maxAbsences must be >= 0"));
    }
    let passing_grade =
        optional_f64(params, "passingGrade").unwrap_or(calc::DEFAULT_PASSING_GRADE);

    let subject_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO subjects(id, user_id, name, professor, period, max_absences, current_absences, passing_grade, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, ?, ?)",
        (
            &subject_id,
            user_id,
            &name,
            &professor,
            &period,
            max_absences,
            passing_grade,
            now_ts(),
        ),
    )
    .map_err(|e| {
        HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "subjects" }))
    })?;

    Ok(json!({
        "subjectId": subject_id,
        "name": name,
        "period": period,
    }))
}

fn handle_subjects_open(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let Some(s) = load_subject(conn, user_id, &subject_id)? else {
        return Err(HandlerErr::not_found("subject not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT id, name, weight, value, unit
             FROM grades
             WHERE subject_id = ?
             ORDER BY rowid",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let grades: Vec<Value> = stmt
        .query_map([&subject_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let weight: f64 = r.get(2)?;
            let value: f64 = r.get(3)?;
            let unit: Option<String> = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "weight": weight,
                "value": value,
                "unit": unit,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let entries = load_grade_entries(conn, &subject_id)?;
    let (total_weight, total_points) = calc::grade_totals(entries.iter().copied());
    let average = calc::weighted_average(entries);

    // The "what do I need on the next exam" panel only makes sense once
    // something is graded and the target is still ahead.
    let next_exam = if total_weight > 0.0 && average < s.passing_grade {
        let (kind, score) =
            calc::needed_on_next(s.passing_grade, total_weight, total_points).as_json_parts();
        json!({ "kind": kind, "score": score })
    } else {
        Value::Null
    };

    let card = subject_card_json(conn, &s)?;
    Ok(json!({
        "subject": card,
        "grades": grades,
        "totalWeight": total_weight,
        "average": average,
        "nextExamTarget": next_exam,
    }))
}

fn handle_subjects_adjust_absences(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let delta = required_i64(params, "delta")?;
    if delta != 1 && delta != -1 {
        return Err(HandlerErr::bad_params("delta must be 1 or -1"));
    }

    let Some(s) = load_subject(conn, user_id, &subject_id)? else {
        return Err(HandlerErr::not_found("subject not found"));
    };

    let next = (s.current_absences + delta).max(0);
    conn.execute(
        "UPDATE subjects SET current_absences = ? WHERE id = ?",
        (next, &subject_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;

    let risk = calc::classify(0.0, None, next, s.max_absences).attendance_risk;
    Ok(json!({
        "subjectId": subject_id,
        "currentAbsences": next,
        "maxAbsences": s.max_absences,
        "attendanceRisk": risk.as_str(),
    }))
}

fn handle_subjects_delete(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let subject_id = required_str(params, "subjectId")?;
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects WHERE id = ? AND user_id = ?",
            [subject_id.as_str(), user_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    if exists.is_none() {
        return Err(HandlerErr::not_found("subject not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;

    // Delete dependents first, keep history rows but unlink them.
    let steps: [(&str, &str); 4] = [
        ("grades", "DELETE FROM grades WHERE subject_id = ?"),
        ("schedules", "DELETE FROM schedules WHERE subject_id = ?"),
        ("tasks", "UPDATE tasks SET subject_id = NULL WHERE subject_id = ?"),
        (
            "study_sessions",
            "UPDATE study_sessions SET subject_id = NULL WHERE subject_id = ?",
        ),
    ];
    for (table, sql) in steps {
        if let Err(e) = tx.execute(sql, [&subject_id]) {
            let _ = tx.rollback();
            return Err(HandlerErr::with_details(
                "db_delete_failed",
                e.to_string(),
                json!({ "table": table }),
            ));
        }
    }
    if let Err(e) = tx.execute("DELETE FROM subjects WHERE id = ?", [&subject_id]) {
        let _ = tx.rollback();
        return Err(HandlerErr::with_details(
            "db_delete_failed",
            e.to_string(),
            json!({ "table": "subjects" }),
        ));
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(with_db(state, req, handle_subjects_list)),
        "subjects.create" => Some(with_db(state, req, handle_subjects_create)),
        "subjects.open" => Some(with_db(state, req, handle_subjects_open)),
        "subjects.adjustAbsences" => Some(with_db(state, req, handle_subjects_adjust_absences)),
        "subjects.delete" => Some(with_db(state, req, handle_subjects_delete)),
        _ => None,
    }
}
