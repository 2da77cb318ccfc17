use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::ipc::helpers::{now_ts, required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};

const ROLE_ADMIN: &str = "admin";
const ROLE_STUDENT: &str = "student";

/// Shareable join code, e.g. "ENG-417": a short slug from the class name
/// plus a three-digit suffix derived from a fresh UUID.
fn make_invite_code(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let prefix = if prefix.is_empty() {
        "CLS".to_string()
    } else {
        prefix
    };
    let bytes = *Uuid::new_v4().as_bytes();
    let suffix = 100 + ((bytes[0] as u16) << 8 | bytes[1] as u16) % 900;
    format!("{}-{}", prefix, suffix)
}

fn membership_role(
    conn: &Connection,
    classroom_id: &str,
    user_id: &str,
) -> Result<Option<String>, HandlerErr> {
    conn.query_row(
        "SELECT role FROM classroom_members WHERE classroom_id = ? AND user_id = ?",
        [classroom_id, user_id],
        |r| r.get(0),
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))
}

fn require_membership(
    conn: &Connection,
    classroom_id: &str,
    user_id: &str,
) -> Result<String, HandlerErr> {
    membership_role(conn, classroom_id, user_id)?
        .ok_or_else(|| HandlerErr::not_found("classroom not found"))
}

fn handle_classrooms_list(
    conn: &Connection,
    user_id: &str,
    _params: &Value,
) -> Result<Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.name, c.invite_code, m.role,
               (SELECT COUNT(*) FROM classroom_members cm WHERE cm.classroom_id = c.id) AS member_count
             FROM classroom_members m
             JOIN classrooms c ON c.id = m.classroom_id
             WHERE m.user_id = ?
             ORDER BY c.name",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let classrooms: Vec<Value> = stmt
        .query_map([user_id], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let invite_code: String = r.get(2)?;
            let role: String = r.get(3)?;
            let member_count: i64 = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "inviteCode": invite_code,
                "role": role,
                "memberCount": member_count,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({ "classrooms": classrooms }))
}

fn handle_classrooms_create(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let classroom_id = Uuid::new_v4().to_string();
    let invite_code = make_invite_code(&name);

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    if let Err(e) = tx.execute(
        "INSERT INTO classrooms(id, owner_id, name, invite_code, created_at) VALUES(?, ?, ?, ?, ?)",
        (&classroom_id, user_id, &name, &invite_code, now_ts()),
    ) {
        let _ = tx.rollback();
        return Err(HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "classrooms" }),
        ));
    }
    // The creator joins their own room as admin in the same transaction.
    if let Err(e) = tx.execute(
        "INSERT INTO classroom_members(classroom_id, user_id, role) VALUES(?, ?, ?)",
        (&classroom_id, user_id, ROLE_ADMIN),
    ) {
        let _ = tx.rollback();
        return Err(HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "classroom_members" }),
        ));
    }
    tx.commit()
        .map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    Ok(json!({
        "classroomId": classroom_id,
        "name": name,
        "inviteCode": invite_code,
    }))
}

fn handle_classrooms_join(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let invite_code = required_str(params, "inviteCode")?.to_uppercase();

    let found: Option<(String, String)> = conn
        .query_row(
            "SELECT id, name FROM classrooms WHERE invite_code = ?",
            [&invite_code],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((classroom_id, name)) = found else {
        return Err(HandlerErr::not_found("invalid invite code"));
    };

    if membership_role(conn, &classroom_id, user_id)?.is_some() {
        return Err(HandlerErr::new(
            "already_member",
            "you already joined this classroom",
        ));
    }

    conn.execute(
        "INSERT INTO classroom_members(classroom_id, user_id, role) VALUES(?, ?, ?)",
        (&classroom_id, user_id, ROLE_STUDENT),
    )
    .map_err(|e| {
        HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "classroom_members" }),
        )
    })?;

    Ok(json!({
        "classroomId": classroom_id,
        "name": name,
        "role": ROLE_STUDENT,
    }))
}

fn handle_classrooms_open(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let role = require_membership(conn, &classroom_id, user_id)?;

    let header: (String, String) = conn
        .query_row(
            "SELECT name, invite_code FROM classrooms WHERE id = ?",
            [&classroom_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut post_stmt = conn
        .prepare(
            "SELECT p.id, p.user_id, p.content, p.created_at, pr.full_name
             FROM classroom_posts p
             LEFT JOIN profiles pr ON pr.id = p.user_id
             WHERE p.classroom_id = ?
             ORDER BY p.created_at DESC, p.id DESC",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let posts: Vec<Value> = post_stmt
        .query_map([&classroom_id], |r| {
            let id: String = r.get(0)?;
            let author_id: String = r.get(1)?;
            let content: String = r.get(2)?;
            let created_at: Option<String> = r.get(3)?;
            let author_name: Option<String> = r.get(4)?;
            Ok(json!({
                "id": id,
                "authorId": author_id,
                "authorName": author_name,
                "content": content,
                "createdAt": created_at,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let mut material_stmt = conn
        .prepare(
            "SELECT id, user_id, title, url, created_at
             FROM classroom_materials
             WHERE classroom_id = ?
             ORDER BY created_at, id",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let materials: Vec<Value> = material_stmt
        .query_map([&classroom_id], |r| {
            let id: String = r.get(0)?;
            let author_id: String = r.get(1)?;
            let title: String = r.get(2)?;
            let url: String = r.get(3)?;
            let created_at: Option<String> = r.get(4)?;
            Ok(json!({
                "id": id,
                "authorId": author_id,
                "title": title,
                "url": url,
                "createdAt": created_at,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({
        "classroom": {
            "id": classroom_id,
            "name": header.0,
            "inviteCode": header.1,
            "role": role,
        },
        "posts": posts,
        "materials": materials,
    }))
}

fn handle_classrooms_post(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let content = required_str(params, "content")?;
    require_membership(conn, &classroom_id, user_id)?;

    let post_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classroom_posts(id, classroom_id, user_id, content, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (&post_id, &classroom_id, user_id, &content, now_ts()),
    )
    .map_err(|e| {
        HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "classroom_posts" }),
        )
    })?;

    Ok(json!({ "postId": post_id }))
}

fn handle_classrooms_add_material(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let classroom_id = required_str(params, "classroomId")?;
    let title = required_str(params, "title")?;
    let url = required_str(params, "url")?;
    require_membership(conn, &classroom_id, user_id)?;

    let material_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classroom_materials(id, classroom_id, user_id, title, url, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&material_id, &classroom_id, user_id, &title, &url, now_ts()),
    )
    .map_err(|e| {
        HandlerErr::with_details(
            "db_insert_failed",
            e.to_string(),
            json!({ "table": "classroom_materials" }),
        )
    })?;

    Ok(json!({ "materialId": material_id }))
}

fn handle_classrooms_delete_material(
    conn: &Connection,
    user_id: &str,
    params: &Value,
) -> Result<Value, HandlerErr> {
    let material_id = required_str(params, "materialId")?;

    let found: Option<(String, String)> = conn
        .query_row(
            "SELECT classroom_id, user_id FROM classroom_materials WHERE id = ?",
            [&material_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((classroom_id, author_id)) = found else {
        return Err(HandlerErr::not_found("material not found"));
    };

    // Uploader can always remove their link; room admins can prune anyone's.
    let role = require_membership(conn, &classroom_id, user_id)?;
    if author_id != user_id && role != ROLE_ADMIN {
        return Err(HandlerErr::new(
            "forbidden",
            "only the uploader or an admin can remove a material",
        ));
    }

    conn.execute("DELETE FROM classroom_materials WHERE id = ?", [&material_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classrooms.list" => Some(with_db(state, req, handle_classrooms_list)),
        "classrooms.create" => Some(with_db(state, req, handle_classrooms_create)),
        "classrooms.join" => Some(with_db(state, req, handle_classrooms_join)),
        "classrooms.open" => Some(with_db(state, req, handle_classrooms_open)),
        "classrooms.post" => Some(with_db(state, req, handle_classrooms_post)),
        "classrooms.addMaterial" => Some(with_db(state, req, handle_classrooms_add_material)),
        "classrooms.deleteMaterial" => Some(with_db(state, req, handle_classrooms_delete_material)),
        _ => None,
    }
}
