use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_campusd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn campusd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> &str {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

#[test]
fn create_join_post_and_materials() {
    let workspace = temp_dir("campusd-classrooms");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "profile.update",
        json!({ "patch": { "fullName": "Ana Souza" } }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "classrooms.create",
        json!({ "name": "Engineering 2025" }),
    );
    let classroom_id = created
        .get("classroomId")
        .and_then(|v| v.as_str())
        .expect("classroomId")
        .to_string();
    let invite_code = created
        .get("inviteCode")
        .and_then(|v| v.as_str())
        .expect("inviteCode")
        .to_string();
    assert!(
        invite_code.starts_with("ENG-"),
        "invite code shape: {}",
        invite_code
    );
    let suffix = invite_code.split('-').nth(1).expect("suffix");
    assert_eq!(suffix.len(), 3);
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));

    // The creator shows up as the room's admin.
    let listed = request_ok(&mut stdin, &mut reader, "4", "classrooms.list", json!({}));
    let rooms = listed
        .get("classrooms")
        .and_then(|v| v.as_array())
        .expect("classrooms");
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].get("role").and_then(|v| v.as_str()), Some("admin"));
    assert_eq!(rooms[0].get("memberCount").and_then(|v| v.as_i64()), Some(1));

    // One account, one membership.
    let dup = request(
        &mut stdin,
        &mut reader,
        "5",
        "classrooms.join",
        json!({ "inviteCode": invite_code }),
    );
    assert_eq!(error_code(&dup), "already_member");
    let bogus = request(
        &mut stdin,
        &mut reader,
        "6",
        "classrooms.join",
        json!({ "inviteCode": "ZZZ-000" }),
    );
    assert_eq!(error_code(&bogus), "not_found");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "classrooms.post",
        json!({ "classroomId": classroom_id, "content": "Welcome everyone!" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "classrooms.addMaterial",
        json!({
            "classroomId": classroom_id,
            "title": "Syllabus",
            "url": "https://example.edu/syllabus.pdf"
        }),
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "classrooms.open",
        json!({ "classroomId": classroom_id }),
    );
    let posts = opened.get("posts").and_then(|v| v.as_array()).expect("posts");
    assert_eq!(posts.len(), 1);
    assert_eq!(
        posts[0].get("authorName").and_then(|v| v.as_str()),
        Some("Ana Souza")
    );
    assert_eq!(
        posts[0].get("content").and_then(|v| v.as_str()),
        Some("Welcome everyone!")
    );
    let materials = opened
        .get("materials")
        .and_then(|v| v.as_array())
        .expect("materials");
    assert_eq!(materials.len(), 1);
    let material_id = materials[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("material id")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "classrooms.deleteMaterial",
        json!({ "materialId": material_id }),
    );
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "classrooms.open",
        json!({ "classroomId": classroom_id }),
    );
    assert_eq!(
        opened
            .get("materials")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    // Posting into someone else's (unknown) room reads as not found.
    let stranger = request(
        &mut stdin,
        &mut reader,
        "12",
        "classrooms.open",
        json!({ "classroomId": "no-such-room" }),
    );
    assert_eq!(error_code(&stranger), "not_found");

    // Blank posts are rejected before touching the store.
    let blank = request(
        &mut stdin,
        &mut reader,
        "13",
        "classrooms.post",
        json!({ "classroomId": classroom_id, "content": "   " }),
    );
    assert_eq!(error_code(&blank), "bad_params");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
