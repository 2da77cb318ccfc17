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

#[test]
fn profile_defaults_updates_and_avatar() {
    let workspace = temp_dir("campusd-profile");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let user_id = selected
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string();

    // The profile row is born with the plan defaults.
    let profile = request_ok(&mut stdin, &mut reader, "2", "profile.get", json!({}));
    assert_eq!(profile.get("id").and_then(|v| v.as_str()), Some(user_id.as_str()));
    assert_eq!(profile.get("totalSemesters").and_then(|v| v.as_i64()), Some(8));
    assert_eq!(profile.get("passingGrade").and_then(|v| v.as_f64()), Some(7.0));
    assert!(profile.get("fullName").map(|v| v.is_null()).unwrap_or(false));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "profile.update",
        json!({ "patch": {
            "fullName": "Ana Souza",
            "courseName": "Civil Engineering",
            "totalSemesters": 10,
            "passingGrade": 6.0
        }}),
    );
    assert_eq!(updated.get("fullName").and_then(|v| v.as_str()), Some("Ana Souza"));
    assert_eq!(updated.get("totalSemesters").and_then(|v| v.as_i64()), Some(10));
    assert!(updated.get("updatedAt").and_then(|v| v.as_str()).is_some());

    // Reopening the same workspace keeps the same identity and data.
    let reselected = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(
        reselected.get("userId").and_then(|v| v.as_str()),
        Some(user_id.as_str())
    );
    let profile = request_ok(&mut stdin, &mut reader, "5", "profile.get", json!({}));
    assert_eq!(
        profile.get("courseName").and_then(|v| v.as_str()),
        Some("Civil Engineering")
    );

    // Out-of-range settings are refused.
    let bad = request(
        &mut stdin,
        &mut reader,
        "6",
        "profile.update",
        json!({ "patch": { "totalSemesters": 0 } }),
    );
    assert_eq!(
        bad.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    // Avatar upload copies the image into the workspace asset tree.
    let source = workspace.join("me.png");
    std::fs::write(&source, b"not-really-a-png").expect("write avatar source");
    let set = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "profile.setAvatar",
        json!({ "sourcePath": source.to_string_lossy() }),
    );
    let avatar_path = set
        .get("avatarPath")
        .and_then(|v| v.as_str())
        .expect("avatarPath")
        .to_string();
    assert!(avatar_path.starts_with("assets/avatars/"));
    assert!(avatar_path.ends_with(".png"));
    assert!(workspace.join(&avatar_path).is_file());

    let profile = request_ok(&mut stdin, &mut reader, "8", "profile.get", json!({}));
    assert_eq!(
        profile.get("avatarPath").and_then(|v| v.as_str()),
        Some(avatar_path.as_str())
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
