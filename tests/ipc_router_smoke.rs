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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("campusd-router-smoke");
    let bundle_out = workspace.join("smoke-backup.campusbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));

    // Domain methods refuse to run before a workspace is selected.
    let early = request(&mut stdin, &mut reader, "1b", "subjects.list", json!({}));
    assert_eq!(early.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        early
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("no_workspace")
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let created = request(
        &mut stdin,
        &mut reader,
        "3",
        "subjects.create",
        json!({ "name": "Smoke Subject", "period": "Period 1" }),
    );
    let subject_id = created
        .get("result")
        .and_then(|v| v.get("subjectId"))
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    let _ = request(&mut stdin, &mut reader, "4", "subjects.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "5",
        "grades.add",
        json!({ "subjectId": subject_id, "name": "P1", "value": 8.0, "weight": 2.0 }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "6",
        "subjects.open",
        json!({ "subjectId": subject_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "7",
        "subjects.adjustAbsences",
        json!({ "subjectId": subject_id, "delta": 1 }),
    );
    let _ = request(&mut stdin, &mut reader, "8", "dashboard.overview", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "9",
        "tasks.create",
        json!({ "title": "Smoke task", "kind": "study", "date": "2099-01-01" }),
    );
    let _ = request(&mut stdin, &mut reader, "10", "tasks.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "11", "focus.state", json!({}));
    let _ = request(&mut stdin, &mut reader, "12", "focus.start", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "13",
        "focus.tick",
        json!({ "seconds": 5 }),
    );
    let _ = request(&mut stdin, &mut reader, "14", "focus.reset", json!({}));
    let _ = request(&mut stdin, &mut reader, "15", "stats.overview", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "16",
        "courses.create",
        json!({ "name": "Smoke Course", "totalModules": 4 }),
    );
    let _ = request(&mut stdin, &mut reader, "17", "courses.list", json!({}));
    let classroom = request(
        &mut stdin,
        &mut reader,
        "18",
        "classrooms.create",
        json!({ "name": "Smoke Room" }),
    );
    let classroom_id = classroom
        .get("result")
        .and_then(|v| v.get("classroomId"))
        .and_then(|v| v.as_str())
        .expect("classroomId")
        .to_string();
    let _ = request(&mut stdin, &mut reader, "19", "classrooms.list", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "20",
        "classrooms.open",
        json!({ "classroomId": classroom_id }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "21",
        "schedule.create",
        json!({
            "subjectId": subject_id,
            "dayOfWeek": 2,
            "startTime": "08:00",
            "endTime": "10:00"
        }),
    );
    let _ = request(&mut stdin, &mut reader, "22", "schedule.list", json!({}));
    let _ = request(&mut stdin, &mut reader, "23", "profile.get", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "24",
        "profile.update",
        json!({ "patch": { "fullName": "Smoke Tester" } }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "25",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "26",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle_out.to_string_lossy() }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "27",
        "subjects.delete",
        json!({ "subjectId": subject_id }),
    );

    // Unknown methods still come back with a structured error.
    writeln!(
        stdin,
        "{}",
        json!({ "id": "99", "method": "nope.nothing", "params": {} })
    )
    .expect("write unknown request");
    stdin.flush().expect("flush unknown request");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read unknown response");
    let unknown: serde_json::Value =
        serde_json::from_str(line.trim()).expect("parse unknown response");
    assert_eq!(unknown.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        unknown
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
