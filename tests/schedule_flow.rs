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
fn weekly_grid_filters_by_day_and_backfills_professor() {
    let workspace = temp_dir("campusd-schedule");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "subjects.create",
        json!({ "name": "Structures" }),
    );
    let subject_id = created
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedule.create",
        json!({
            "subjectId": subject_id,
            "dayOfWeek": 2,
            "startTime": "08:00",
            "endTime": "10:00",
            "location": "Block B - Room 102",
            "professor": "Dr. Silva"
        }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "schedule.create",
        json!({
            "subjectId": subject_id,
            "dayOfWeek": 4,
            "startTime": "14:00",
            "endTime": "16:00"
        }),
    );

    // Typing the professor on the slot form persists it on the subject.
    let listed = request_ok(&mut stdin, &mut reader, "5", "subjects.list", json!({}));
    let card = listed
        .get("subjects")
        .and_then(|v| v.as_array())
        .and_then(|a| a.first())
        .expect("card");
    assert_eq!(
        card.get("professor").and_then(|v| v.as_str()),
        Some("Dr. Silva")
    );

    let tuesday = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "schedule.list",
        json!({ "dayOfWeek": 2 }),
    );
    let entries = tuesday
        .get("entries")
        .and_then(|v| v.as_array())
        .expect("entries");
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.get("startTime").and_then(|v| v.as_str()), Some("08:00"));
    assert_eq!(
        entry.get("location").and_then(|v| v.as_str()),
        Some("Block B - Room 102")
    );
    assert_eq!(
        entry
            .get("subject")
            .and_then(|s| s.get("name"))
            .and_then(|v| v.as_str()),
        Some("Structures")
    );
    assert!(entry.get("happeningNow").and_then(|v| v.as_bool()).is_some());

    let wednesday = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "schedule.list",
        json!({ "dayOfWeek": 3 }),
    );
    assert_eq!(
        wednesday
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    let all = request_ok(&mut stdin, &mut reader, "8", "schedule.list", json!({}));
    let entries = all.get("entries").and_then(|v| v.as_array()).expect("entries");
    assert_eq!(entries.len(), 2);
    let entry_id = entries[0]
        .get("id")
        .and_then(|v| v.as_str())
        .expect("entry id")
        .to_string();

    // Out-of-range days and malformed times are rejected.
    let bad_day = request(
        &mut stdin,
        &mut reader,
        "9",
        "schedule.list",
        json!({ "dayOfWeek": 9 }),
    );
    assert_eq!(
        bad_day
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );
    let bad_time = request(
        &mut stdin,
        &mut reader,
        "10",
        "schedule.create",
        json!({
            "subjectId": subject_id,
            "dayOfWeek": 2,
            "startTime": "8am",
            "endTime": "10:00"
        }),
    );
    assert_eq!(
        bad_time
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "schedule.delete",
        json!({ "scheduleId": entry_id }),
    );
    let all = request_ok(&mut stdin, &mut reader, "12", "schedule.list", json!({}));
    assert_eq!(
        all.get("entries").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
