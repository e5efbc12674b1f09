#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub type Reader = BufReader<ChildStdout>;

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, Reader) {
    let exe = env!("CARGO_BIN_EXE_obed");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn obed");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut Reader,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut Reader,
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

/// Returns the error object of a request that must fail.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut Reader,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().expect("error object")
}

pub fn str_at<'a>(v: &'a serde_json::Value, pointer: &str) -> &'a str {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or_else(|| panic!("missing string at {} in {}", pointer, v))
}

pub struct Fixture {
    pub course_id: String,
    /// (id, usn) in USN order.
    pub students: Vec<(String, String)>,
}

/// Open a workspace with one course and three enrolled students.
pub fn seed_course(stdin: &mut ChildStdin, reader: &mut Reader, workspace: &PathBuf) -> Fixture {
    let _ = request_ok(
        stdin,
        reader,
        "seed-ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course = request_ok(
        stdin,
        reader,
        "seed-course",
        "courses.create",
        json!({ "code": "CS301", "name": "Data Structures", "semester": 3 }),
    );
    let course_id = str_at(&course, "/course/id").to_string();

    let mut students = Vec::new();
    for (i, (usn, name)) in [
        ("1RV21CS001", "Asha Rao"),
        ("1RV21CS002", "Bharath K"),
        ("1RV21CS003", "Chitra M"),
    ]
    .into_iter()
    .enumerate()
    {
        let s = request_ok(
            stdin,
            reader,
            &format!("seed-student-{}", i),
            "students.create",
            json!({ "usn": usn, "name": name }),
        );
        students.push((str_at(&s, "/student/id").to_string(), usn.to_string()));
    }
    let ids: Vec<&str> = students.iter().map(|(id, _)| id.as_str()).collect();
    let _ = request_ok(
        stdin,
        reader,
        "seed-enroll",
        "students.enroll",
        json!({ "courseId": course_id, "studentIds": ids }),
    );
    Fixture {
        course_id,
        students,
    }
}

/// Id of the most recently added tool in a draft view.
pub fn last_tool_id(view: &serde_json::Value) -> String {
    view.get("tools")
        .and_then(|v| v.as_array())
        .and_then(|a| a.last())
        .and_then(|t| t.get("id"))
        .and_then(|v| v.as_str())
        .expect("tool id")
        .to_string()
}

/// Configure CO1, CO2 and "Internal Assessment 1" (30 marks, 15 + 15) and save.
pub fn configure_ia1(stdin: &mut ChildStdin, reader: &mut Reader, course_id: &str) -> String {
    let _ = request_ok(stdin, reader, "cfg-open", "config.open", json!({ "courseId": course_id }));
    let _ = request_ok(stdin, reader, "cfg-co1", "config.coAdd", json!({}));
    let _ = request_ok(stdin, reader, "cfg-co2", "config.coAdd", json!({}));
    let view = request_ok(stdin, reader, "cfg-tool", "config.toolAdd", json!({}));
    let tool_id = last_tool_id(&view);
    let _ = request_ok(
        stdin,
        reader,
        "cfg-max",
        "config.toolUpdate",
        json!({ "toolId": tool_id, "field": "maxMarks", "value": 30 }),
    );
    for co in ["CO1", "CO2"] {
        let _ = request_ok(
            stdin,
            reader,
            &format!("cfg-{}", co),
            "config.toolSetCoMark",
            json!({ "toolId": tool_id, "coId": co, "marks": 15 }),
        );
    }
    let _ = request_ok(stdin, reader, "cfg-save", "config.save", json!({}));
    tool_id
}
