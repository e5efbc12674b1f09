mod test_support;

use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, str_at, temp_dir};
use std::io::{BufRead, Write};

#[test]
fn obed_toml_sets_course_defaults_and_report_bands() {
    let workspace = temp_dir("obed-workspace-config");
    std::fs::write(
        workspace.join("obed.toml"),
        "[course]\ntarget_threshold = 75\ncourse_type = \"Lab\"\n\n[reports]\ndistinction_percent = 80\n",
    )
    .expect("write obed.toml");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.create",
        json!({ "code": "PH110", "name": "Physics Lab", "semester": 1 }),
    );
    assert_eq!(
        course["course"]["settings"],
        json!({ "targetThreshold": 75, "courseType": "Lab" })
    );
    let report = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "reports.course",
        json!({ "courseId": str_at(&course, "/course/id") }),
    );
    assert_eq!(
        report["report"]["distribution"][0]["name"],
        json!("Distinction (≥80%)")
    );
}

#[test]
fn broken_obed_toml_keeps_the_previous_workspace() {
    let good = temp_dir("obed-workspace-good");
    let bad = temp_dir("obed-workspace-bad");
    std::fs::write(bad.join("obed.toml"), "[course]\ntarget_threshold = 140\n").expect("write");
    let typo = temp_dir("obed-workspace-typo");
    std::fs::write(typo.join("obed.toml"), "[reports]\npass = 40\n").expect("write");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": good.to_string_lossy() }),
    );
    for (i, dir) in [&bad, &typo].into_iter().enumerate() {
        let error = request_err(
            &mut stdin,
            &mut reader,
            &format!("2-{}", i),
            "workspace.select",
            json!({ "path": dir.to_string_lossy() }),
        );
        assert_eq!(error["code"], json!("config_invalid"));
    }
    assert!(!bad.join("obed.sqlite3").exists());

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(
        health["workspacePath"],
        json!(good.to_string_lossy().to_string())
    );
}

#[test]
fn protocol_errors_do_not_stop_the_sidecar() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "this is not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json reply");
    assert_eq!(value["ok"], json!(false));
    assert_eq!(value["error"]["code"], json!("bad_json"));

    let unknown = request(&mut stdin, &mut reader, "1", "grades.explode", json!({}));
    assert_eq!(unknown["error"]["code"], json!("not_implemented"));

    let error = request_err(&mut stdin, &mut reader, "2", "workspace.select", json!({}));
    assert_eq!(error["code"], json!("bad_params"));

    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert_eq!(health["version"], json!(env!("CARGO_PKG_VERSION")));
    assert_eq!(health["workspacePath"], json!(null));
}
