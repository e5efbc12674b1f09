mod test_support;

use serde_json::json;
use test_support::{
    configure_ia1, last_tool_id, request_err, request_ok, seed_course, spawn_sidecar, temp_dir,
};

#[test]
fn linking_copies_marks_once_without_a_live_binding() {
    let workspace = temp_dir("obed-improvement-link");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_course(&mut stdin, &mut reader, &workspace);
    let ia1 = configure_ia1(&mut stdin, &mut reader, &fx.course_id);

    let view = request_ok(&mut stdin, &mut reader, "1", "config.toolAdd", json!({}));
    let imp = last_tool_id(&view);
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "config.toolUpdate",
        json!({ "toolId": imp, "field": "type", "value": "Improvement Test" }),
    );
    assert_eq!(view["tools"][1]["name"], json!("Improvement Test"));

    let targets = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "config.improvementTargets",
        json!({ "toolId": imp }),
    );
    assert_eq!(targets["targets"], json!(["Internal Assessment 1"]));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "config.toolUpdate",
        json!({ "toolId": imp, "field": "linkedAssessment", "value": "Assignment 1" }),
    );
    assert_eq!(error["code"], json!("bad_target"));
    let error = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "config.toolUpdate",
        json!({ "toolId": ia1, "field": "linkedAssessment", "value": "Internal Assessment 1" }),
    );
    assert_eq!(error["code"], json!("bad_params"));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "config.toolUpdate",
        json!({ "toolId": imp, "field": "linkedAssessment", "value": "Internal Assessment 1" }),
    );
    let linked = &view["tools"][1];
    assert_eq!(linked["name"], json!("Improvement Test (Internal Assessment 1)"));
    assert_eq!(linked["maxMarks"], json!(30));
    assert_eq!(linked["coDistribution"], json!({ "CO1": 15, "CO2": 15 }));

    // Editing the source afterwards leaves the copy alone.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "config.toolSetCoMark",
        json!({ "toolId": ia1, "coId": "CO1", "marks": 20 }),
    );
    assert_eq!(view["tools"][0]["coDistribution"], json!({ "CO1": 20, "CO2": 15 }));
    assert_eq!(view["tools"][1]["coDistribution"], json!({ "CO1": 15, "CO2": 15 }));

    // Clearing the link keeps the copied values.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "config.toolUpdate",
        json!({ "toolId": imp, "field": "linkedAssessment", "value": "" }),
    );
    assert_eq!(view["tools"][1]["name"], json!("Improvement Test"));
    assert_eq!(view["tools"][1]["maxMarks"], json!(30));

    let error = request_err(&mut stdin, &mut reader, "9", "config.save", json!({}));
    let errors = error["details"]["errors"].as_array().expect("errors");
    assert!(errors.contains(&json!("Internal Assessment 1: Allocated 35 marks, but Max Marks is 30")));
    assert!(errors.contains(&json!(
        "An assessment tool is incomplete. Please check Activity Names or Improvement Targets."
    )));
}
