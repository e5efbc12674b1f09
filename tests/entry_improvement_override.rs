mod test_support;

use serde_json::json;
use test_support::{
    configure_ia1, last_tool_id, request_err, request_ok, seed_course, spawn_sidecar, temp_dir,
};

const IMPROVEMENT: &str = "Improvement Test (Internal Assessment 1)";

#[test]
fn improvement_scores_replace_originals_only_after_comparison() {
    let workspace = temp_dir("obed-entry-improvement");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_course(&mut stdin, &mut reader, &workspace);
    let _ = configure_ia1(&mut stdin, &mut reader, &fx.course_id);
    let (s1, _) = fx.students[0].clone();
    let (s2, _) = fx.students[1].clone();

    // Add the improvement test to the still-open draft.
    let view = request_ok(&mut stdin, &mut reader, "1", "config.toolAdd", json!({}));
    let imp = last_tool_id(&view);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "config.toolUpdate",
        json!({ "toolId": imp, "field": "type", "value": "Improvement Test" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "config.toolUpdate",
        json!({ "toolId": imp, "field": "linkedAssessment", "value": "Internal Assessment 1" }),
    );
    let _ = request_ok(&mut stdin, &mut reader, "4", "config.save", json!({}));

    // Original marks for two students.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "entry.open",
        json!({ "courseId": fx.course_id, "assessment": "Internal Assessment 1" }),
    );
    for (i, (sid, q, v)) in [(&s1, "CO1", 5), (&s1, "CO2", 5), (&s2, "CO1", 10)]
        .into_iter()
        .enumerate()
    {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("6-{}", i),
            "entry.setScore",
            json!({ "studentId": sid, "q": q, "value": v }),
        );
    }
    let _ = request_ok(&mut stdin, &mut reader, "7", "entry.save", json!({}));

    // Improvement test rows are opt-in.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "entry.open",
        json!({ "courseId": fx.course_id, "assessment": IMPROVEMENT }),
    );
    assert_eq!(opened["isImprovement"], json!(true));
    assert_eq!(opened["rows"], json!([]));
    assert_eq!(opened["roster"].as_array().map(|a| a.len()), Some(3));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "9",
        "entry.setScore",
        json!({ "studentId": s1, "q": "CO1", "value": 12 }),
    );
    assert_eq!(error["code"], json!("not_mapped"));

    let mapped = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "entry.mapStudents",
        json!({ "studentIds": [s1, s2] }),
    );
    assert_eq!(mapped["rows"].as_array().map(|a| a.len()), Some(2));
    for (i, (q, v)) in [("CO1", 12), ("CO2", 13)].into_iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("11-{}", i),
            "entry.setScore",
            json!({ "studentId": s1, "q": q, "value": v }),
        );
    }
    // Deselecting drops the row before anything was stored for it.
    let mapped = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "entry.mapStudents",
        json!({ "studentIds": [s1] }),
    );
    assert_eq!(mapped["rows"].as_array().map(|a| a.len()), Some(1));

    let saved = request_ok(&mut stdin, &mut reader, "13", "entry.save", json!({}));
    assert_eq!(saved["created"], json!(1));
    let marks = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "marks.list",
        json!({ "courseId": fx.course_id, "assessment": IMPROVEMENT }),
    );
    let marks = marks["marks"].as_array().expect("marks");
    assert_eq!(marks.len(), 1);
    assert_eq!(marks[0]["improvementTarget"], json!("Internal Assessment 1"));
    assert_eq!(marks[0]["scores"], json!({ "CO1": 12, "CO2": 13 }));

    // Back on the original assessment.
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "entry.open",
        json!({ "courseId": fx.course_id, "assessment": "Internal Assessment 1" }),
    );
    assert_eq!(opened["improvementAssessment"], json!(IMPROVEMENT));

    let error = request_err(
        &mut stdin,
        &mut reader,
        "16",
        "entry.override",
        json!({ "studentId": s1 }),
    );
    assert_eq!(error["code"], json!("compare_first"));
    let error = request_err(
        &mut stdin,
        &mut reader,
        "17",
        "entry.compare",
        json!({ "studentId": s2 }),
    );
    assert_eq!(error["code"], json!("no_improvement"));

    let cmp = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "entry.compare",
        json!({ "studentId": s1 }),
    );
    assert_eq!(cmp["originalTotal"], json!(10));
    assert_eq!(cmp["improvementTotal"], json!(25));
    assert_eq!(cmp["improvementBetter"], json!(true));

    let overridden = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "entry.override",
        json!({ "studentId": s1 }),
    );
    assert_eq!(overridden["scores"], json!({ "CO1": 12, "CO2": 13 }));
    assert_eq!(overridden["total"], json!(25));

    let saved = request_ok(&mut stdin, &mut reader, "20", "entry.save", json!({}));
    assert_eq!(saved["updated"], json!(1));
    let marks = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "marks.list",
        json!({ "courseId": fx.course_id, "assessment": "Internal Assessment 1", "studentId": s1 }),
    );
    assert_eq!(marks["marks"][0]["scores"], json!({ "CO1": 12, "CO2": 13 }));

    // Unmapping a stored student deletes the improvement record.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "entry.open",
        json!({ "courseId": fx.course_id, "assessment": IMPROVEMENT }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "23",
        "entry.mapStudents",
        json!({ "studentIds": [] }),
    );
    let saved = request_ok(&mut stdin, &mut reader, "24", "entry.save", json!({}));
    assert_eq!(saved["deleted"], json!(1));
}
