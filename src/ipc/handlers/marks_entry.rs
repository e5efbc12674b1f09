use crate::csv_io;
use crate::db::{self, MarksFilter};
use crate::entry::{EntrySession, SaveOp, ScoreInput};
use crate::ipc::helpers::{db_conn, db_err, required_str, respond, string_list, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::CourseSettings;
use rusqlite::Connection;
use serde_json::json;
use std::path::PathBuf;

fn session_view(s: &EntrySession) -> serde_json::Value {
    json!({
        "courseId": s.course_id,
        "courseCode": s.course_code,
        "assessment": s.tool.name,
        "tool": s.tool,
        "schema": s.schema,
        "isImprovement": s.is_improvement(),
        "improvementAssessment": s.improvement_tool,
        "roster": s.roster(),
        "rows": s.rows_view(),
    })
}

fn session_parts(state: &mut AppState) -> Result<(&Connection, &mut EntrySession), HandlerErr> {
    let AppState { db, entry, .. } = state;
    let conn = db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))?;
    let session = entry
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_session", "open a marks entry session first"))?;
    Ok((conn, session))
}

fn session_mut(state: &mut AppState) -> Result<&mut EntrySession, HandlerErr> {
    state
        .entry
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_session", "open a marks entry session first"))
}

/// Build a session from the stored course, roster and marks.
fn load_session(
    conn: &Connection,
    course_id: &str,
    assessment: &str,
    defaults: CourseSettings,
) -> Result<EntrySession, HandlerErr> {
    let course = db::get_course(conn, course_id, defaults)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", format!("course not found: {course_id}")))?;
    let mut session = EntrySession::open(&course, assessment)?;

    let roster = db::list_students(conn, Some(course_id)).map_err(db_err("db_query_failed"))?;
    let records = db::list_marks(
        conn,
        &MarksFilter {
            course_id: Some(course_id),
            assessment: Some(assessment),
            student_id: None,
        },
    )
    .map_err(db_err("db_query_failed"))?;
    let improvement_records = match session.improvement_tool.as_deref() {
        Some(imp) => db::list_marks(
            conn,
            &MarksFilter {
                course_id: Some(course_id),
                assessment: Some(imp),
                student_id: None,
            },
        )
        .map_err(db_err("db_query_failed"))?,
        None => Vec::new(),
    };

    tracing::info!(
        course = %course.code,
        assessment,
        students = roster.len(),
        records = records.len(),
        "marks entry loaded"
    );
    session.load(roster, records, improvement_records);
    Ok(session)
}

fn handle_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let assessment = required_str(req, "assessment")?;
    let session = load_session(conn, &course_id, &assessment, state.config.default_settings())?;
    let view = session_view(&session);
    state.entry = Some(session);
    Ok(view)
}

fn handle_load(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let defaults = state.config.default_settings();
    let (conn, session) = session_parts(state)?;
    let fresh = load_session(conn, &session.course_id, &session.tool.name, defaults)?;
    *session = fresh;
    Ok(session_view(session))
}

fn score_input(v: Option<&serde_json::Value>) -> Result<ScoreInput, HandlerErr> {
    match v {
        None | Some(serde_json::Value::Null) => Ok(ScoreInput::Empty),
        Some(serde_json::Value::String(s)) if s.is_empty() => Ok(ScoreInput::Empty),
        Some(serde_json::Value::String(s)) => Ok(ScoreInput::Text(s.clone())),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(ScoreInput::Number)
            .ok_or_else(|| HandlerErr::bad_params("value is not a number")),
        Some(other) => Err(HandlerErr::bad_params(format!(
            "value must be a number or a string, got {other}"
        ))),
    }
}

fn handle_set_score(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let key = required_str(req, "q")?;
    let input = score_input(req.params.get("value"))?;
    let session = session_mut(state)?;
    let stored = session.set_score(&student_id, &key, input)?;
    Ok(json!({
        "studentId": student_id,
        "q": key,
        "value": stored,
        "total": session.total(&student_id),
    }))
}

fn handle_toggle_edit(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let locked = session_mut(state)?.toggle_edit(&student_id)?;
    Ok(json!({ "studentId": student_id, "locked": locked }))
}

fn handle_map_students(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let selected = string_list(req, "studentIds")?;
    let session = session_mut(state)?;
    session.map_students(&selected)?;
    Ok(session_view(session))
}

fn handle_compare(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let cmp = session_mut(state)?.compare(&student_id)?;
    Ok(json!(cmp))
}

fn handle_override(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(req, "studentId")?;
    let session = session_mut(state)?;
    session.override_with_improvement(&student_id)?;
    Ok(json!({
        "studentId": student_id,
        "scores": session.row(&student_id),
        "total": session.total(&student_id),
    }))
}

fn apply_op(conn: &Connection, op: &SaveOp) -> anyhow::Result<bool> {
    match op {
        SaveOp::Create(rec) => db::insert_mark(conn, rec).map(|_| true),
        SaveOp::Patch {
            mark_id, scores, ..
        } => db::update_mark_scores(conn, mark_id, scores),
        SaveOp::Delete { mark_id, .. } => db::delete_mark(conn, mark_id),
    }
}

fn handle_save(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let defaults = state.config.default_settings();
    let (conn, session) = session_parts(state)?;

    let (mut created, mut updated, mut deleted) = (0, 0, 0);
    let mut failed = Vec::new();
    // Each student is written on its own; one failure leaves the others saved.
    for op in session.save_plan() {
        match apply_op(conn, &op) {
            Ok(true) => match op {
                SaveOp::Create(_) => created += 1,
                SaveOp::Patch { .. } => updated += 1,
                SaveOp::Delete { .. } => deleted += 1,
            },
            Ok(false) => failed.push(json!({
                "studentId": op.student_id(),
                "message": "mark record no longer exists",
            })),
            Err(e) => {
                tracing::warn!(student = op.student_id(), "mark save failed: {e:#}");
                failed.push(json!({
                    "studentId": op.student_id(),
                    "message": format!("{e:#}"),
                }));
            }
        }
    }
    tracing::info!(
        course = %session.course_code,
        assessment = %session.tool.name,
        created,
        updated,
        deleted,
        failed = failed.len(),
        "marks saved"
    );

    let fresh = load_session(conn, &session.course_id, &session.tool.name, defaults)?;
    *session = fresh;
    Ok(json!({
        "created": created,
        "updated": updated,
        "deleted": deleted,
        "failed": failed,
        "session": session_view(session),
    }))
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let out_path = req
        .params
        .get("outPath")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from);
    let session = session_mut(state)?;
    let template = csv_io::export_template(session)?;

    if let Some(path) = out_path.as_ref() {
        std::fs::write(path, &template.content).map_err(|e| {
            HandlerErr::new("io_failed", format!("write {}: {e}", path.display()))
        })?;
        tracing::info!(path = %path.display(), "marks template written");
    }
    Ok(json!({
        "fileName": template.file_name,
        "content": template.content,
        "path": out_path.map(|p| p.to_string_lossy().to_string()),
    }))
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let text = match req.params.get("text").and_then(|v| v.as_str()) {
        Some(t) => t.to_string(),
        None => {
            let path = PathBuf::from(required_str(req, "path")?);
            std::fs::read_to_string(&path).map_err(|e| {
                HandlerErr::new("io_failed", format!("read {}: {e}", path.display()))
            })?
        }
    };
    let session = session_mut(state)?;
    let summary = csv_io::import_marks(session, &text);
    tracing::info!(
        assessment = %session.tool.name,
        updated = summary.updated,
        skipped_rows = summary.skipped_rows,
        "marks template imported"
    );
    Ok(json!({
        "updated": summary.updated,
        "skippedRows": summary.skipped_rows,
        "message": format!("Successfully updated marks for {} entries.", summary.updated),
        "rows": session.rows_view(),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "entry.open" => handle_open(state, req),
        "entry.load" => handle_load(state, req),
        "entry.setScore" => handle_set_score(state, req),
        "entry.toggleEdit" => handle_toggle_edit(state, req),
        "entry.mapStudents" => handle_map_students(state, req),
        "entry.compare" => handle_compare(state, req),
        "entry.override" => handle_override(state, req),
        "entry.save" => handle_save(state, req),
        "entry.exportCsv" => handle_export_csv(state, req),
        "entry.importCsv" => handle_import_csv(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
