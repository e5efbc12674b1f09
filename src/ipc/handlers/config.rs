use crate::assessment::ToolEdit;
use crate::db::{self, ConfigSave};
use crate::draft::{CoField, ConfigDraft};
use crate::entry::parse_int_lenient;
use crate::error::ObeError;
use crate::ipc::helpers::{db_conn, db_err, optional_u32, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{CourseType, KLevel, SubType, ToolType};
use serde_json::json;

fn draft_view(d: &ConfigDraft) -> serde_json::Value {
    json!({
        "courseId": d.course_id,
        "courseCode": d.course_code,
        "revision": d.revision,
        "cos": d.cos,
        "settings": d.settings,
        "tools": d.tool_views(),
        "warnings": d.warnings(),
    })
}

fn draft_ref(state: &AppState) -> Result<&ConfigDraft, HandlerErr> {
    state
        .draft
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_draft", "open a course configuration first"))
}

/// Apply one edit to the open draft and return the refreshed view.
fn edit_draft(
    state: &mut AppState,
    f: impl FnOnce(&mut ConfigDraft) -> Result<(), ObeError>,
) -> Result<serde_json::Value, HandlerErr> {
    let draft = state
        .draft
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_draft", "open a course configuration first"))?;
    f(draft)?;
    Ok(draft_view(draft))
}

fn value_str(req: &Request) -> Result<String, HandlerErr> {
    match req.params.get("value") {
        None | Some(serde_json::Value::Null) => Ok(String::new()),
        Some(serde_json::Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

/// Numeric form fields arrive as numbers or as the raw text of an input box.
fn lenient_int(v: Option<&serde_json::Value>) -> Option<i64> {
    match v? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        serde_json::Value::String(s) => parse_int_lenient(s),
        _ => None,
    }
}

fn non_negative_u32(req: &Request, key: &str) -> Result<u32, HandlerErr> {
    lenient_int(req.params.get(key))
        .filter(|n| *n >= 0)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| HandlerErr::bad_params(format!("{key} must be a non-negative integer")))
}

fn handle_open(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = db_conn(state)?;
    let course_id = required_str(req, "courseId")?;
    let course = db::get_course(conn, &course_id, state.config.default_settings())
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| HandlerErr::new("not_found", format!("course not found: {course_id}")))?;

    if let Some(prev) = state.draft.as_ref().filter(|d| d.course_id != course.id) {
        tracing::debug!(course = %prev.course_code, "discarding configuration draft");
    }
    let draft = ConfigDraft::open(&course);
    tracing::info!(course = %draft.course_code, revision = draft.revision, "configuration draft opened");
    let view = draft_view(&draft);
    state.draft = Some(draft);
    Ok(view)
}

fn handle_get(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(draft_view(draft_ref(state)?))
}

fn handle_co_add(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    edit_draft(state, |d| {
        d.add_co();
        Ok(())
    })
}

fn handle_co_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let co_id = required_str(req, "coId")?;
    let field = required_str(req, "field")?;
    let value = value_str(req)?;
    let field = match field.as_str() {
        "id" => CoField::Id(value),
        "description" => CoField::Description(value),
        "modules" => CoField::Modules(value),
        "kLevel" => CoField::KLevel(
            serde_json::from_value::<KLevel>(serde_json::Value::String(value.clone()))
                .map_err(|_| HandlerErr::bad_params(format!("unknown K-level: {value}")))?,
        ),
        other => return Err(HandlerErr::bad_params(format!("unknown CO field: {other}"))),
    };
    edit_draft(state, |d| d.update_co(&co_id, field))
}

fn handle_co_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let co_id = required_str(req, "coId")?;
    edit_draft(state, |d| d.remove_co(&co_id))
}

fn handle_settings_update(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let threshold = optional_u32(req, "targetThreshold")?;
    let course_type = match req.params.get("courseType").and_then(|v| v.as_str()) {
        Some(s) => Some(
            CourseType::parse(s)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown course type: {s}")))?,
        ),
        None => None,
    };
    edit_draft(state, |d| d.update_settings(threshold, course_type))
}

fn handle_tool_add(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    edit_draft(state, |d| {
        d.add_tool();
        Ok(())
    })
}

fn handle_tool_remove(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let tool_id = required_str(req, "toolId")?;
    edit_draft(state, |d| d.remove_tool(&tool_id).map(|_| ()))
}

fn handle_tool_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let tool_id = required_str(req, "toolId")?;
    let field = required_str(req, "field")?;
    let edit = match field.as_str() {
        "type" => {
            let v = value_str(req)?;
            ToolEdit::Type(
                ToolType::parse(&v)
                    .ok_or_else(|| HandlerErr::bad_params(format!("unknown tool type: {v}")))?,
            )
        }
        "subType" => {
            let v = value_str(req)?;
            if v.is_empty() {
                ToolEdit::SubType(None)
            } else {
                ToolEdit::SubType(Some(SubType::parse(&v).ok_or_else(|| {
                    HandlerErr::bad_params(format!("unknown subType: {v}"))
                })?))
            }
        }
        "customName" => ToolEdit::CustomName(value_str(req)?),
        "linkedAssessment" => ToolEdit::LinkedAssessment(value_str(req)?),
        "maxMarks" => ToolEdit::MaxMarks(non_negative_u32(req, "value")?),
        "weightage" => ToolEdit::Weightage(non_negative_u32(req, "value")?),
        other => return Err(HandlerErr::bad_params(format!("unknown tool field: {other}"))),
    };
    edit_draft(state, |d| d.edit_tool(&tool_id, edit))
}

fn handle_tool_set_co_mark(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let tool_id = required_str(req, "toolId")?;
    let co_id = required_str(req, "coId")?;
    // Anything that is not a positive number clears the allotment.
    let marks = lenient_int(req.params.get("marks"))
        .map(|n| n.clamp(0, i64::from(u32::MAX)) as u32)
        .unwrap_or(0);
    edit_draft(state, |d| d.set_co_mark(&tool_id, &co_id, marks))
}

fn handle_improvement_targets(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let tool_id = required_str(req, "toolId")?;
    let draft = draft_ref(state)?;
    if draft.tool(&tool_id).is_none() {
        return Err(ObeError::not_found("assessment tool", tool_id).into());
    }
    let targets: Vec<&str> = draft
        .improvement_targets(&tool_id)
        .into_iter()
        .map(|t| t.name.as_str())
        .collect();
    Ok(json!({ "toolId": tool_id, "targets": targets }))
}

fn handle_validate(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let draft = draft_ref(state)?;
    let errors = match draft.validate() {
        Ok(()) => Vec::new(),
        Err(ObeError::Validation(errors)) => errors,
        Err(other) => return Err(other.into()),
    };
    Ok(json!({
        "valid": errors.is_empty(),
        "errors": errors,
        "warnings": draft.warnings(),
    }))
}

fn handle_save(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let force = req
        .params
        .get("force")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let conn = db_conn(state)?;
    let draft = draft_ref(state)?;
    draft.validate()?;

    let expected = if force { None } else { Some(draft.revision) };
    let outcome = db::save_course_config(
        conn,
        &draft.course_id,
        expected,
        &draft.cos,
        &draft.settings,
        &draft.tools,
    )
    .map_err(db_err("db_insert_failed"))?;

    let revision = match outcome {
        ConfigSave::Saved { revision } => revision,
        ConfigSave::Stale { current } => {
            return Err(HandlerErr::new(
                "stale_draft",
                format!(
                    "Configuration for {} was changed elsewhere. Reopen it or save with force.",
                    draft.course_code
                ),
            )
            .with_details(json!({ "draftRevision": draft.revision, "storedRevision": current })))
        }
        ConfigSave::Missing => {
            return Err(HandlerErr::new(
                "not_found",
                format!("course not found: {}", draft.course_id),
            ))
        }
    };
    let code = draft.course_code.clone();
    tracing::info!(course = %code, revision, force, "configuration saved");

    let Some(draft) = state.draft.as_mut() else {
        return Err(HandlerErr::new("no_draft", "open a course configuration first"));
    };
    draft.revision = revision;
    Ok(json!({
        "revision": revision,
        "message": format!("Configuration for {code} saved successfully!"),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "config.open" => handle_open(state, req),
        "config.get" => handle_get(state, req),
        "config.coAdd" => handle_co_add(state, req),
        "config.coUpdate" => handle_co_update(state, req),
        "config.coRemove" => handle_co_remove(state, req),
        "config.settingsUpdate" => handle_settings_update(state, req),
        "config.toolAdd" => handle_tool_add(state, req),
        "config.toolRemove" => handle_tool_remove(state, req),
        "config.toolUpdate" => handle_tool_update(state, req),
        "config.toolSetCoMark" => handle_tool_set_co_mark(state, req),
        "config.improvementTargets" => handle_improvement_targets(state, req),
        "config.validate" => handle_validate(state, req),
        "config.save" => handle_save(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
