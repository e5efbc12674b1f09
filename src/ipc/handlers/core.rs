use crate::config::ObeConfig;
use crate::db;
use crate::ipc::helpers::{required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;

fn handle_health(state: &mut AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
        "draftCourseId": state.draft.as_ref().map(|d| d.course_id.clone()),
        "entryAssessment": state.entry.as_ref().map(|e| e.tool.name.clone()),
    }))
}

fn handle_workspace_select(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(required_str(req, "path")?);

    // A broken obed.toml keeps the previous workspace open.
    let config = ObeConfig::load(&path)
        .map_err(|e| HandlerErr::new("config_invalid", format!("{e:#}")))?;
    let conn =
        db::open_db(&path).map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;

    tracing::info!(workspace = %path.display(), "workspace opened");
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    state.config = config;
    state.draft = None;
    state.entry = None;
    Ok(json!({ "workspacePath": path.to_string_lossy() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "health" => handle_health(state, req),
        "workspace.select" => handle_workspace_select(state, req),
        _ => return None,
    };
    Some(respond(req, result))
}
