use crate::error::ObeError;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ObeError> for HandlerErr {
    fn from(e: ObeError) -> Self {
        let code = e.code();
        match e {
            ObeError::Validation(errors) => HandlerErr::new(
                code,
                format!(
                    "Configuration Error:\n\n{}\n\nPlease correct the configuration.",
                    errors.join("\n")
                ),
            )
            .with_details(json!({ "errors": errors })),
            other => HandlerErr::new(code, other.to_string()),
        }
    }
}

/// Store failures keep the sidecar's `db_*` codes.
pub fn db_err(code: &'static str) -> impl Fn(anyhow::Error) -> HandlerErr {
    move |e| HandlerErr::new(code, format!("{e:#}"))
}

/// Turn a handler result into the response envelope, logging failures.
pub fn respond(req: &Request, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => {
            tracing::warn!(method = %req.method, code = e.code, "{}", e.message);
            e.response(&req.id)
        }
    }
}

pub fn db_conn(state: &AppState) -> Result<&Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Absent, null and empty strings all read as `None`.
pub fn optional_str(req: &Request, key: &str) -> Result<Option<String>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(HandlerErr::bad_params(format!("{} must be a string", key))
            .with_details(json!({ "field": key, "value": other }))),
    }
}

pub fn optional_u32(req: &Request, key: &str) -> Result<Option<u32>, HandlerErr> {
    match req.params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("{} must be a non-negative integer", key))
                    .with_details(json!({ "field": key, "value": v }))
            }),
    }
}

pub fn string_list(req: &Request, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(raw) = req.params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    let mut out = Vec::with_capacity(raw.len());
    for v in raw {
        let Some(s) = v.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "{} must contain only strings",
                key
            )));
        };
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|o: &String| o == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}
