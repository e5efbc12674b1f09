use serde::Serialize;

#[derive(Debug, Serialize)]
struct OkResp {
    id: String,
    ok: bool,
    result: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ErrObj {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrResp {
    id: String,
    ok: bool,
    error: ErrObj,
}

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    serde_json::json!(OkResp {
        id: id.to_string(),
        ok: true,
        result,
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    serde_json::json!(ErrResp {
        id: id.to_string(),
        ok: false,
        error: ErrObj {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    })
}
