//! Helpers for reading remote API responses.
//!
//! Both remote services return JSON whose useful fields are sometimes
//! wrapped in a `data` object and sometimes sit at the top level. All field
//! access goes through [`payload`], which resolves the wrapper first and the
//! flat body second.

use reqwest::{Response, StatusCode};
use serde_json::Value;

/// Resolve the object that carries a response's fields.
///
/// Fallback order:
/// 1. `body.data` when it is a JSON object (wrapped shape)
/// 2. `body` itself (flat shape)
pub fn payload(body: &Value) -> &Value {
    match body.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        _ => body,
    }
}

/// Non-empty string field from the resolved payload.
pub fn string_field<'a>(body: &'a Value, name: &str) -> Option<&'a str> {
    payload(body)
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Non-empty string at a JSON pointer inside the resolved payload.
pub fn string_at<'a>(body: &'a Value, pointer: &str) -> Option<&'a str> {
    payload(body)
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Read a response into its status and body.
///
/// Bodies that are not JSON are kept as a JSON string so they can still be
/// reported in error details.
pub async fn read_json(response: Response) -> Result<(StatusCode, Value), reqwest::Error> {
    let status = response.status();
    let text = response.text().await?;
    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    };
    Ok((status, body))
}

/// Short description of a failed response for error details.
pub fn describe_failure(status: StatusCode, body: &Value) -> String {
    let detail = string_field(body, "message")
        .or_else(|| string_field(body, "errorMessage"))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    format!("HTTP {}: {}", status.as_u16(), detail)
}
