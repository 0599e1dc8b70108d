//! Standard agent/tool result shape and legacy-map normalization (C5).
//!
//! Agent and tool handlers speak a range of ad hoc shapes (bare values,
//! `{status, result, error, message}` maps inherited from older callers).
//! `normalize` coerces any of those into this canonical form so the rest of
//! the kernel only ever has to reason about one shape.

use crate::types::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Top-level status of a standard result. Distinct from `OutcomeTag`, which
/// additionally captures routing intent (partial, clarify, replan, …); this
/// is the narrower success/error split legacy callers speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Error,
}

/// Structured error detail, built either from a nested legacy error map or
/// synthesized from a scalar/exception-like value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, Value>,
}

/// The standard agent/tool result: `status=error ⇒ error present`,
/// `status=success ⇒ error absent` (enforced by `validate`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResultErrorDetail>,
}

impl AgentResult {
    pub fn success(data: Option<Value>) -> Self {
        Self {
            status: ResultStatus::Success,
            data,
            message: None,
            error: None,
        }
    }

    pub fn error(detail: ResultErrorDetail) -> Self {
        Self {
            status: ResultStatus::Error,
            data: None,
            message: None,
            error: Some(detail),
        }
    }

    /// `status=error ⇒ error field present`; `status=success ⇒ error field
    /// absent`. Violations are programming errors, signaled explicitly
    /// rather than silently tolerated.
    pub fn validate(&self) -> Result<()> {
        match (self.status, &self.error) {
            (ResultStatus::Error, None) => {
                Err(Error::result_validation("status=error requires an error field"))
            }
            (ResultStatus::Success, Some(_)) => {
                Err(Error::result_validation("status=success must not carry an error field"))
            }
            _ => Ok(()),
        }
    }
}

fn status_string(v: &Value) -> Option<&str> {
    v.get("status").and_then(Value::as_str)
}

fn is_nonempty_error_field(v: &Value) -> bool {
    match v.get("error") {
        None => false,
        Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Object(m)) => !m.is_empty(),
        Some(_) => true,
    }
}

fn error_detail_from(error_value: &Value) -> ResultErrorDetail {
    match error_value {
        Value::Object(map) => {
            let error_type = map
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("error")
                .to_string();
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let code = map.get("code").and_then(Value::as_str).map(str::to_string);
            ResultErrorDetail {
                error_type,
                message,
                code,
                details: serde_json::Map::new(),
            }
        }
        Value::String(s) => ResultErrorDetail {
            error_type: "error".to_string(),
            message: s.clone(),
            code: None,
            details: serde_json::Map::new(),
        },
        other => {
            // Exception-like value (e.g. {"type": "...", ...} already
            // handled above): capture whatever shape it has as a traceback.
            let mut details = serde_json::Map::new();
            details.insert("traceback".to_string(), other.clone());
            ResultErrorDetail {
                error_type: "error".to_string(),
                message: other.to_string(),
                code: None,
                details,
            }
        }
    }
}

/// Coerce a raw agent/tool result into the standard shape.
///
/// Rules (spec §4.5):
/// - Already-standard results pass through unchanged.
/// - Non-map, non-result values fail with a type error.
/// - An `error` field present and non-empty, or `status ∈ {error, failed}`,
///   classifies as error.
/// - Otherwise `status ∈ {success, completed}`, or no explicit status and no
///   error signal, classifies as success.
pub fn normalize(value: Value) -> Result<AgentResult> {
    if let Ok(already) = serde_json::from_value::<AgentResult>(value.clone()) {
        if already.validate().is_ok() {
            return Ok(already);
        }
        // Structurally shaped like a standard result but violates the
        // status/error invariant (e.g. `{"status": "error"}` with no error
        // field) — fall through and synthesize one via the legacy rules.
    }

    let Value::Object(map) = &value else {
        return Err(Error::result_validation(format!(
            "agent result must be a map or standard result, got {value}"
        )));
    };

    let status = status_string(&value);
    let has_error = is_nonempty_error_field(&value);

    let is_error = has_error || matches!(status, Some("error") | Some("failed"));

    if is_error {
        let detail = match map.get("error") {
            Some(err) if is_nonempty_error_field(&value) => error_detail_from(err),
            _ => ResultErrorDetail {
                error_type: "error".to_string(),
                message: map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("agent reported failure")
                    .to_string(),
                code: None,
                details: serde_json::Map::new(),
            },
        };
        let result = AgentResult::error(detail);
        result.validate()?;
        return Ok(result);
    }

    // status ∈ {success, completed}, or absent with no error signal.
    let data = map.get("result").or_else(|| map.get("data")).cloned();
    let message = map.get("message").and_then(Value::as_str).map(str::to_string);
    let result = AgentResult {
        status: ResultStatus::Success,
        data,
        message,
        error: None,
    };
    result.validate()?;
    Ok(result)
}
