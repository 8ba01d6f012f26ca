// ABOUTME: Trace assembly helpers - tool steps and redaction of sensitive values.
// ABOUTME: Values under credential-like keys never reach a trace.

use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::provider::{TraceKind, TraceStep};
use crate::tool::{ToolCall, ToolResult};

const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
];

pub const REDACTED: &str = "[REDACTED]";

fn is_sensitive(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
}

/// Copy of `value` with every sensitive key's value replaced, at any depth.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact(v)
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Trace step for one tool call, executed or reused.
pub(crate) fn tool_step(call: &ToolCall, result: &ToolResult, reused: bool) -> TraceStep {
    let started_at = result.started_at.unwrap_or_else(Utc::now);
    let call_value = serde_json::to_value(call).unwrap_or(Value::Null);

    TraceStep {
        id: Uuid::new_v4().to_string(),
        kind: TraceKind::Tool,
        name: call.name.clone(),
        started_at,
        ended_at: result.ended_at.filter(|ended| *ended >= started_at),
        duration_ms: result.duration_ms,
        input: Some(json!({ "toolCall": redact(&call_value), "reused": reused })),
        output: result.result.as_ref().map(redact),
        error: result.error.clone().map(|mut error| {
            error.details = error.details.as_ref().map(redact);
            error
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::tool::{ToolErrorCode, ToolResultError};

    #[test]
    fn test_redacts_nested_sensitive_keys() {
        let value = json!({
            "user": "ada",
            "Password": "hunter2",
            "nested": { "api_key": "k", "list": [{ "token": "t", "keep": 1 }] }
        });
        let redacted = redact(&value);

        assert_eq!(redacted["user"], "ada");
        assert_eq!(redacted["Password"], REDACTED);
        assert_eq!(redacted["nested"]["api_key"], REDACTED);
        assert_eq!(redacted["nested"]["list"][0]["token"], REDACTED);
        assert_eq!(redacted["nested"]["list"][0]["keep"], 1);
    }

    #[test]
    fn test_scalars_are_untouched() {
        assert_eq!(redact(&json!("secret")), json!("secret"));
        assert_eq!(redact(&json!(3)), json!(3));
    }

    #[test]
    fn test_tool_step_marks_reuse_and_carries_error() {
        let mut args = Map::new();
        args.insert("secret".into(), json!("s3cr3t"));
        let call = ToolCall::new("c-1", "vault", args);
        let result = ToolResult::failure(
            &call,
            ToolResultError::new(ToolErrorCode::NotFound, "Tool not found: vault")
                .with_details(json!({"token": "t-1"})),
        );

        let step = tool_step(&call, &result, true);
        let input = step.input.unwrap();

        assert_eq!(step.kind, TraceKind::Tool);
        assert_eq!(step.name, "vault");
        assert_eq!(input["reused"], true);
        assert_eq!(input["toolCall"]["args"]["secret"], REDACTED);
        let error = step.error.unwrap();
        assert_eq!(error.code, ToolErrorCode::NotFound);
        assert_eq!(error.details.unwrap()["token"], REDACTED);
        assert!(step.output.is_none());
    }

    #[test]
    fn test_tool_step_redacts_output() {
        let call = ToolCall::new("c-2", "login", Map::new());
        let result = ToolResult::success(
            &call,
            json!({"session": {"token": "abc123", "user": "ada"}}),
        );

        let step = tool_step(&call, &result, false);
        let output = step.output.unwrap();

        assert_eq!(output["session"]["token"], REDACTED);
        assert_eq!(output["session"]["user"], "ada");
        // The result handed back to the caller is untouched.
        assert_eq!(result.result.unwrap()["session"]["token"], "abc123");
    }
}
