// ABOUTME: Defines tool calls and ToolResult - the normalized outcome of one call
// ABOUTME: with exactly one of result/error, timing, and truncation metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{ErrorKind, SchemaIssue};

/// A planner's request to run one tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolCall {
    /// Must stay the same across retries of one logical turn for
    /// deduplication to work.
    pub id: String,
    pub name: String,
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Machine-readable failure code carried inside a [`ToolResult`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ToolErrorCode {
    NotFound,
    PolicyDenied,
    InvalidArgs,
    Timeout,
    ExecutionError,
    /// A code chosen by the tool itself.
    Custom(String),
}

impl ToolErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ToolErrorCode::NotFound => "TOOL_NOT_FOUND",
            ToolErrorCode::PolicyDenied => "POLICY_DENIED",
            ToolErrorCode::InvalidArgs => "INVALID_TOOL_ARGS",
            ToolErrorCode::Timeout => "TIMEOUT",
            ToolErrorCode::ExecutionError => "TOOL_EXECUTION_ERROR",
            ToolErrorCode::Custom(code) => code,
        }
    }
}

impl From<String> for ToolErrorCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "TOOL_NOT_FOUND" => ToolErrorCode::NotFound,
            "POLICY_DENIED" => ToolErrorCode::PolicyDenied,
            "INVALID_TOOL_ARGS" => ToolErrorCode::InvalidArgs,
            "TIMEOUT" => ToolErrorCode::Timeout,
            "TOOL_EXECUTION_ERROR" => ToolErrorCode::ExecutionError,
            _ => ToolErrorCode::Custom(code),
        }
    }
}

impl From<ToolErrorCode> for String {
    fn from(code: ToolErrorCode) -> Self {
        match code {
            ToolErrorCode::Custom(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for ToolErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload of a failed tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolResultError {
    pub message: String,
    pub code: ToolErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ToolResultError {
    pub fn new(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// How a boundary layer should classify this failure if it surfaces it
    /// outside the turn response.
    ///
    /// Tool-chosen codes are user-facing input errors.
    pub fn kind(&self) -> ErrorKind {
        match self.code {
            ToolErrorCode::PolicyDenied => ErrorKind::PolicyDenied,
            ToolErrorCode::InvalidArgs | ToolErrorCode::Custom(_) => ErrorKind::InvalidInput,
            ToolErrorCode::NotFound | ToolErrorCode::Timeout | ToolErrorCode::ExecutionError => {
                ErrorKind::Internal
            }
        }
    }
}

// Keeps an explicit `"result": null` distinct from an absent result.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub name: String,
    pub ok: bool,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolResultError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Set only when the output was cut to fit the size limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl ToolResult {
    /// A successful result for `call`.
    pub fn success(call: &ToolCall, value: Value) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            ok: true,
            result: Some(value),
            error: None,
            started_at: None,
            ended_at: None,
            duration_ms: None,
            truncated: None,
        }
    }

    /// A failed result for `call`.
    pub fn failure(call: &ToolCall, error: ToolResultError) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            ok: false,
            result: None,
            error: Some(error),
            started_at: None,
            ended_at: None,
            duration_ms: None,
            truncated: None,
        }
    }

    pub fn with_timing(mut self, started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        let elapsed = (ended_at - started_at).num_milliseconds();
        self.started_at = Some(started_at);
        self.ended_at = Some(ended_at);
        self.duration_ms = Some(u64::try_from(elapsed).unwrap_or(0));
        self
    }

    pub fn error_code(&self) -> Option<&ToolErrorCode> {
        self.error.as_ref().map(|e| &e.code)
    }

    /// Check the result/error exclusivity and field constraints. `prefix` is
    /// prepended to every issue path.
    pub fn validate(&self, prefix: &str) -> Vec<SchemaIssue> {
        let path = |field: &str| {
            if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{}.{}", prefix, field)
            }
        };
        let mut issues = Vec::new();

        if self.tool_call_id.is_empty() {
            issues.push(SchemaIssue::new(path("toolCallId"), "must not be empty"));
        }
        if self.name.is_empty() {
            issues.push(SchemaIssue::new(path("name"), "must not be empty"));
        }
        if self.ok {
            if self.error.is_some() {
                issues.push(SchemaIssue::new(
                    path("error"),
                    "error must be omitted when ok=true",
                ));
            }
            if self.result.is_none() {
                issues.push(SchemaIssue::new(
                    path("result"),
                    "result is required when ok=true",
                ));
            }
        } else {
            match &self.error {
                None => issues.push(SchemaIssue::new(
                    path("error"),
                    "error is required when ok=false",
                )),
                Some(error) if error.message.is_empty() => {
                    issues.push(SchemaIssue::new(path("error.message"), "must not be empty"))
                }
                Some(_) => {}
            }
        }
        if let (Some(started), Some(ended)) = (self.started_at, self.ended_at) {
            if ended < started {
                issues.push(SchemaIssue::new(
                    path("endedAt"),
                    "must not precede startedAt",
                ));
            }
        }
        issues
    }
}
