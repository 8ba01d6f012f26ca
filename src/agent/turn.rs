// ABOUTME: TurnRequest and TurnResponse - the input and output of one agent turn.
// ABOUTME: Responses are validated before they leave the agent.

use serde::{Deserialize, Serialize};

use crate::error::SchemaIssue;
use crate::permission::ToolPolicy;
use crate::provider::Trace;
use crate::tool::{ToolCall, ToolResult};

/// One user turn.
///
/// Missing ids are generated: `request_id` fresh, `idempotency_key` equal to
/// the request id (so a turn without a key never dedups), `session_id` fresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub message: String,
    /// Provider name; `None` selects the sole registered provider.
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub tool_policy: ToolPolicy,
    /// Caller identity the rate limit is counted against, such as a client
    /// address. Unkeyed callers share one bucket.
    #[serde(default)]
    pub client_key: Option<String>,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn provider(mut self, name: impl Into<String>) -> Self {
        self.provider = Some(name.into());
        self
    }

    pub fn policy(mut self, policy: ToolPolicy) -> Self {
        self.tool_policy = policy;
        self
    }

    pub fn client(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    /// Blank messages and explicitly empty ids are rejected.
    pub fn validate(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        if self.message.trim().is_empty() {
            issues.push(SchemaIssue::new("message", "must not be empty"));
        }
        let ids = [
            ("sessionId", &self.session_id),
            ("requestId", &self.request_id),
            ("idempotencyKey", &self.idempotency_key),
            ("clientKey", &self.client_key),
        ];
        for (path, id) in ids {
            if id.as_deref().is_some_and(str::is_empty) {
                issues.push(SchemaIssue::new(path, "must not be empty"));
            }
        }
        issues
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TurnResponse {
    pub request_id: String,
    pub session_id: String,
    pub latency_ms: u64,
    pub final_response: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub trace: Trace,
}

impl TurnResponse {
    pub fn validate(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        if self.request_id.is_empty() {
            issues.push(SchemaIssue::new("requestId", "must not be empty"));
        }
        if self.session_id.is_empty() {
            issues.push(SchemaIssue::new("sessionId", "must not be empty"));
        }
        if self.tool_calls.len() != self.tool_results.len() {
            issues.push(SchemaIssue::new(
                "toolResults",
                format!(
                    "expected {} results, got {}",
                    self.tool_calls.len(),
                    self.tool_results.len()
                ),
            ));
        }
        for (i, result) in self.tool_results.iter().enumerate() {
            issues.extend(result.validate(&format!("toolResults.{}", i)));
        }
        issues.extend(self.trace.validate("trace"));
        issues
    }
}
