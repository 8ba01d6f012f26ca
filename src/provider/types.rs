// ABOUTME: Plan, trace, and chat message types exchanged with planning backends.
// ABOUTME: Includes the strict structural validation applied to every plan.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaIssue;
use crate::tool::{ToolCall, ToolResultError};

/// Role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChatMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Only meaningful for [`Role::Tool`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            created_at: None,
            tool_call_id: None,
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool message answering `tool_call_id`.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn validate(&self) -> Vec<SchemaIssue> {
        if self.role != Role::Tool && self.tool_call_id.is_some() {
            return vec![SchemaIssue::new(
                "toolCallId",
                "toolCallId is only valid for role=\"tool\"",
            )];
        }
        Vec::new()
    }
}

/// What a trace step recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Plan,
    Provider,
    Tool,
    Memory,
    Final,
}

/// One sub-operation performed while producing a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TraceStep {
    pub id: String,
    pub kind: TraceKind,
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolResultError>,
}

/// Ordered record of the steps behind one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Trace {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn validate(&self, prefix: &str) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        if self.request_id.is_empty() {
            issues.push(SchemaIssue::new(
                format!("{}.requestId", prefix),
                "must not be empty",
            ));
        }

        let mut seen = HashSet::new();
        for (i, step) in self.steps.iter().enumerate() {
            let at = |field: &str| format!("{}.steps.{}.{}", prefix, i, field);
            if step.id.is_empty() {
                issues.push(SchemaIssue::new(at("id"), "must not be empty"));
            } else if !seen.insert(step.id.as_str()) {
                issues.push(SchemaIssue::new(at("id"), "duplicate step id"));
            }
            if step.name.is_empty() {
                issues.push(SchemaIssue::new(at("name"), "must not be empty"));
            }
            if step.ended_at.is_some_and(|ended| ended < step.started_at) {
                issues.push(SchemaIssue::new(at("endedAt"), "must not precede startedAt"));
            }
        }
        issues
    }
}

/// What a planning backend decided for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlanOutput {
    pub tool_calls: Vec<ToolCall>,
    pub final_response: String,
    pub trace: Trace,
}

impl PlanOutput {
    /// Parse and validate raw backend output.
    pub fn from_value(value: Value) -> Result<Self, Vec<SchemaIssue>> {
        let plan: Self = serde_json::from_value(value)
            .map_err(|e| vec![SchemaIssue::new("", e.to_string())])?;
        let issues = plan.validate();
        if issues.is_empty() {
            Ok(plan)
        } else {
            Err(issues)
        }
    }

    /// Structural checks beyond what deserialization enforces.
    ///
    /// Tool call ids key deduplication, so they must be present and unique.
    pub fn validate(&self) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        let mut ids = HashSet::new();

        for (i, call) in self.tool_calls.iter().enumerate() {
            if call.id.is_empty() {
                issues.push(SchemaIssue::new(
                    format!("toolCalls.{}.id", i),
                    "must not be empty",
                ));
            } else if !ids.insert(call.id.as_str()) {
                issues.push(SchemaIssue::new(
                    format!("toolCalls.{}.id", i),
                    format!("duplicate tool call id {}", call.id),
                ));
            }
            if call.name.is_empty() {
                issues.push(SchemaIssue::new(
                    format!("toolCalls.{}.name", i),
                    "must not be empty",
                ));
            }
        }

        issues.extend(self.trace.validate("trace"));
        issues
    }
}
