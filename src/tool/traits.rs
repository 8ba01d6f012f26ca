// ABOUTME: Defines the Tool trait - the core abstraction for agent capabilities.
// ABOUTME: Tools have a name, description, risk, argument schema, and async execute method.

use async_trait::async_trait;
use serde_json::Value;

use crate::permission::{ToolPolicy, ToolRisk};

/// Per-call context handed to a tool body.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub request_id: String,
    pub session_id: Option<String>,
    pub policy: ToolPolicy,
}

/// Why a tool body failed.
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    /// A problem with the caller's input, reported under a tool-specific code.
    #[error("{message}")]
    User {
        code: String,
        message: String,
        details: Option<Value>,
    },

    /// Anything else.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl ToolFailure {
    pub fn user(code: impl Into<String>, message: impl Into<String>) -> Self {
        ToolFailure::User {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(self, value: Value) -> Self {
        match self {
            ToolFailure::User { code, message, .. } => ToolFailure::User {
                code,
                message,
                details: Some(value),
            },
            other => other,
        }
    }
}

impl From<serde_json::Error> for ToolFailure {
    fn from(err: serde_json::Error) -> Self {
        ToolFailure::Execution(err.into())
    }
}

/// A tool that can be executed by an agent.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of this tool.
    fn name(&self) -> &str;

    /// Returns a human-readable description for the planner.
    fn description(&self) -> &str;

    /// Returns how dangerous the tool is to run.
    fn risk(&self) -> ToolRisk {
        ToolRisk::Safe
    }

    /// Returns the JSON Schema for the tool's arguments.
    fn schema(&self) -> Value;

    /// Execute the tool with arguments that already passed [`Tool::schema`].
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolFailure>;
}
