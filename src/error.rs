// ABOUTME: Defines all error types for the turnstile library using thiserror.
// ABOUTME: Each component has its own error enum, unified under TurnstileError.

use serde::{Deserialize, Serialize};

/// Top-level error type for the turnstile library.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TurnstileError {
    /// Classify this error for the boundary layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TurnstileError::Store(e) => e.kind(),
            TurnstileError::Provider(e) => e.kind(),
            TurnstileError::Registry(_) => ErrorKind::Internal,
            TurnstileError::Agent(e) => e.kind(),
            TurnstileError::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Closed classification of every failure the library can surface.
///
/// The transport layer maps a kind to a status with [`ErrorKind::status_code`]
/// instead of inspecting concrete error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProviderBusy,
    ToolBusy,
    InvalidPlan,
    Provider,
    RateLimited,
    PolicyDenied,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::ProviderBusy | ErrorKind::ToolBusy => 503,
            ErrorKind::InvalidPlan | ErrorKind::Provider => 502,
            ErrorKind::RateLimited => 429,
            ErrorKind::PolicyDenied => 403,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Internal => 500,
        }
    }

    /// Stable wire code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::ProviderBusy => "PROVIDER_BUSY",
            ErrorKind::ToolBusy => "TOOL_BUSY",
            ErrorKind::InvalidPlan => "INVALID_PLAN",
            ErrorKind::Provider => "PROVIDER_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::PolicyDenied => "POLICY_DENIED",
            ErrorKind::InvalidInput => "INVALID_INPUT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// One violation found while validating a structured value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Dotted path to the offending field, or `(root)`.
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() { "(root)".to_string() } else { path },
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub(crate) fn join_issues(issues: &[SchemaIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from lease and rate-limit stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Store is closed")]
    Closed,

    #[error("Backend connection failed: {0}")]
    Connection(String),

    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    #[error("Unexpected backend reply: {0}")]
    UnexpectedReply(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Errors from planner registration and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not found: {0}")]
    NotFound(String),

    #[error("No providers registered")]
    NoneRegistered,

    #[error("Multiple providers registered ({}); specify one explicitly", .0.join(", "))]
    Ambiguous(Vec<String>),

    #[error("Provider already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Provider is disabled: {0}")]
    Disabled(String),
}

impl ProviderError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Provider
    }
}

/// Errors from tool registration.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),
}

/// Which capacity pool refused a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BusyCode {
    ProviderBusy,
    ToolBusy,
}

impl BusyCode {
    pub fn as_str(self) -> &'static str {
        match self {
            BusyCode::ProviderBusy => "PROVIDER_BUSY",
            BusyCode::ToolBusy => "TOOL_BUSY",
        }
    }
}

/// Errors that end a turn.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("{message}")]
    Busy {
        code: BusyCode,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Rate limit exceeded")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Invalid turn request: {}", join_issues(.0))]
    InvalidRequest(Vec<SchemaIssue>),

    #[error("Invalid provider plan: {}", join_issues(.0))]
    InvalidPlan(Vec<SchemaIssue>),

    #[error("Invalid turn response: {}", join_issues(.0))]
    InvalidResponse(Vec<SchemaIssue>),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Planner failed: {0}")]
    Planner(#[source] anyhow::Error),

    #[error("Memory port failed: {0}")]
    Memory(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::Busy {
                code: BusyCode::ProviderBusy,
                ..
            } => ErrorKind::ProviderBusy,
            AgentError::Busy {
                code: BusyCode::ToolBusy,
                ..
            } => ErrorKind::ToolBusy,
            AgentError::RateLimited { .. } => ErrorKind::RateLimited,
            AgentError::InvalidRequest(_) => ErrorKind::InvalidInput,
            AgentError::InvalidPlan(_) => ErrorKind::InvalidPlan,
            AgentError::Provider(e) => e.kind(),
            AgentError::Planner(_) => ErrorKind::Provider,
            AgentError::InvalidResponse(_) | AgentError::Memory(_) => ErrorKind::Internal,
            AgentError::Store(e) => e.kind(),
        }
    }

    /// Suggested back-off for busy and rate-limited errors.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            AgentError::Busy { retry_after_ms, .. }
            | AgentError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Errors from configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}
