// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use turnstile::prelude::*;` to get started quickly.

pub use crate::agent::{
    Agent, InMemoryMemoryPort, MemoryPort, ToolExecutionConfig, ToolRun, ToolRunKey, ToolRunMeta,
    TurnRequest, TurnResponse,
};
pub use crate::config::{StoreMode, TurnstileConfig};
pub use crate::coordinator::{
    AcquireLease, Admission, ConcurrencyLimiter, InMemoryLeaseStore, InMemoryRateLimitStore, Lease,
    LeaseStore, Limiters, ManualClock, RateDecision, RateLimitStore, RateLimiter, RateQuota,
};
pub use crate::error::{AgentError, BusyCode, ErrorKind, ProviderError, StoreError, TurnstileError};
pub use crate::permission::{Decision, PolicyMode, ToolPolicy, ToolRisk};
pub use crate::provider::{
    ChatMessage, MockPlanner, PlanOptions, PlanOutput, PlanRequest, Planner, ProviderRegistry,
    Role, Trace, TraceKind, TraceStep,
};
pub use crate::tool::{
    ExecuteToolCall, Registry, Tool, ToolCall, ToolContext, ToolErrorCode, ToolFailure,
    ToolResult, execute_tool_call,
};
pub use crate::tools::{CalculatorTool, EchoTool, register_builtins};
