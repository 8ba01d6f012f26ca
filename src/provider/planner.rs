// ABOUTME: Defines the Planner trait - the abstraction over planning backends
// ABOUTME: (deterministic stubs, local policies, or remote model APIs).

use async_trait::async_trait;

use super::{ChatMessage, PlanOutput};

/// Input a planner reasons over.
#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub session_id: String,
    pub message: String,
    pub history: Vec<ChatMessage>,
}

/// Identifiers a planner should stamp on its trace.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub request_id: String,
    pub session_id: String,
}

/// Trait for planning backends.
///
/// The orchestrator treats a planner as opaque and validates whatever it
/// returns before acting on it.
#[async_trait]
pub trait Planner: Send + Sync {
    /// Registry name.
    fn name(&self) -> &str;

    /// Disabled planners cannot be registered.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Decide which tools to run and what to answer.
    async fn plan(
        &self,
        request: &PlanRequest,
        options: &PlanOptions,
    ) -> Result<PlanOutput, anyhow::Error>;
}
