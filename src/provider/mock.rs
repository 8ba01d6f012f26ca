// ABOUTME: MockPlanner - a deterministic planner for tests and local development.
// ABOUTME: Echoes the message and emits scripted tool calls with stable ids.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{PlanOptions, PlanOutput, PlanRequest, Planner, Trace, TraceKind, TraceStep};
use crate::tool::ToolCall;

/// Deterministic planner.
///
/// Tool call ids are derived from the session, the message, and the call's
/// position, so retrying the same message in the same session yields the
/// same ids and tool results can be deduplicated.
#[derive(Debug, Clone)]
pub struct MockPlanner {
    name: String,
    tool_calls: Vec<(String, Map<String, Value>)>,
}

impl Default for MockPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlanner {
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            tool_calls: Vec::new(),
        }
    }

    /// Register under a different name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a tool call to every plan. Non-object `args` become `{}`.
    pub fn with_tool_call(mut self, name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.tool_calls.push((name.into(), args));
        self
    }

    fn tool_call_id(request: &PlanRequest, index: usize) -> String {
        let seed = format!("{}\n{}\n{}", request.session_id, request.message, index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()).to_string()
    }
}

#[async_trait]
impl Planner for MockPlanner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn plan(
        &self,
        request: &PlanRequest,
        options: &PlanOptions,
    ) -> Result<PlanOutput, anyhow::Error> {
        let started_at = Utc::now();
        let final_response = format!("MockPlanner: {}", request.message);

        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .iter()
            .enumerate()
            .map(|(i, (name, args))| {
                ToolCall::new(Self::tool_call_id(request, i), name.clone(), args.clone())
            })
            .collect();

        let ended_at = Utc::now();
        let step = TraceStep {
            id: Uuid::new_v4().to_string(),
            kind: TraceKind::Provider,
            name: format!("{}.plan", self.name),
            started_at,
            ended_at: Some(ended_at),
            duration_ms: u64::try_from((ended_at - started_at).num_milliseconds()).ok(),
            input: Some(json!({ "message": request.message })),
            output: Some(json!({
                "toolCalls": tool_calls.len(),
                "finalResponse": final_response,
            })),
            error: None,
        };

        Ok(PlanOutput {
            tool_calls,
            final_response,
            trace: Trace {
                request_id: options.request_id.clone(),
                session_id: Some(options.session_id.clone()),
                steps: vec![step],
            },
        })
    }
}
