// ABOUTME: Agent - runs one turn: plan under a provider lease, execute tools under
// ABOUTME: tool leases with idempotent reuse, persist, and assemble the trace.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::memory::{MemoryPort, ToolRunKey, ToolRunMeta};
use super::trace::tool_step;
use super::turn::{TurnRequest, TurnResponse};
use crate::config::ToolsConfig;
use crate::coordinator::{Admission, ConcurrencyLimiter, Lease, Limiters, RateLimiter, RateQuota};
use crate::error::{AgentError, BusyCode};
use crate::permission::ToolPolicy;
use crate::provider::{ChatMessage, PlanOptions, PlanRequest, ProviderRegistry, Trace};
use crate::tool::{ExecuteToolCall, Registry, ToolCall, ToolResult, execute_tool_call};

/// Limits applied to every tool call in a turn.
#[derive(Debug, Clone, Copy)]
pub struct ToolExecutionConfig {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Default for ToolExecutionConfig {
    fn default() -> Self {
        Self::from(&ToolsConfig::default())
    }
}

impl From<&ToolsConfig> for ToolExecutionConfig {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

/// Turn orchestrator.
///
/// Stages run strictly in order. Busy limiters and invalid plans end the turn
/// before anything is persisted; individual tool failures are captured in
/// their results and the turn continues.
pub struct Agent {
    providers: Arc<ProviderRegistry>,
    memory: Arc<dyn MemoryPort>,
    tools: Registry,
    tool_config: ToolExecutionConfig,
    provider_limiter: Option<ConcurrencyLimiter>,
    tool_limiter: Option<ConcurrencyLimiter>,
    rate_limit: Option<(RateLimiter, RateQuota)>,
}

impl Agent {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        memory: Arc<dyn MemoryPort>,
        tools: Registry,
        tool_config: ToolExecutionConfig,
    ) -> Self {
        Self {
            providers,
            memory,
            tools,
            tool_config,
            provider_limiter: None,
            tool_limiter: None,
            rate_limit: None,
        }
    }

    /// Bound concurrent planner calls.
    pub fn with_provider_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.provider_limiter = Some(limiter);
        self
    }

    /// Bound concurrent tool executions.
    pub fn with_tool_limiter(mut self, limiter: ConcurrencyLimiter) -> Self {
        self.tool_limiter = Some(limiter);
        self
    }

    /// Count every turn against its caller's fixed-window quota.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter, quota: RateQuota) -> Self {
        self.rate_limit = Some((limiter, quota));
        self
    }

    /// Use the limiters built from configuration.
    pub fn with_limiters(self, limiters: &Limiters) -> Self {
        let agent = self
            .with_provider_limiter(limiters.provider.clone())
            .with_tool_limiter(limiters.tool.clone());
        match &limiters.rate {
            Some(rate) => agent.with_rate_limiter(rate.clone(), limiters.rate_quota),
            None => agent,
        }
    }

    pub fn tools(&self) -> &Registry {
        &self.tools
    }

    /// Run one turn.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnResponse, AgentError> {
        let started = Instant::now();

        let issues = request.validate();
        if !issues.is_empty() {
            return Err(AgentError::InvalidRequest(issues));
        }
        self.check_rate(request.client_key.as_deref()).await?;

        let request_id = request
            .request_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let idempotency_key = request
            .idempotency_key
            .unwrap_or_else(|| request_id.clone());
        let session_id = request
            .session_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        debug!(
            request_id = %request_id,
            session_id = %session_id,
            provider = ?request.provider,
            "Starting turn"
        );

        self.memory
            .ensure_session(&session_id)
            .await
            .map_err(AgentError::Memory)?;
        let history = self
            .memory
            .load_history(&session_id)
            .await
            .map_err(AgentError::Memory)?;

        let planner = self.providers.resolve(request.provider.as_deref())?;

        let lease = match &self.provider_limiter {
            Some(limiter) => Some(LeaseGuard::acquire(limiter, BusyCode::ProviderBusy).await?),
            None => None,
        };

        let plan_request = PlanRequest {
            session_id: session_id.clone(),
            message: request.message.clone(),
            history,
        };
        let plan_options = PlanOptions {
            request_id: request_id.clone(),
            session_id: session_id.clone(),
        };
        let planned = AssertUnwindSafe(planner.plan(&plan_request, &plan_options))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(anyhow::anyhow!(
                    "Planner {} panicked: {}",
                    planner.name(),
                    panic_message(panic.as_ref())
                ))
            });

        if let Some(lease) = lease {
            lease.release().await;
        }

        let plan = planned.map_err(AgentError::Planner)?;
        let issues = plan.validate();
        if !issues.is_empty() {
            return Err(AgentError::InvalidPlan(issues));
        }
        debug!(
            request_id = %request_id,
            provider = planner.name(),
            tool_calls = plan.tool_calls.len(),
            "Plan accepted"
        );

        let mut tool_results = Vec::with_capacity(plan.tool_calls.len());
        let mut tool_steps = Vec::with_capacity(plan.tool_calls.len());

        for call in &plan.tool_calls {
            let key = ToolRunKey {
                session_id: session_id.clone(),
                tool_call_id: call.id.clone(),
                idempotency_key: idempotency_key.clone(),
            };
            let existing = self
                .memory
                .get_tool_result(&key)
                .await
                .map_err(AgentError::Memory)?;

            let (result, reused) = match existing {
                Some(result) => (result, true),
                None => {
                    let result = self
                        .execute(call, request.tool_policy, &request_id, &session_id)
                        .await?;
                    (result, false)
                }
            };

            debug!(
                request_id = %request_id,
                tool = %call.name,
                ok = result.ok,
                duration_ms = ?result.duration_ms,
                reused,
                "Tool call finished"
            );
            tool_steps.push(tool_step(call, &result, reused));
            tool_results.push(result);
        }

        let mut steps = plan.trace.steps;
        steps.extend(tool_steps);
        let trace = Trace {
            request_id: request_id.clone(),
            session_id: Some(session_id.clone()),
            steps,
        };

        self.memory
            .append_messages(
                &session_id,
                &[
                    ChatMessage::user(request.message),
                    ChatMessage::assistant(plan.final_response.clone()),
                ],
            )
            .await
            .map_err(AgentError::Memory)?;
        let meta = ToolRunMeta {
            request_id: request_id.clone(),
            idempotency_key,
        };
        self.memory
            .append_tool_runs(&session_id, &meta, &plan.tool_calls, &tool_results)
            .await
            .map_err(AgentError::Memory)?;

        let response = TurnResponse {
            request_id,
            session_id,
            latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            final_response: plan.final_response,
            tool_calls: plan.tool_calls,
            tool_results,
            trace,
        };

        let issues = response.validate();
        if !issues.is_empty() {
            return Err(AgentError::InvalidResponse(issues));
        }
        debug!(
            request_id = %response.request_id,
            latency_ms = response.latency_ms,
            "Turn complete"
        );
        Ok(response)
    }

    async fn check_rate(&self, client_key: Option<&str>) -> Result<(), AgentError> {
        let Some((limiter, quota)) = &self.rate_limit else {
            return Ok(());
        };
        let key = format!("client:{}", client_key.unwrap_or("anonymous"));
        let decision = limiter.consume(&key, quota.limit, quota.window_ms).await?;
        if decision.allowed {
            return Ok(());
        }
        debug!(
            key = %key,
            count = decision.count,
            limit = decision.limit,
            retry_after_ms = ?decision.retry_after_ms,
            "Rate limit exceeded"
        );
        Err(AgentError::RateLimited {
            retry_after_ms: decision.retry_after_ms.filter(|ms| *ms > 0),
        })
    }

    async fn execute(
        &self,
        call: &ToolCall,
        policy: ToolPolicy,
        request_id: &str,
        session_id: &str,
    ) -> Result<ToolResult, AgentError> {
        let lease = match &self.tool_limiter {
            Some(limiter) => Some(LeaseGuard::acquire(limiter, BusyCode::ToolBusy).await?),
            None => None,
        };

        let result = execute_tool_call(ExecuteToolCall {
            registry: &self.tools,
            tool_call: call,
            policy,
            request_id,
            session_id: Some(session_id),
            timeout: self.tool_config.timeout,
            output_limit_bytes: self.tool_config.output_limit_bytes,
        })
        .await;

        if let Some(lease) = lease {
            lease.release().await;
        }
        Ok(result)
    }
}

/// A lease held for the duration of one stage.
///
/// Call [`release`](Self::release) on the normal path. If the guard is
/// dropped instead (the turn future was cancelled or a stage unwound), the
/// release is spawned onto the current runtime.
struct LeaseGuard {
    limiter: ConcurrencyLimiter,
    lease: Option<Lease>,
}

impl LeaseGuard {
    async fn acquire(limiter: &ConcurrencyLimiter, code: BusyCode) -> Result<Self, AgentError> {
        let lease = acquire(limiter, code).await?;
        Ok(Self {
            limiter: limiter.clone(),
            lease: Some(lease),
        })
    }

    async fn release(mut self) {
        if let Some(lease) = self.lease.take() {
            release(&self.limiter, &lease).await;
        }
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let limiter = self.limiter.clone();
                handle.spawn(async move {
                    release(&limiter, &lease).await;
                });
            }
            Err(_) => warn!(
                key = self.limiter.key(),
                lease_id = %lease.lease_id,
                "Lease dropped outside a runtime; it will expire after its TTL"
            ),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

async fn acquire(limiter: &ConcurrencyLimiter, code: BusyCode) -> Result<Lease, AgentError> {
    match limiter.try_acquire().await? {
        Admission::Acquired { lease, .. } => Ok(lease),
        Admission::Busy { retry_after_ms, .. } => {
            let message = match code {
                BusyCode::ProviderBusy => "Provider is busy",
                BusyCode::ToolBusy => "Tool executor is busy",
            };
            debug!(key = limiter.key(), ?retry_after_ms, "{}", message);
            Err(AgentError::Busy {
                code,
                message: message.to_string(),
                retry_after_ms: Some(retry_after_ms.unwrap_or(0)),
            })
        }
    }
}

async fn release(limiter: &ConcurrencyLimiter, lease: &Lease) {
    if let Err(e) = limiter.release(lease).await {
        warn!(
            key = limiter.key(),
            lease_id = %lease.lease_id,
            error = %e,
            "Lease release failed; it will expire after its TTL"
        );
    }
}
