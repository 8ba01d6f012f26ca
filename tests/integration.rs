// ABOUTME: Integration tests verifying modules work together.
// ABOUTME: Tests stores, limiters, and the executor without external services.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio_test::{assert_err, assert_ok};
use turnstile::prelude::*;

/// A test tool that returns a large payload.
struct ReportTool;

#[async_trait::async_trait]
impl Tool for ReportTool {
    fn name(&self) -> &str {
        "report"
    }

    fn description(&self) -> &str {
        "Produce a long report"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lines": { "type": "integer", "minimum": 1 }
            },
            "required": ["lines"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let lines = args["lines"].as_u64().unwrap_or(1) as usize;
        Ok(json!({ "report": "line\n".repeat(lines) }))
    }
}

#[tokio::test]
async fn test_concurrent_admission_respects_capacity() {
    let store: Arc<dyn LeaseStore> = Arc::new(InMemoryLeaseStore::new());
    let limiter = ConcurrencyLimiter::new(store, "provider", 3, 10_000);

    let attempts = (0..12).map(|_| {
        let limiter = limiter.clone();
        tokio::spawn(async move { limiter.try_acquire().await })
    });
    let admissions: Vec<Admission> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let acquired: Vec<Lease> = admissions
        .into_iter()
        .filter_map(Admission::into_lease)
        .collect();
    assert_eq!(acquired.len(), 3);

    assert_ok!(limiter.release(&acquired[0]).await);
    assert!(limiter.try_acquire().await.unwrap().is_acquired());
}

#[tokio::test]
async fn test_rate_limiter_fixed_window() {
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(InMemoryRateLimitStore::with_clock(clock.clone()));
    let limiter = RateLimiter::with_clock(store, clock.clone());

    for _ in 0..2 {
        assert!(limiter.consume("client-a", 2, 1_000).await.unwrap().allowed);
    }
    clock.advance(400);
    let denied = limiter.consume("client-a", 2, 1_000).await.unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after_ms, Some(600));

    // Other keys have their own window.
    assert!(limiter.consume("client-b", 2, 1_000).await.unwrap().allowed);

    clock.advance(600);
    let fresh = limiter.consume("client-a", 2, 1_000).await.unwrap();
    assert!(fresh.allowed);
    assert_eq!(fresh.count, 1);
}

#[tokio::test]
async fn test_invalid_limits_are_rejected_immediately() {
    let store = InMemoryLeaseStore::new();
    let request = AcquireLease {
        key: "tool".into(),
        limit: 0,
        ttl_ms: 1_000,
        lease_id: "l-1".into(),
    };
    assert_err!(store.try_acquire(&request).await);

    let limiter = RateLimiter::new(Arc::new(InMemoryRateLimitStore::new()));
    assert_err!(limiter.consume("k", 0, 1_000).await);
}

#[tokio::test]
async fn test_executor_caps_large_output() {
    let registry = Registry::new();
    registry.register(ReportTool).await.unwrap();

    let mut args = Map::new();
    args.insert("lines".into(), json!(2_000));
    let call = ToolCall::new("c-1", "report", args);

    let result = execute_tool_call(ExecuteToolCall {
        registry: &registry,
        tool_call: &call,
        policy: ToolPolicy::safe(),
        request_id: "req-1",
        session_id: None,
        timeout: Duration::from_secs(1),
        output_limit_bytes: 100,
    })
    .await;

    assert!(result.ok);
    assert_eq!(result.truncated, Some(true));
    let text = result.result.as_ref().and_then(Value::as_str).unwrap();
    assert!(text.len() <= 100);
}

#[tokio::test]
async fn test_executor_reports_schema_violations() {
    let registry = Registry::new();
    registry.register(ReportTool).await.unwrap();

    let mut args = Map::new();
    args.insert("lines".into(), json!(0));
    let call = ToolCall::new("c-1", "report", args);

    let result = execute_tool_call(ExecuteToolCall {
        registry: &registry,
        tool_call: &call,
        policy: ToolPolicy::safe(),
        request_id: "req-1",
        session_id: Some("s-1"),
        timeout: Duration::from_secs(1),
        output_limit_bytes: 1_000,
    })
    .await;

    assert_eq!(result.error_code(), Some(&ToolErrorCode::InvalidArgs));
    let details = result.error.unwrap().details.unwrap();
    assert_eq!(details["issues"][0]["path"], "lines");
}

#[tokio::test]
async fn test_agent_from_configuration() {
    let mut vars = std::collections::HashMap::new();
    vars.insert("TURNSTILE__CONCURRENCY__PROVIDER_MAX".to_string(), "2".to_string());
    vars.insert("TURNSTILE__TOOLS__TIMEOUT_MS".to_string(), "250".to_string());
    let config = TurnstileConfig::from_vars(vars).unwrap();
    assert_eq!(config.concurrency.provider_max, 2);

    let limiters = Limiters::from_config(&config).unwrap();
    let tools = Registry::new();
    register_builtins(&tools).await.unwrap();

    let mut providers = ProviderRegistry::new();
    providers
        .register(MockPlanner::new().with_tool_call("calculator", json!({"expression": "8/2"})))
        .unwrap();

    let agent = Agent::new(
        Arc::new(providers),
        InMemoryMemoryPort::shared(),
        tools,
        ToolExecutionConfig::from(&config.tools),
    )
    .with_limiters(&limiters);

    let response = agent.run_turn(TurnRequest::new("divide")).await.unwrap();
    assert_eq!(response.tool_results[0].result, Some(json!(4)));
    assert!(response.validate().is_empty());

    limiters.close().await;
}
