// ABOUTME: Runs one tool call end to end: lookup, policy, argument validation,
// ABOUTME: timeout, output capping, and normalization of every failure into a ToolResult.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::{Value, json};

use super::schema::validate_args;
use super::{
    Registry, ToolCall, ToolContext, ToolErrorCode, ToolFailure, ToolResult, ToolResultError,
};
use crate::permission::{Decision, ToolPolicy};

/// Everything needed to run one tool call.
#[derive(Clone, Copy)]
pub struct ExecuteToolCall<'a> {
    pub registry: &'a Registry,
    pub tool_call: &'a ToolCall,
    pub policy: ToolPolicy,
    pub request_id: &'a str,
    pub session_id: Option<&'a str>,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

/// Execute a tool call. Never fails: every problem becomes an `ok: false`
/// result with a typed error code.
///
/// Timing fields cover the tool body only, so calls rejected before the body
/// runs carry no timing.
pub async fn execute_tool_call(opts: ExecuteToolCall<'_>) -> ToolResult {
    let call = opts.tool_call;

    let Some(tool) = opts.registry.get(&call.name).await else {
        return ToolResult::failure(
            call,
            ToolResultError::new(
                ToolErrorCode::NotFound,
                format!("Tool not found: {}", call.name),
            ),
        );
    };

    if opts.policy.evaluate(tool.risk()) == Decision::Deny {
        return ToolResult::failure(
            call,
            ToolResultError::new(
                ToolErrorCode::PolicyDenied,
                format!("Tool \"{}\" requires developer policy", call.name),
            ),
        );
    }

    let args = Value::Object(call.args.clone());
    let issues = validate_args(&tool.schema(), &args);
    if !issues.is_empty() {
        return ToolResult::failure(
            call,
            ToolResultError::new(ToolErrorCode::InvalidArgs, "Invalid tool arguments")
                .with_details(json!({ "issues": issues })),
        );
    }

    let ctx = ToolContext {
        request_id: opts.request_id.to_string(),
        session_id: opts.session_id.map(str::to_string),
        policy: opts.policy,
    };

    let started_at = Utc::now();
    let body = AssertUnwindSafe(tool.execute(args, &ctx)).catch_unwind();
    let outcome = tokio::time::timeout(opts.timeout, body).await;
    let ended_at = Utc::now();

    let result = match outcome {
        Err(_) => ToolResult::failure(
            call,
            ToolResultError::new(
                ToolErrorCode::Timeout,
                format!("Tool timed out after {}ms", opts.timeout.as_millis()),
            ),
        ),
        Ok(Err(panic)) => ToolResult::failure(
            call,
            ToolResultError::new(ToolErrorCode::ExecutionError, panic_message(&*panic)),
        ),
        Ok(Ok(Err(failure))) => ToolResult::failure(call, failure_to_error(failure)),
        Ok(Ok(Ok(value))) => match cap_output(value, opts.output_limit_bytes) {
            Ok((value, truncated)) => {
                let mut result = ToolResult::success(call, value);
                result.truncated = truncated.then_some(true);
                result
            }
            Err(e) => ToolResult::failure(
                call,
                ToolResultError::new(ToolErrorCode::ExecutionError, e.to_string()),
            ),
        },
    }
    .with_timing(started_at, ended_at);

    tracing::debug!(
        tool = %call.name,
        request_id = opts.request_id,
        ok = result.ok,
        duration_ms = result.duration_ms,
        "tool call finished"
    );
    result
}

fn failure_to_error(failure: ToolFailure) -> ToolResultError {
    match failure {
        ToolFailure::User {
            code,
            message,
            details,
        } => ToolResultError {
            message,
            code: ToolErrorCode::from(code),
            details,
        },
        ToolFailure::Execution(e) => {
            let message = e.to_string();
            ToolResultError::new(
                ToolErrorCode::ExecutionError,
                if message.is_empty() {
                    "Tool execution failed".to_string()
                } else {
                    message
                },
            )
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("Tool panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("Tool panicked: {}", s)
    } else {
        "Tool panicked".to_string()
    }
}

/// Replace values whose JSON form exceeds `limit` bytes with a prefix of
/// that JSON, cut on a character boundary.
fn cap_output(value: Value, limit: usize) -> Result<(Value, bool), serde_json::Error> {
    let serialized = serde_json::to_string(&value)?;
    if serialized.len() <= limit {
        return Ok((value, false));
    }

    let mut end = limit;
    while !serialized.is_char_boundary(end) {
        end -= 1;
    }
    Ok((Value::String(serialized[..end].to_string()), true))
}
