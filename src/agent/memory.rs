// ABOUTME: MemoryPort - the persistence boundary for sessions, messages, and tool runs.
// ABOUTME: Includes an in-memory implementation with idempotent tool-run inserts.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provider::ChatMessage;
use crate::tool::{ToolCall, ToolResult};

/// Dedup key for a tool run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRunKey {
    pub session_id: String,
    pub tool_call_id: String,
    pub idempotency_key: String,
}

/// Turn-level metadata stored with each tool run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRunMeta {
    pub request_id: String,
    pub idempotency_key: String,
}

/// A persisted tool run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRun {
    pub id: String,
    pub session_id: String,
    pub request_id: String,
    pub idempotency_key: String,
    pub tool_call: ToolCall,
    pub result: ToolResult,
    pub created_at: DateTime<Utc>,
}

/// Persistence boundary used by the agent.
///
/// `append_tool_runs` must treat a duplicate `(session, tool call, idempotency
/// key)` as a no-op that yields the existing row.
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn ensure_session(&self, session_id: &str) -> Result<(), anyhow::Error>;

    /// Messages for the session, oldest first.
    async fn load_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, anyhow::Error>;

    async fn append_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), anyhow::Error>;

    async fn get_tool_result(
        &self,
        key: &ToolRunKey,
    ) -> Result<Option<ToolResult>, anyhow::Error>;

    /// Pairs `tool_calls[i]` with `tool_results[i]`.
    async fn append_tool_runs(
        &self,
        session_id: &str,
        meta: &ToolRunMeta,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<Vec<ToolRun>, anyhow::Error>;
}

#[derive(Default)]
struct Session {
    messages: Vec<ChatMessage>,
    tool_runs: Vec<ToolRun>,
}

/// In-memory memory port.
///
/// Useful for testing and short-lived processes where persistence is not
/// required.
#[derive(Default)]
pub struct InMemoryMemoryPort {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemoryMemoryPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new port wrapped in Arc for sharing.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Tool runs recorded for a session, in insertion order.
    pub async fn tool_runs(&self, session_id: &str) -> Vec<ToolRun> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.tool_runs.clone())
            .unwrap_or_default()
    }

    pub async fn has_session(&self, session_id: &str) -> bool {
        self.sessions.read().await.contains_key(session_id)
    }
}

#[async_trait]
impl MemoryPort for InMemoryMemoryPort {
    async fn ensure_session(&self, session_id: &str) -> Result<(), anyhow::Error> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default();
        Ok(())
    }

    async fn load_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, anyhow::Error> {
        Ok(self
            .sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default())
    }

    async fn append_messages(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), anyhow::Error> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        let now = Utc::now();
        session.messages.extend(messages.iter().map(|m| {
            let mut m = m.clone();
            m.id.get_or_insert_with(|| Uuid::new_v4().to_string());
            m.created_at.get_or_insert(now);
            m
        }));
        Ok(())
    }

    async fn get_tool_result(
        &self,
        key: &ToolRunKey,
    ) -> Result<Option<ToolResult>, anyhow::Error> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&key.session_id).and_then(|s| {
            s.tool_runs
                .iter()
                .find(|run| {
                    run.tool_call.id == key.tool_call_id
                        && run.idempotency_key == key.idempotency_key
                })
                .map(|run| run.result.clone())
        }))
    }

    async fn append_tool_runs(
        &self,
        session_id: &str,
        meta: &ToolRunMeta,
        tool_calls: &[ToolCall],
        tool_results: &[ToolResult],
    ) -> Result<Vec<ToolRun>, anyhow::Error> {
        if tool_calls.len() != tool_results.len() {
            anyhow::bail!(
                "tool call/result count mismatch: {} calls, {} results",
                tool_calls.len(),
                tool_results.len()
            );
        }

        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(session_id.to_string()).or_default();
        let now = Utc::now();

        let mut rows = Vec::with_capacity(tool_calls.len());
        for (call, result) in tool_calls.iter().zip(tool_results) {
            let existing = session.tool_runs.iter().find(|run| {
                run.tool_call.id == call.id && run.idempotency_key == meta.idempotency_key
            });
            if let Some(existing) = existing {
                rows.push(existing.clone());
                continue;
            }

            let row = ToolRun {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                request_id: meta.request_id.clone(),
                idempotency_key: meta.idempotency_key.clone(),
                tool_call: call.clone(),
                result: result.clone(),
                created_at: now,
            };
            session.tool_runs.push(row.clone());
            rows.push(row);
        }
        Ok(rows)
    }
}
