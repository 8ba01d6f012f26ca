// ABOUTME: Agent module - the per-turn orchestrator and its persistence boundary.
// ABOUTME: Provides Agent, TurnRequest/TurnResponse, MemoryPort, and trace redaction.

mod memory;
mod runner;
mod trace;
mod turn;

pub use memory::{InMemoryMemoryPort, MemoryPort, ToolRun, ToolRunKey, ToolRunMeta};
pub use runner::{Agent, ToolExecutionConfig};
pub use trace::{REDACTED, redact};
pub use turn::{TurnRequest, TurnResponse};
