// ABOUTME: Provider module - planning backend abstraction and registry.
// ABOUTME: Defines plan/trace/message types, the Planner trait, and a mock planner.

mod mock;
mod planner;
mod registry;
mod types;

pub use mock::MockPlanner;
pub use planner::*;
pub use registry::ProviderRegistry;
pub use types::*;
