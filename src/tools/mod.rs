// ABOUTME: Built-in tools available to every agent.
// ABOUTME: Includes a deterministic echo and a safe arithmetic calculator.

mod calculator;
mod echo;

pub use calculator::CalculatorTool;
pub use echo::EchoTool;

use crate::error::RegistryError;
use crate::tool::Registry;

/// Register every built-in tool.
pub async fn register_builtins(registry: &Registry) -> Result<(), RegistryError> {
    registry.register(EchoTool).await?;
    registry.register(CalculatorTool).await?;
    Ok(())
}
