// ABOUTME: Tool module - defines tools, registry, results, and execution.
// ABOUTME: Core abstraction for agent capabilities.

mod executor;
mod registry;
mod result;
mod schema;
mod traits;

pub use executor::*;
pub use registry::*;
pub use result::*;
pub use schema::validate_args;
pub use traits::*;

#[cfg(test)]
mod registry_test;
