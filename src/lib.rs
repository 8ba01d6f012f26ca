// ABOUTME: Root module for turnstile - admission control and turn orchestration.
// ABOUTME: Re-exports all public types from submodules.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;
pub mod permission;
pub mod prelude;
pub mod provider;
pub mod tool;
pub mod tools;

pub use error::TurnstileError;
