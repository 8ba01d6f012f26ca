// ABOUTME: Permission module - risk policy gating which tools a caller may run.
// ABOUTME: Tools declare a risk level; callers carry a policy mode.

mod policy;

pub use policy::*;

#[cfg(test)]
mod policy_test;
