// ABOUTME: Defines tool risk levels, caller policy modes, and their evaluation.
// ABOUTME: Developer-risk tools are refused unless the caller runs in developer mode.

use serde::{Deserialize, Serialize};

/// The decision made for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Allow the tool execution.
    Allow,
    /// Deny the tool execution.
    Deny,
}

/// How dangerous a tool is to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolRisk {
    /// No side effects outside the tool's own result.
    #[default]
    Safe,
    /// Only for trusted callers.
    Developer,
}

/// What the caller is trusted to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    #[default]
    Safe,
    Developer,
}

/// The policy a turn runs its tools under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolPolicy {
    pub mode: PolicyMode,
}

impl ToolPolicy {
    pub fn safe() -> Self {
        Self {
            mode: PolicyMode::Safe,
        }
    }

    pub fn developer() -> Self {
        Self {
            mode: PolicyMode::Developer,
        }
    }

    /// Evaluate whether a tool with the given risk may run.
    pub fn evaluate(&self, risk: ToolRisk) -> Decision {
        match (risk, self.mode) {
            (ToolRisk::Safe, _) => Decision::Allow,
            (ToolRisk::Developer, PolicyMode::Developer) => Decision::Allow,
            (ToolRisk::Developer, PolicyMode::Safe) => Decision::Deny,
        }
    }
}
