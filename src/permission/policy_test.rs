// ABOUTME: Tests for ToolPolicy - risk levels against policy modes.
// ABOUTME: Verifies evaluation and the wire format of policies.

use super::*;

#[test]
fn test_safe_tools_always_allowed() {
    assert_eq!(ToolPolicy::safe().evaluate(ToolRisk::Safe), Decision::Allow);
    assert_eq!(
        ToolPolicy::developer().evaluate(ToolRisk::Safe),
        Decision::Allow
    );
}

#[test]
fn test_developer_tools_need_developer_mode() {
    assert_eq!(
        ToolPolicy::safe().evaluate(ToolRisk::Developer),
        Decision::Deny
    );
    assert_eq!(
        ToolPolicy::developer().evaluate(ToolRisk::Developer),
        Decision::Allow
    );
}

#[test]
fn test_default_policy_is_safe() {
    assert_eq!(ToolPolicy::default(), ToolPolicy::safe());
    assert_eq!(ToolRisk::default(), ToolRisk::Safe);
}

#[test]
fn test_policy_wire_format() {
    let policy: ToolPolicy = serde_json::from_value(serde_json::json!({"mode": "developer"})).unwrap();
    assert_eq!(policy.mode, PolicyMode::Developer);
    assert_eq!(
        serde_json::to_value(ToolRisk::Developer).unwrap(),
        serde_json::json!("developer")
    );
}

#[test]
fn test_unknown_mode_rejected() {
    let result: Result<ToolPolicy, _> = serde_json::from_value(serde_json::json!({"mode": "root"}));
    assert!(result.is_err());
}
