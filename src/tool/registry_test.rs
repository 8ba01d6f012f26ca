// ABOUTME: Tests for tool Registry - registration, lookup, thread safety.
// ABOUTME: Uses a mock tool for testing.

use serde_json::{Value, json};

use super::*;
use crate::error::RegistryError;
use crate::permission::ToolRisk;

/// A simple test tool.
struct ShoutTool;

#[async_trait::async_trait]
impl Tool for ShoutTool {
    fn name(&self) -> &str {
        "shout"
    }

    fn description(&self) -> &str {
        "Upper-cases input"
    }

    fn risk(&self) -> ToolRisk {
        ToolRisk::Developer
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string" }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let message = args["message"].as_str().unwrap_or("");
        Ok(json!(message.to_uppercase()))
    }
}

#[tokio::test]
async fn test_register_and_get() {
    let registry = Registry::new();
    registry.register(ShoutTool).await.unwrap();

    let tool = registry.get("shout").await;
    assert!(tool.is_some());
    assert_eq!(tool.unwrap().name(), "shout");
    assert!(registry.has("shout").await);
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let registry = Registry::new();
    registry.register(ShoutTool).await.unwrap();

    match registry.register(ShoutTool).await {
        Err(RegistryError::AlreadyRegistered(name)) => assert_eq!(name, "shout"),
        other => panic!("Expected AlreadyRegistered, got {:?}", other),
    }
    assert_eq!(registry.count().await, 1);
}

#[tokio::test]
async fn test_get_nonexistent() {
    let registry = Registry::new();
    assert!(registry.get("nonexistent").await.is_none());
    assert!(!registry.has("nonexistent").await);
}

#[tokio::test]
async fn test_unregister() {
    let registry = Registry::new();
    registry.register(ShoutTool).await.unwrap();
    assert_eq!(registry.count().await, 1);

    registry.unregister("shout").await;
    assert_eq!(registry.count().await, 0);
    assert!(registry.get("shout").await.is_none());
}

#[tokio::test]
async fn test_descriptors_carry_risk_and_schema() {
    let registry = Registry::new();
    registry.register(ShoutTool).await.unwrap();

    let descriptors = registry.descriptors().await;
    assert_eq!(descriptors.len(), 1);
    assert_eq!(descriptors[0].name, "shout");
    assert_eq!(descriptors[0].risk, ToolRisk::Developer);
    assert_eq!(descriptors[0].args_schema["required"][0], "message");
    assert_eq!(registry.list().await, vec!["shout"]);
}

#[tokio::test]
async fn test_clone_shares_state() {
    let registry = Registry::new();
    let clone = registry.clone();

    registry.register(ShoutTool).await.unwrap();
    assert_eq!(clone.count().await, 1);
}

#[tokio::test]
async fn test_tool_failure_user_details() {
    let failure = ToolFailure::user("BAD_INPUT", "nope").with_details(json!({"at": 3}));
    match failure {
        ToolFailure::User {
            code,
            message,
            details,
        } => {
            assert_eq!(code, "BAD_INPUT");
            assert_eq!(message, "nope");
            assert_eq!(details, Some(json!({"at": 3})));
        }
        other => panic!("Expected User, got {:?}", other),
    }
}
