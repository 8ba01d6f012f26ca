// ABOUTME: EchoTool - returns its input text and the text length.
// ABOUTME: Safe and deterministic; a template for new tools.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::{Tool, ToolContext, ToolFailure};

/// Tool that echoes text back.
pub struct EchoTool;

#[derive(Deserialize)]
struct Args {
    text: String,
}

#[derive(Serialize)]
struct Output {
    echoed: String,
    length: usize,
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo back the provided text (safe, deterministic)."
    }

    fn schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "minLength": 1,
                    "maxLength": 10_000,
                    "description": "The text to echo"
                }
            },
            "required": ["text"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolFailure> {
        let args: Args = serde_json::from_value(args)?;
        let length = args.text.chars().count();
        Ok(serde_json::to_value(Output {
            echoed: args.text,
            length,
        })?)
    }
}
