use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, ToolOutput};

/// Conversational passthrough: the planner already decided no real tool
/// is needed.
pub struct RespondTool;

#[async_trait]
impl ToolHandler for RespondTool {
    async fn run(&self, args: &Value, _ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        let message = arg_str(args, "message")?;
        Ok(ToolOutput {
            value: json!({ "message": message }),
            reply: message.to_string(),
            ..ToolOutput::default()
        })
    }
}

pub struct GetTimeTool;

#[async_trait]
impl ToolHandler for GetTimeTool {
    async fn run(&self, args: &Value, _ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        let now = chrono::Utc::now();
        let iso = args.get("format").and_then(Value::as_str) == Some("iso");
        let (time, date) = if iso {
            (now.format("%H:%M:%S").to_string(), now.format("%Y-%m-%d").to_string())
        } else {
            (now.format("%H:%M").to_string(), now.format("%A, %B %-d").to_string())
        };
        Ok(ToolOutput {
            value: json!({ "time": time, "date": date, "timezone": "UTC" }),
            reply: format!("It is {time} UTC on {date}."),
            ..ToolOutput::default()
        })
    }
}
