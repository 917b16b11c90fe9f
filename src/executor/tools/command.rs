use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, SideEffectRecord, ToolOutput};
use crate::registry::Capability;

/// Run one program with arguments, no shell. Chaining, subshells and
/// redirection were already refused by the lint tier; splitting on
/// whitespace here means they could not do anything even if they slipped
/// through.
pub struct RunCommandTool;

#[async_trait]
impl ToolHandler for RunCommandTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::OsControl)?;
        let cmd = arg_str(args, "cmd")?;
        let mut parts = cmd.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| ExecError::ToolInternal("empty command".into()))?;

        let output = tokio::process::Command::new(program)
            .args(parts)
            .current_dir(&ctx.scratch)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExecError::ToolInternal(format!("spawn '{program}': {e}")))?;

        let exit_code = output.status.code();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let reply = if stdout.is_empty() { stderr.clone() } else { stdout.clone() };

        Ok(ToolOutput {
            value: json!({
                "cmd": cmd,
                "exit_code": exit_code,
                "stdout": stdout,
                "stderr": stderr,
            }),
            reply,
            side_effects: vec![SideEffectRecord::ProcessSpawned {
                command: cmd.to_string(),
                exit_code,
            }],
            citations: Vec::new(),
        })
    }
}
