use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, SideEffectRecord, ToolOutput};
use crate::registry::Capability;

pub struct ReadFileTool;

#[async_trait]
impl ToolHandler for ReadFileTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::FsRead)?;
        let raw = arg_str(args, "path")?;
        let path = ctx.resolve_path(raw)?;
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ExecError::ToolInternal(format!("read '{raw}': {e}")))?;
        Ok(ToolOutput {
            value: json!({ "path": raw, "content": content.as_str(), "bytes": content.len() }),
            reply: content,
            side_effects: vec![SideEffectRecord::FileRead { path: raw.to_string() }],
            citations: Vec::new(),
        })
    }
}

pub struct WriteFileTool;

#[async_trait]
impl ToolHandler for WriteFileTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::FsWrite)?;
        let raw = arg_str(args, "path")?;
        let content = arg_str(args, "content")?;
        let path = ctx.resolve_path(raw)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ExecError::ToolInternal(format!("mkdir for '{raw}': {e}")))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ExecError::ToolInternal(format!("write '{raw}': {e}")))?;
        Ok(ToolOutput {
            value: json!({ "path": raw, "bytes": content.len() }),
            reply: format!("Wrote {} bytes to {raw}.", content.len()),
            side_effects: vec![SideEffectRecord::FileWrite {
                path: raw.to_string(),
                bytes: content.len(),
            }],
            citations: Vec::new(),
        })
    }
}

pub struct ListFilesTool;

#[async_trait]
impl ToolHandler for ListFilesTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::FsRead)?;
        let raw = args.get("path").and_then(Value::as_str).unwrap_or(".");
        let path = ctx.resolve_path(raw)?;
        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| ExecError::ToolInternal(format!("list '{raw}': {e}")))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ExecError::ToolInternal(e.to_string()))?
        {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
        files.sort();
        let reply = if files.is_empty() {
            format!("{raw} is empty.")
        } else {
            format!("{raw} contains: {}", files.join(", "))
        };
        Ok(ToolOutput {
            value: json!({ "path": raw, "files": files }),
            reply,
            side_effects: vec![SideEffectRecord::FileRead { path: raw.to_string() }],
            citations: Vec::new(),
        })
    }
}

pub struct DeleteFileTool;

#[async_trait]
impl ToolHandler for DeleteFileTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::FsWrite)?;
        let raw = arg_str(args, "path")?;
        let path = ctx.resolve_path(raw)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| ExecError::ToolInternal(format!("delete '{raw}': {e}")))?;
        Ok(ToolOutput {
            value: json!({ "path": raw }),
            reply: format!("Deleted {raw}."),
            side_effects: vec![SideEffectRecord::FileDelete { path: raw.to_string() }],
            citations: Vec::new(),
        })
    }
}
