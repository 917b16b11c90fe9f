use async_trait::async_trait;
use serde_json::{json, Value};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, SideEffectRecord, ToolOutput};
use crate::memory::{CommitRequest, ForgetTarget};
use crate::registry::Capability;

/// Store an explicit user-asserted fact as its own memory record, ahead
/// of the turn commit the orchestrator performs anyway.
pub struct RememberTool;

#[async_trait]
impl ToolHandler for RememberTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::MemoryWrite)?;
        let fact = arg_str(args, "fact")?;
        let memory = ctx.memory()?;
        let id = memory
            .commit(
                &ctx.user_id,
                CommitRequest {
                    utterance: fact.to_string(),
                    reply: "noted".to_string(),
                    tool_name: "remember".to_string(),
                    success: true,
                    risk_elevated: false,
                },
            )
            .await
            .map_err(|e| ExecError::ToolInternal(e.to_string()))?;

        Ok(ToolOutput {
            value: json!({ "record_id": id.to_string(), "fact": fact }),
            reply: "Got it, I'll remember that.".to_string(),
            side_effects: vec![SideEffectRecord::MemoryWrite { record_id: id.to_string() }],
            citations: Vec::new(),
        })
    }
}

/// Read back what memory holds for a query. Recalled texts are placed in
/// the citation store so the claim verifier can check the reply against
/// actual stored evidence.
pub struct RecallTool;

#[async_trait]
impl ToolHandler for RecallTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        let query = arg_str(args, "query")?;
        let memory = ctx.memory()?;

        let mut sources: Vec<(String, String)> = Vec::new();
        let hits = memory
            .search(&ctx.user_id, query, 5)
            .await
            .map_err(|e| ExecError::ToolInternal(e.to_string()))?;
        for (record, _) in &hits {
            sources.push((format!("memory://{}", record.id), record.utterance.clone()));
        }
        if sources.is_empty() {
            let recent = memory
                .recent(&ctx.user_id, 3)
                .await
                .map_err(|e| ExecError::ToolInternal(e.to_string()))?;
            for record in &recent {
                sources.push((format!("memory://{}", record.id), record.utterance.clone()));
            }
        }

        if sources.is_empty() {
            return Ok(ToolOutput {
                value: json!({ "matches": 0 }),
                reply: "I don't have anything stored for that yet.".to_string(),
                ..ToolOutput::default()
            });
        }

        let mut citations = Vec::new();
        let mut lines = Vec::new();
        for (uri, text) in &sources {
            citations.push(ctx.deps.citations.put(uri, (0, text.len()), text.as_bytes()));
            lines.push(format!("You told me: {text}"));
        }

        Ok(ToolOutput {
            value: json!({ "matches": sources.len(), "query": query }),
            reply: lines.join(" "),
            side_effects: Vec::new(),
            citations,
        })
    }
}

/// Owner-gated destructive removal by semantic match.
pub struct ForgetTool;

#[async_trait]
impl ToolHandler for ForgetTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::MemoryWrite)?;
        let query = arg_str(args, "query")?;
        let memory = ctx.memory()?;
        let removed = memory
            .forget(&ctx.user_id, ForgetTarget::Query(query.to_string()))
            .await
            .map_err(|e| ExecError::ToolInternal(e.to_string()))?;

        let reply = if removed == 0 {
            "Nothing matched closely enough to forget.".to_string()
        } else {
            format!("Forgotten: {removed} matching memor{}.", if removed == 1 { "y" } else { "ies" })
        };
        Ok(ToolOutput {
            value: json!({ "removed": removed }),
            reply,
            side_effects: vec![SideEffectRecord::MemoryForget { removed }],
            citations: Vec::new(),
        })
    }
}
