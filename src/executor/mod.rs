pub mod context;
pub mod tools;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ExecutorConfig;
use crate::kernel::cancel::CancelHandle;
use crate::planner::ActionPlan;
use crate::registry::ToolRegistry;
use crate::verifier::citations::CitationRef;

pub use context::{ExecutionContext, ToolDeps};
pub use tools::ToolHandler;

/// What a tool touched while running. The verifier's post-conditions and
/// the per-turn rollback log both read this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SideEffectRecord {
    FileRead { path: String },
    FileWrite { path: String, bytes: usize },
    FileDelete { path: String },
    UrlFetched { url: String, status: u16 },
    ProcessSpawned { command: String, exit_code: Option<i32> },
    MemoryWrite { record_id: String },
    MemoryForget { removed: usize },
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("capability {0:?} not granted to this tool")]
    CapabilityDenied(crate::registry::Capability),
    #[error("execution deadline exceeded")]
    Timeout,
    #[error("path '{0}' resolves outside the configured root")]
    PathOutsideRoot(String),
    #[error("no handler registered for tool '{0}'")]
    HandlerMissing(String),
    #[error("tool failed: {0}")]
    ToolInternal(String),
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecError::CapabilityDenied(_) => "capability_denied",
            ExecError::Timeout => "timeout",
            ExecError::PathOutsideRoot(_) => "path_outside_root",
            ExecError::HandlerMissing(_) => "handler_missing",
            ExecError::ToolInternal(_) => "tool_internal",
            ExecError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecErrorInfo {
    pub kind: String,
    pub message: String,
}

/// What a handler hands back on success.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub value: Value,
    pub reply: String,
    pub side_effects: Vec<SideEffectRecord>,
    pub citations: Vec<CitationRef>,
}

/// Structured outcome of one tool run. Failures are data, never panics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub value: Value,
    /// Textual output surfaced to the user (and split into claims).
    pub reply: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecErrorInfo>,
    pub side_effects: Vec<SideEffectRecord>,
    pub duration_ms: u64,
    pub citations: Vec<CitationRef>,
    pub truncated: bool,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn failure(error: &ExecError, duration: Duration) -> Self {
        Self {
            success: false,
            value: Value::Null,
            reply: String::new(),
            error: Some(ExecErrorInfo {
                kind: error.kind().into(),
                message: error.to_string(),
            }),
            side_effects: Vec::new(),
            duration_ms: duration.as_millis() as u64,
            citations: Vec::new(),
            truncated: false,
            timed_out: matches!(error, ExecError::Timeout),
        }
    }

    pub fn summary(&self) -> String {
        if self.success {
            format!(
                "ok in {}ms, {} side effects{}",
                self.duration_ms,
                self.side_effects.len(),
                if self.truncated { ", truncated" } else { "" }
            )
        } else {
            let kind = self.error.as_ref().map(|e| e.kind.as_str()).unwrap_or("unknown");
            format!("failed ({kind}) in {}ms", self.duration_ms)
        }
    }
}

/// Registry-based dispatcher running tools under deadline, cancellation,
/// capability and output limits. Per-user serialization is the
/// orchestrator's job; the executor itself is freely concurrent.
pub struct SandboxExecutor {
    registry: Arc<ToolRegistry>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    config: ExecutorConfig,
    deps: ToolDeps,
}

impl SandboxExecutor {
    /// Executor with the default handler for every canonical tool.
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig, deps: ToolDeps) -> Self {
        Self {
            registry,
            handlers: tools::default_handlers(),
            config,
            deps,
        }
    }

    /// Replace or add a handler. Used by tests and embedders.
    pub fn install_handler(&mut self, name: &str, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub async fn execute(
        &self,
        user_id: &str,
        plan: &ActionPlan,
        cancel: CancelHandle,
    ) -> ExecutionResult {
        let start = std::time::Instant::now();

        let Some(spec) = self.registry.lookup(&plan.tool_name) else {
            return ExecutionResult::failure(
                &ExecError::HandlerMissing(plan.tool_name.clone()),
                start.elapsed(),
            );
        };
        let Some(handler) = self.handlers.get(&plan.tool_name).cloned() else {
            return ExecutionResult::failure(
                &ExecError::HandlerMissing(plan.tool_name.clone()),
                start.elapsed(),
            );
        };

        // Fresh scratch directory per turn, removed when this guard drops
        // on every exit path.
        let scratch = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return ExecutionResult::failure(
                    &ExecError::ToolInternal(format!("scratch setup failed: {e}")),
                    start.elapsed(),
                )
            }
        };

        // Path confinement is enforced here as well as at the wall.
        if let Some(path) = plan.arg_str("path") {
            if crate::wall::policy::resolve_under_root(&self.deps.fs_root, path).is_err() {
                return ExecutionResult::failure(
                    &ExecError::PathOutsideRoot(path.to_string()),
                    start.elapsed(),
                );
            }
        }

        let deadline_ms = spec.deadline_ms.unwrap_or(self.config.default_deadline_ms);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(deadline_ms);
        let ctx = ExecutionContext {
            user_id: user_id.to_string(),
            cancel: cancel.clone(),
            deadline,
            scratch: scratch.path().to_path_buf(),
            caps: spec.side_effect.granted_capabilities().into_iter().collect(),
            max_output_bytes: self.config.max_output_bytes,
            deps: self.deps.clone(),
        };

        debug!(user = user_id, tool = %plan.tool_name, "executing tool");
        let outcome = tokio::select! {
            result = handler.run(&plan.args, &ctx) => result,
            _ = tokio::time::sleep_until(deadline) => Err(ExecError::Timeout),
            _ = cancel.cancelled() => Err(ExecError::Cancelled),
        };
        let duration = start.elapsed();

        match outcome {
            Ok(mut output) => {
                let mut truncated = false;
                if output.reply.len() > self.config.max_output_bytes {
                    let mut cut = self.config.max_output_bytes;
                    while cut > 0 && !output.reply.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    output.reply.truncate(cut);
                    output.reply.push_str(" [truncated]");
                    truncated = true;
                }
                ExecutionResult {
                    success: true,
                    value: output.value,
                    reply: output.reply,
                    error: None,
                    side_effects: output.side_effects,
                    duration_ms: duration.as_millis() as u64,
                    citations: output.citations,
                    truncated,
                    timed_out: false,
                }
            }
            Err(error) => {
                warn!(user = user_id, tool = %plan.tool_name, "execution failed: {error}");
                ExecutionResult::failure(&error, duration)
            }
        }
    }
}
