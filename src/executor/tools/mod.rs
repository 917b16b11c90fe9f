pub mod basic;
pub mod calc;
pub mod command;
pub mod files;
pub mod memory_tools;
pub mod research;
pub mod weather;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::context::ExecutionContext;
use super::{ExecError, ToolOutput};

/// One tool implementation. Handlers only touch capabilities granted in
/// the context and must release anything they acquire on every exit path.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError>;
}

/// Handlers for the canonical toolset, keyed by registered name.
pub fn default_handlers() -> HashMap<String, Arc<dyn ToolHandler>> {
    let mut handlers: HashMap<String, Arc<dyn ToolHandler>> = HashMap::new();
    handlers.insert("respond".into(), Arc::new(basic::RespondTool));
    handlers.insert("get_time".into(), Arc::new(basic::GetTimeTool));
    handlers.insert("calculate".into(), Arc::new(calc::CalculateTool));
    handlers.insert("get_weather".into(), Arc::new(weather::WeatherTool));
    handlers.insert("remember".into(), Arc::new(memory_tools::RememberTool));
    handlers.insert("recall_memory".into(), Arc::new(memory_tools::RecallTool));
    handlers.insert("forget_memory".into(), Arc::new(memory_tools::ForgetTool));
    handlers.insert("read_file".into(), Arc::new(files::ReadFileTool));
    handlers.insert("write_file".into(), Arc::new(files::WriteFileTool));
    handlers.insert("list_files".into(), Arc::new(files::ListFilesTool));
    handlers.insert("delete_file".into(), Arc::new(files::DeleteFileTool));
    handlers.insert("search_web".into(), Arc::new(research::SearchWebTool));
    handlers.insert("research".into(), Arc::new(research::ResearchTool));
    handlers.insert("run_command".into(), Arc::new(command::RunCommandTool));
    handlers
}

pub(crate) fn arg_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ExecError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::ToolInternal(format!("missing string argument '{key}'")))
}
