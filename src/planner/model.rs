use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::memory::ContextBundle;
use crate::registry::ToolRegistry;
use crate::services::llm::LanguageModel;

use super::types::{ActionPlan, PlanningError};
use super::PlanStrategy;

const SYSTEM_PROMPT: &str = "You are the planning component of a voice assistant. \
Analyze the request and emit EXACTLY one JSON tool call matching the grammar. \
Output must be a single JSON object with no surrounding prose.";

/// Model-backed strategy: grammar-constrained completion with bounded
/// parse-and-retry. A model that honors the grammar succeeds first try;
/// one that does not still converges or fails over cleanly.
pub struct ModelPlanner {
    model: Arc<dyn LanguageModel>,
    registry: Arc<ToolRegistry>,
    grammar: Value,
    max_retries: u32,
}

impl ModelPlanner {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        registry: Arc<ToolRegistry>,
        grammar: Value,
        max_retries: u32,
    ) -> Self {
        Self { model, registry, grammar, max_retries }
    }

    fn build_prompt(&self, utterance: &str, context: &ContextBundle) -> String {
        let tools = self.registry.names().join(", ");
        format!(
            "{SYSTEM_PROMPT}\n\nAvailable tools: {tools}\n\nContext:\n{}\nUser request: {utterance}\n\nJSON tool call:",
            context.render()
        )
    }

    /// Strict parse: one structural object, a registered tool, args that
    /// satisfy that tool's schema. Anything else is a retryable failure.
    fn parse_plan(&self, raw: &str) -> Result<ActionPlan, String> {
        let plan: ActionPlan =
            serde_json::from_str(raw.trim()).map_err(|e| format!("not a tool call: {e}"))?;
        match self.registry.validate_args(&plan.tool_name, &plan.args) {
            None => Err(format!("unknown tool '{}'", plan.tool_name)),
            Some(violations) if !violations.is_empty() => Err(format!(
                "args violate schema: {}",
                violations
                    .iter()
                    .map(|(path, msg)| format!("{path}: {msg}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            )),
            Some(_) => Ok(plan),
        }
    }
}

#[async_trait]
impl PlanStrategy for ModelPlanner {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn plan(
        &self,
        utterance: &str,
        context: &ContextBundle,
        deadline: Instant,
    ) -> Result<ActionPlan, PlanningError> {
        let prompt = self.build_prompt(utterance, context);
        let mut last_error = String::new();

        for attempt in 0..=self.max_retries {
            if Instant::now() >= deadline {
                return Err(PlanningError::Timeout);
            }
            let raw = self
                .model
                .complete(&prompt, Some(&self.grammar), deadline)
                .await
                .map_err(|e| PlanningError::Failure(e.to_string()))?;

            match self.parse_plan(&raw) {
                Ok(plan) => {
                    debug!(tool = %plan.tool_name, attempt, "model plan accepted");
                    return Ok(plan);
                }
                Err(e) => {
                    warn!(attempt, "model output rejected: {e}");
                    last_error = e;
                }
            }
        }

        Err(PlanningError::Failure(format!(
            "model output unparseable after {} attempts: {last_error}",
            self.max_retries + 1
        )))
    }
}
