pub mod grammar;
pub mod model;
pub mod rules;
pub mod types;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

use crate::memory::ContextBundle;
use crate::registry::ToolRegistry;

pub use grammar::grammar_from_registry;
pub use model::ModelPlanner;
pub use rules::RulePlanner;
pub use types::{ActionPlan, PlanMeta, PlanningError};

/// A way of turning an utterance plus context into a plan.
#[async_trait]
pub trait PlanStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    async fn plan(
        &self,
        utterance: &str,
        context: &ContextBundle,
        deadline: Instant,
    ) -> Result<ActionPlan, PlanningError>;
}

/// Primary strategy with transparent fall-through to a secondary. The
/// fallback is logged but never user-visible. Whatever a strategy
/// returns is re-checked against the registry: the grammar should make
/// `UnknownTool` unreachable, the check stays anyway.
pub struct Planner {
    primary: Box<dyn PlanStrategy>,
    secondary: Option<Box<dyn PlanStrategy>>,
    registry: Arc<ToolRegistry>,
}

impl Planner {
    pub fn new(
        primary: Box<dyn PlanStrategy>,
        secondary: Option<Box<dyn PlanStrategy>>,
        registry: Arc<ToolRegistry>,
    ) -> Self {
        Self { primary, secondary, registry }
    }

    /// Rule-only planner: offline mode and the deterministic test setup.
    pub fn rule_based(registry: Arc<ToolRegistry>) -> Self {
        Self::new(Box::new(RulePlanner), None, registry)
    }

    fn check(&self, plan: ActionPlan) -> Result<ActionPlan, PlanningError> {
        match self.registry.validate_args(&plan.tool_name, &plan.args) {
            None => Err(PlanningError::UnknownTool(plan.tool_name)),
            Some(violations) if !violations.is_empty() => Err(PlanningError::Failure(format!(
                "plan args violate schema for '{}'",
                plan.tool_name
            ))),
            Some(_) => Ok(plan),
        }
    }

    pub async fn plan(
        &self,
        utterance: &str,
        context: &ContextBundle,
        deadline: Instant,
    ) -> Result<ActionPlan, PlanningError> {
        match self.primary.plan(utterance, context, deadline).await {
            Ok(plan) => self.check(plan),
            Err(primary_err) => {
                let Some(secondary) = &self.secondary else {
                    return Err(primary_err);
                };
                warn!(
                    primary = self.primary.name(),
                    fallback = secondary.name(),
                    "primary strategy failed, falling back: {primary_err}"
                );
                let plan = secondary.plan(utterance, context, deadline).await?;
                self.check(plan)
            }
        }
    }
}
