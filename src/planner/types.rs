use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::registry::RiskTier;

/// Optional planner-supplied metadata. Advisory only: the wall trusts the
/// registry's risk tier, never the hint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
}

/// The planner's output: exactly one tool with arguments conforming to
/// that tool's schema. No implicit chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(rename = "tool")]
    pub tool_name: String,
    #[serde(default = "empty_args")]
    pub args: Value,
    #[serde(default, skip_serializing_if = "meta_is_empty")]
    pub meta: PlanMeta,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

fn meta_is_empty(meta: &PlanMeta) -> bool {
    meta.risk.is_none() && meta.reasoning.is_none() && meta.citations.is_empty()
}

impl ActionPlan {
    pub fn new(tool_name: &str, args: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            args,
            meta: PlanMeta::default(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("no strategy produced a plan: {0}")]
    Failure(String),
    #[error("planned tool '{0}' is not registered")]
    UnknownTool(String),
    #[error("planning deadline exceeded")]
    Timeout,
}
