pub mod toolset;

use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Escalating confirmation requirements. Ordering matters: later tiers
/// subsume the obligations of earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Safe,
    Review,
    Confirm,
    OwnerRoot,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Safe => "safe",
            RiskTier::Review => "review",
            RiskTier::Confirm => "confirm",
            RiskTier::OwnerRoot => "owner_root",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    ReadOnly,
    WritesFs,
    Network,
    OsControl,
    MemoryWrite,
}

/// Capabilities a handler may exercise at runtime. Derived from the
/// side-effect descriptor; anything else is denied by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FsRead,
    FsWrite,
    Network,
    OsControl,
    MemoryWrite,
}

impl SideEffect {
    pub fn granted_capabilities(&self) -> Vec<Capability> {
        match self {
            SideEffect::ReadOnly => vec![Capability::FsRead],
            SideEffect::WritesFs => vec![Capability::FsRead, Capability::FsWrite],
            SideEffect::Network => vec![Capability::Network],
            SideEffect::OsControl => vec![Capability::OsControl],
            SideEffect::MemoryWrite => vec![Capability::MemoryWrite],
        }
    }
}

/// Immutable registry entry for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    /// JSON Schema over the `args` object. Compiled once at registration;
    /// the same document feeds the planner grammar.
    pub args_schema: Value,
    pub risk: RiskTier,
    pub rate_class: RiskTier,
    /// Named predicate evaluated by the verifier after execution.
    pub post_condition: String,
    pub side_effect: SideEffect,
    /// Per-tool deadline override in milliseconds.
    pub deadline_ms: Option<u64>,
}

impl ToolSpec {
    pub fn new(
        name: &str,
        args_schema: Value,
        risk: RiskTier,
        post_condition: &str,
        side_effect: SideEffect,
    ) -> Self {
        Self {
            name: name.to_string(),
            args_schema,
            risk,
            rate_class: risk,
            post_condition: post_condition.to_string(),
            side_effect,
            deadline_ms: None,
        }
    }

    pub fn with_deadline_ms(mut self, ms: u64) -> Self {
        self.deadline_ms = Some(ms);
        self
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("argument schema for '{name}' is malformed: {detail}")]
    InvalidSchema { name: String, detail: String },
}

struct RegisteredTool {
    spec: ToolSpec,
    validator: JSONSchema,
}

/// Single source of truth for what may be invoked. Populated at startup,
/// read-only thereafter.
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, spec: ToolSpec) -> Result<(), RegistryError> {
        if self.tools.contains_key(&spec.name) {
            return Err(RegistryError::DuplicateTool(spec.name));
        }
        let validator = JSONSchema::compile(&spec.args_schema).map_err(|e| {
            RegistryError::InvalidSchema {
                name: spec.name.clone(),
                detail: e.to_string(),
            }
        })?;
        self.tools.insert(spec.name.clone(), RegisteredTool { spec, validator });
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name).map(|t| &t.spec)
    }

    pub fn list<P>(&self, predicate: P) -> Vec<&ToolSpec>
    where
        P: Fn(&ToolSpec) -> bool,
    {
        let mut specs: Vec<&ToolSpec> = self
            .tools
            .values()
            .map(|t| &t.spec)
            .filter(|s| predicate(s))
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Structural check of `args` against the registered schema. Returns
    /// every violation as `(instance_path, message)`.
    pub fn validate_args(&self, name: &str, args: &Value) -> Option<Vec<(String, String)>> {
        let tool = self.tools.get(name)?;
        match tool.validator.validate(args) {
            Ok(()) => Some(Vec::new()),
            Err(errors) => Some(
                errors
                    .map(|e| (e.instance_path.to_string(), e.to_string()))
                    .collect(),
            ),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
