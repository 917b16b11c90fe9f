//! Tool-call grammar. The root production is the `ActionPlan` wire object;
//! the leaves are each registered tool's argument schema. Regenerated from
//! the registry at startup, after all registrations, so ordering of
//! `register` calls does not matter.

use serde_json::{json, Value};

use crate::registry::ToolRegistry;

/// One JSON Schema document constraining the model to emit a single
/// well-formed tool call. Implementations without grammar support ignore
/// it and rely on parse-and-retry.
pub fn grammar_from_registry(registry: &ToolRegistry) -> Value {
    let variants: Vec<Value> = registry
        .list(|_| true)
        .into_iter()
        .map(|spec| {
            json!({
                "type": "object",
                "properties": {
                    "tool": { "const": spec.name.clone() },
                    "args": spec.args_schema.clone(),
                    "meta": {
                        "type": "object",
                        "properties": {
                            "risk": {
                                "type": "string",
                                "enum": ["safe", "review", "confirm", "owner_root"]
                            },
                            "reasoning": { "type": "string" },
                            "citations": {
                                "type": "array",
                                "items": { "type": "string" }
                            }
                        },
                        "additionalProperties": false
                    }
                },
                "required": ["tool", "args"],
                "additionalProperties": false
            })
        })
        .collect();

    json!({ "oneOf": variants })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::toolset::default_toolset;
    use crate::registry::ToolRegistry;

    #[test]
    fn grammar_has_one_variant_per_tool() {
        let mut reg = ToolRegistry::new();
        for spec in default_toolset() {
            reg.register(spec).unwrap();
        }
        let grammar = grammar_from_registry(&reg);
        let variants = grammar["oneOf"].as_array().unwrap();
        assert_eq!(variants.len(), reg.names().len());
        assert!(variants
            .iter()
            .any(|v| v["properties"]["tool"]["const"] == "get_weather"));
    }
}
