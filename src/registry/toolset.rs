//! Canonical tool catalog. One spec per tool, fixed at startup; the
//! planner grammar and the validation wall are both derived from these
//! entries.

use serde_json::json;

use super::{RiskTier, SideEffect, ToolSpec};

fn object_schema(properties: serde_json::Value, required: &[&str]) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// The canonical toolset. Names are fixed here: `calculate` (never
/// `calculator`), `recall_memory` (never `memory`).
pub fn default_toolset() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "respond",
            object_schema(
                json!({ "message": { "type": "string", "minLength": 1 } }),
                &["message"],
            ),
            RiskTier::Safe,
            "nonempty_reply",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "get_time",
            object_schema(
                json!({ "format": { "type": "string", "enum": ["friendly", "iso"] } }),
                &[],
            ),
            RiskTier::Safe,
            "time_payload_shape",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "calculate",
            object_schema(
                json!({
                    "expression": {
                        "type": "string",
                        "minLength": 1,
                        "pattern": "^[0-9A-Za-z\\s().+*/^%-]+$"
                    }
                }),
                &["expression"],
            ),
            RiskTier::Safe,
            "numeric_result",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "get_weather",
            object_schema(
                json!({
                    "location": { "type": "string", "minLength": 1 },
                    "units": { "type": "string", "enum": ["metric", "imperial"] }
                }),
                &["location"],
            ),
            RiskTier::Safe,
            "weather_payload_shape",
            SideEffect::Network,
        ),
        ToolSpec::new(
            "remember",
            object_schema(
                json!({ "fact": { "type": "string", "minLength": 1 } }),
                &["fact"],
            ),
            RiskTier::Safe,
            "memory_write_recorded",
            SideEffect::MemoryWrite,
        ),
        ToolSpec::new(
            "recall_memory",
            object_schema(
                json!({ "query": { "type": "string", "minLength": 1 } }),
                &["query"],
            ),
            RiskTier::Safe,
            "nonempty_reply",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "read_file",
            object_schema(
                json!({ "path": { "type": "string", "minLength": 1 } }),
                &["path"],
            ),
            RiskTier::Review,
            "file_read_content",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "list_files",
            object_schema(json!({ "path": { "type": "string" } }), &[]),
            RiskTier::Review,
            "listing_shape",
            SideEffect::ReadOnly,
        ),
        ToolSpec::new(
            "search_web",
            object_schema(
                json!({
                    "query": { "type": "string", "minLength": 1 },
                    "k": { "type": "integer", "minimum": 1, "maximum": 20 }
                }),
                &["query"],
            ),
            RiskTier::Review,
            "http_status_2xx",
            SideEffect::Network,
        ),
        ToolSpec::new(
            "research",
            object_schema(
                json!({ "query": { "type": "string", "minLength": 1 } }),
                &["query"],
            ),
            RiskTier::Review,
            "research_payload_shape",
            SideEffect::Network,
        )
        .with_deadline_ms(120_000),
        ToolSpec::new(
            "write_file",
            object_schema(
                json!({
                    "path": { "type": "string", "minLength": 1 },
                    "content": { "type": "string" }
                }),
                &["path", "content"],
            ),
            RiskTier::Confirm,
            "file_exists_after_write",
            SideEffect::WritesFs,
        ),
        ToolSpec::new(
            "delete_file",
            object_schema(
                json!({ "path": { "type": "string", "minLength": 1 } }),
                &["path"],
            ),
            RiskTier::Confirm,
            "file_absent_after_delete",
            SideEffect::WritesFs,
        ),
        ToolSpec::new(
            "run_command",
            object_schema(
                json!({ "cmd": { "type": "string", "minLength": 1 } }),
                &["cmd"],
            ),
            RiskTier::Confirm,
            "exit_status_zero",
            SideEffect::OsControl,
        ),
        ToolSpec::new(
            "forget_memory",
            object_schema(
                json!({ "query": { "type": "string", "minLength": 1 } }),
                &["query"],
            ),
            RiskTier::OwnerRoot,
            "memory_forget_recorded",
            SideEffect::MemoryWrite,
        ),
    ]
}
