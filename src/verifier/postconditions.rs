//! Fixed table of named post-condition predicates. Tool specs reference
//! these by id, so the checks can evolve without touching tool code.

use serde_json::Value;

use crate::executor::{ExecutionResult, SideEffectRecord};
use crate::planner::ActionPlan;

fn value_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(|s| s.to_string())
}

fn has_string(value: &Value, key: &str) -> bool {
    value_str(value, key).map(|s| !s.is_empty()).unwrap_or(false)
}

fn numeric(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Number(_)) => true,
        Some(Value::String(s)) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// Evaluate the named predicate. `Err` carries the human-readable reason
/// for the failure; an unknown id fails closed.
pub fn evaluate(id: &str, plan: &ActionPlan, result: &ExecutionResult) -> Result<(), String> {
    match id {
        "nonempty_reply" => {
            if result.reply.trim().is_empty() {
                Err("reply text is empty".into())
            } else {
                Ok(())
            }
        }
        "time_payload_shape" => {
            if has_string(&result.value, "time") && has_string(&result.value, "date") {
                Ok(())
            } else {
                Err("payload missing time/date strings".into())
            }
        }
        "numeric_result" => {
            if numeric(&result.value, "result") {
                Ok(())
            } else {
                Err("payload result is not numeric".into())
            }
        }
        "weather_payload_shape" => {
            let ok = has_string(&result.value, "temperature")
                && has_string(&result.value, "condition")
                && has_string(&result.value, "location");
            if ok {
                Ok(())
            } else {
                Err("payload missing temperature/condition/location".into())
            }
        }
        "memory_write_recorded" => {
            if result
                .side_effects
                .iter()
                .any(|e| matches!(e, SideEffectRecord::MemoryWrite { .. }))
            {
                Ok(())
            } else {
                Err("no memory write in side-effect log".into())
            }
        }
        "memory_forget_recorded" => {
            if result
                .side_effects
                .iter()
                .any(|e| matches!(e, SideEffectRecord::MemoryForget { .. }))
            {
                Ok(())
            } else {
                Err("no memory removal in side-effect log".into())
            }
        }
        "file_read_content" => {
            let read_logged = result
                .side_effects
                .iter()
                .any(|e| matches!(e, SideEffectRecord::FileRead { .. }));
            if read_logged && result.value.get("content").and_then(Value::as_str).is_some() {
                Ok(())
            } else {
                Err("no file content returned".into())
            }
        }
        "listing_shape" => {
            if result.value.get("files").and_then(Value::as_array).is_some() {
                Ok(())
            } else {
                Err("payload missing files array".into())
            }
        }
        "http_status_2xx" => {
            let value_ok = result
                .value
                .get("status")
                .and_then(Value::as_u64)
                .map(|s| (200..300).contains(&s))
                .unwrap_or(false);
            let fetch_ok = result.side_effects.iter().any(
                |e| matches!(e, SideEffectRecord::UrlFetched { status, .. } if (200..300).contains(status)),
            );
            if value_ok || fetch_ok {
                Ok(())
            } else {
                Err("no 2xx HTTP status recorded".into())
            }
        }
        "research_payload_shape" => {
            let ok = has_string(&result.value, "answer_text")
                && result.value.get("citations").and_then(Value::as_array).is_some()
                && numeric(&result.value, "confidence");
            if ok {
                Ok(())
            } else {
                Err("payload missing answer_text/citations/confidence".into())
            }
        }
        "file_exists_after_write" => {
            let wanted = plan.arg_str("path").unwrap_or_default();
            if result.side_effects.iter().any(
                |e| matches!(e, SideEffectRecord::FileWrite { path, .. } if path == wanted),
            ) {
                Ok(())
            } else {
                Err(format!("no file creation recorded for '{wanted}'"))
            }
        }
        "file_absent_after_delete" => {
            let wanted = plan.arg_str("path").unwrap_or_default();
            if result.side_effects.iter().any(
                |e| matches!(e, SideEffectRecord::FileDelete { path } if path == wanted),
            ) {
                Ok(())
            } else {
                Err(format!("no deletion recorded for '{wanted}'"))
            }
        }
        "exit_status_zero" => {
            if result.side_effects.iter().any(|e| {
                matches!(e, SideEffectRecord::ProcessSpawned { exit_code: Some(0), .. })
            }) {
                Ok(())
            } else {
                Err("process did not exit cleanly".into())
            }
        }
        other => Err(format!("unknown post-condition '{other}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result_with(value: Value, side_effects: Vec<SideEffectRecord>) -> ExecutionResult {
        ExecutionResult {
            success: true,
            value,
            reply: "ok".into(),
            error: None,
            side_effects,
            duration_ms: 1,
            citations: Vec::new(),
            truncated: false,
            timed_out: false,
        }
    }

    #[test]
    fn weather_shape_passes_and_fails() {
        let plan = ActionPlan::new("get_weather", json!({ "location": "London" }));
        let good = result_with(
            json!({ "location": "London", "temperature": "18°C", "condition": "clear" }),
            vec![],
        );
        assert!(evaluate("weather_payload_shape", &plan, &good).is_ok());

        let bad = result_with(json!({ "location": "London" }), vec![]);
        assert!(evaluate("weather_payload_shape", &plan, &bad).is_err());
    }

    #[test]
    fn numeric_result_accepts_numeric_strings() {
        let plan = ActionPlan::new("calculate", json!({ "expression": "1+1" }));
        let good = result_with(json!({ "result": "1358" }), vec![]);
        assert!(evaluate("numeric_result", &plan, &good).is_ok());
        let bad = result_with(json!({ "result": "lots" }), vec![]);
        assert!(evaluate("numeric_result", &plan, &bad).is_err());
    }

    #[test]
    fn file_write_matches_planned_path() {
        let plan = ActionPlan::new("write_file", json!({ "path": "notes/a.txt", "content": "x" }));
        let good = result_with(
            json!({}),
            vec![SideEffectRecord::FileWrite { path: "notes/a.txt".into(), bytes: 1 }],
        );
        assert!(evaluate("file_exists_after_write", &plan, &good).is_ok());

        let wrong = result_with(
            json!({}),
            vec![SideEffectRecord::FileWrite { path: "other.txt".into(), bytes: 1 }],
        );
        assert!(evaluate("file_exists_after_write", &plan, &wrong).is_err());
    }

    #[test]
    fn unknown_id_fails_closed() {
        let plan = ActionPlan::new("respond", json!({ "message": "hi" }));
        let result = result_with(json!({}), vec![]);
        assert!(evaluate("definitely_not_a_predicate", &plan, &result).is_err());
    }
}
