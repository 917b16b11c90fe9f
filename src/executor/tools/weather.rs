use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{arg_str, ToolHandler};
use crate::executor::context::ExecutionContext;
use crate::executor::{ExecError, ToolOutput};
use crate::registry::Capability;

const CONDITIONS: &[&str] = &["clear", "partly cloudy", "overcast", "light rain", "windy"];

/// Deterministic forecast provider. A real deployment swaps in an HTTP
/// provider behind the same handler; the payload shape is the contract
/// the verifier checks.
pub struct WeatherTool;

#[async_trait]
impl ToolHandler for WeatherTool {
    async fn run(&self, args: &Value, ctx: &ExecutionContext) -> Result<ToolOutput, ExecError> {
        ctx.require(Capability::Network)?;
        let location = arg_str(args, "location")?;
        let imperial = args.get("units").and_then(Value::as_str) == Some("imperial");

        let mut hasher = DefaultHasher::new();
        location.to_lowercase().hash(&mut hasher);
        let seed = hasher.finish();

        let celsius = 5 + (seed % 22) as i64;
        let temperature = if imperial {
            format!("{}°F", celsius * 9 / 5 + 32)
        } else {
            format!("{celsius}°C")
        };
        let condition = CONDITIONS[(seed / 7 % CONDITIONS.len() as u64) as usize];
        let reply = format!("Weather in {location}: {temperature}, {condition}.");

        Ok(ToolOutput {
            value: json!({
                "location": location,
                "temperature": temperature,
                "condition": condition,
            }),
            reply,
            ..ToolOutput::default()
        })
    }
}
