//! Deterministic keyword/regex planner. Serves as the fallback when the
//! model strategy is unavailable, as the offline mode, and as ground truth
//! in tests. Pattern order is significant: recall phrases must win over
//! memory-write phrases, and explicit research beats plain search.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;
use tokio::time::Instant;

use crate::memory::ContextBundle;

use super::types::{ActionPlan, PlanMeta, PlanningError};
use super::PlanStrategy;

static RECALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(what do you remember|do you remember|what did i|who am i|what(?:'| i)?s my name|remember about|recall)\b",
    )
    .unwrap()
});
static FORGET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bforget\s+(?:about\s+)?(.+)").unwrap());
static REMEMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(my name is|remember (?:that|this)|call me|note that)\b").unwrap()
});
static WEATHER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(weather|temperature|forecast)\b").unwrap());
static WEATHER_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:weather|temperature|forecast)\s+(?:in|for|at)\s+([A-Za-z][A-Za-z .'-]*)")
        .unwrap()
});
static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)?(?:\s*[-+*/^%]\s*\(?\s*\d+(?:\.\d+)?\s*\)?)+").unwrap()
});
static TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(time|date|clock)\b").unwrap());
static RESEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(research|investigate|deep dive)\b").unwrap());
static SEARCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(search|look up|google)\b").unwrap());
static SEARCH_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:search for|look up|google|search)\s+(.+)").unwrap()
});
static LIST_FILES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:list|show)(?: the| my)? files\b").unwrap());
static READ_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bread (?:the )?file\s+(\S+)").unwrap());
static DELETE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bdelete (?:the )?file\s+(\S+)").unwrap());
static WRITE_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwrite\s+(.+?)\s+(?:to|into) (?:the )?file\s+(\S+)").unwrap()
});
static RUN_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:run|execute)(?: the)? command\s+(.+)").unwrap());

fn trim_terminal(text: &str) -> String {
    text.trim()
        .trim_end_matches(&['.', '!', '?', ','][..])
        .trim()
        .to_string()
}

fn with_reason(mut plan: ActionPlan, rule: &str) -> ActionPlan {
    plan.meta = PlanMeta {
        reasoning: Some(format!("rule:{rule}")),
        ..PlanMeta::default()
    };
    plan
}

/// Classify one utterance into a tool call. Total: every utterance maps to
/// something, with `respond` as the conversational default.
pub fn classify(utterance: &str) -> ActionPlan {
    let text = utterance.trim();

    if RECALL.is_match(text) {
        return with_reason(
            ActionPlan::new("recall_memory", json!({ "query": text })),
            "recall",
        );
    }
    if let Some(caps) = FORGET.captures(text) {
        return with_reason(
            ActionPlan::new("forget_memory", json!({ "query": trim_terminal(&caps[1]) })),
            "forget",
        );
    }
    if REMEMBER.is_match(text) {
        return with_reason(ActionPlan::new("remember", json!({ "fact": text })), "remember");
    }
    if WEATHER.is_match(text) {
        let location = WEATHER_LOCATION
            .captures(text)
            .map(|caps| trim_terminal(&caps[1]))
            .unwrap_or_else(|| "current location".to_string());
        return with_reason(
            ActionPlan::new("get_weather", json!({ "location": location, "units": "metric" })),
            "weather",
        );
    }
    if let Some(m) = EXPRESSION.find(text) {
        return with_reason(
            ActionPlan::new("calculate", json!({ "expression": m.as_str().trim() })),
            "calculate",
        );
    }
    if TIME.is_match(text) {
        return with_reason(
            ActionPlan::new("get_time", json!({ "format": "friendly" })),
            "time",
        );
    }
    if RESEARCH.is_match(text) {
        return with_reason(
            ActionPlan::new("research", json!({ "query": trim_terminal(text) })),
            "research",
        );
    }
    if SEARCH.is_match(text) {
        let query = SEARCH_QUERY
            .captures(text)
            .map(|caps| trim_terminal(&caps[1]))
            .unwrap_or_else(|| trim_terminal(text));
        return with_reason(
            ActionPlan::new("search_web", json!({ "query": query, "k": 5 })),
            "search",
        );
    }
    if let Some(caps) = WRITE_FILE.captures(text) {
        return with_reason(
            ActionPlan::new(
                "write_file",
                json!({ "path": caps[2].to_string(), "content": caps[1].to_string() }),
            ),
            "write_file",
        );
    }
    if let Some(caps) = READ_FILE.captures(text) {
        return with_reason(
            ActionPlan::new("read_file", json!({ "path": trim_terminal(&caps[1]) })),
            "read_file",
        );
    }
    if let Some(caps) = DELETE_FILE.captures(text) {
        return with_reason(
            ActionPlan::new("delete_file", json!({ "path": trim_terminal(&caps[1]) })),
            "delete_file",
        );
    }
    if LIST_FILES.is_match(text) {
        return with_reason(ActionPlan::new("list_files", json!({ "path": "." })), "list_files");
    }
    if let Some(caps) = RUN_COMMAND.captures(text) {
        return with_reason(
            ActionPlan::new("run_command", json!({ "cmd": trim_terminal(&caps[1]) })),
            "run_command",
        );
    }

    with_reason(
        ActionPlan::new("respond", json!({ "message": text.to_string() })),
        "respond",
    )
}

pub struct RulePlanner;

#[async_trait]
impl PlanStrategy for RulePlanner {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn plan(
        &self,
        utterance: &str,
        _context: &ContextBundle,
        _deadline: Instant,
    ) -> Result<ActionPlan, PlanningError> {
        if utterance.trim().is_empty() {
            return Err(PlanningError::Failure("empty utterance".into()));
        }
        Ok(classify(utterance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_extracts_location() {
        let plan = classify("Weather in London.");
        assert_eq!(plan.tool_name, "get_weather");
        assert_eq!(plan.arg_str("location"), Some("London"));
    }

    #[test]
    fn calculation_extracts_expression() {
        let plan = classify("Calculate 25 * 47 + 183.");
        assert_eq!(plan.tool_name, "calculate");
        assert_eq!(plan.arg_str("expression"), Some("25 * 47 + 183"));
    }

    #[test]
    fn recall_wins_over_memory_write() {
        let plan = classify("What do you remember about me?");
        assert_eq!(plan.tool_name, "recall_memory");
    }

    #[test]
    fn introduction_is_a_memory_write() {
        let plan = classify("My name is Alex and I am a software developer.");
        assert_eq!(plan.tool_name, "remember");
    }

    #[test]
    fn file_deletion_extracts_path() {
        let plan = classify("delete file /etc/passwd");
        assert_eq!(plan.tool_name, "delete_file");
        assert_eq!(plan.arg_str("path"), Some("/etc/passwd"));
    }

    #[test]
    fn unmatched_input_falls_back_to_respond() {
        let plan = classify("hello there");
        assert_eq!(plan.tool_name, "respond");
    }
}
