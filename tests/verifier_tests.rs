//! Verifier behavior: post-condition severities, coverage policy,
//! entailment floor boundary and degraded mode.


use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use cortex::config::VerifierConfig;
use cortex::executor::{ExecutionResult, SideEffectRecord};
use cortex::planner::ActionPlan;
use cortex::registry::{toolset::default_toolset, ToolSpec};
use cortex::services::entailment::{EntailmentModel, KeywordEntailment, OfflineEntailment};
use cortex::services::ServiceError;
use cortex::verifier::{
    CitationStore, InMemoryCitationStore, ReasonCode, VerdictStatus, Verifier,
};

fn spec_for(name: &str) -> ToolSpec {
    default_toolset().into_iter().find(|s| s.name == name).unwrap()
}

fn ok_result(value: serde_json::Value, reply: &str) -> ExecutionResult {
    ExecutionResult {
        success: true,
        value,
        reply: reply.to_string(),
        error: None,
        side_effects: Vec::new(),
        duration_ms: 3,
        citations: Vec::new(),
        truncated: false,
        timed_out: false,
    }
}

fn verifier_with(
    entailment: Arc<dyn EntailmentModel>,
) -> (Verifier, Arc<dyn CitationStore>) {
    let store: Arc<dyn CitationStore> = Arc::new(InMemoryCitationStore::new());
    (
        Verifier::new(entailment, store.clone(), VerifierConfig::default()),
        store,
    )
}

#[tokio::test]
async fn failed_execution_blocks() {
    let (verifier, _) = verifier_with(Arc::new(KeywordEntailment));
    let plan = ActionPlan::new("get_weather", json!({ "location": "London" }));
    let mut result = ok_result(json!({}), "");
    result.success = false;
    result.error = Some(cortex::executor::ExecErrorInfo {
        kind: "timeout".into(),
        message: "execution deadline exceeded".into(),
    });

    let verdict = verifier.check(&spec_for("get_weather"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Block);
    assert!(matches!(verdict.reasons[0], ReasonCode::ExecutionFailed { .. }));
}

#[tokio::test]
async fn post_condition_failure_warns_for_safe_tools() {
    let (verifier, _) = verifier_with(Arc::new(KeywordEntailment));
    let plan = ActionPlan::new("get_weather", json!({ "location": "London" }));
    // Shape is wrong: condition missing.
    let result = ok_result(
        json!({ "location": "London", "temperature": "18°C" }),
        "Weather in London.",
    );

    let verdict = verifier.check(&spec_for("get_weather"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Warn);
    assert!(matches!(
        verdict.reasons[0],
        ReasonCode::PostConditionFailed { .. }
    ));
}

#[tokio::test]
async fn post_condition_failure_blocks_for_review_tools() {
    let (verifier, _) = verifier_with(Arc::new(KeywordEntailment));
    let plan = ActionPlan::new("read_file", json!({ "path": "notes.txt" }));
    // No FileRead side effect, no content.
    let result = ok_result(json!({}), "something");

    let verdict = verifier.check(&spec_for("read_file"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Block);
}

#[tokio::test]
async fn uncited_research_claims_block() {
    let (verifier, store) = verifier_with(Arc::new(KeywordEntailment));
    let plan = ActionPlan::new("research", json!({ "query": "chips" }));

    let citation = store.put("doc://x", (0, 9), b"cats sleep all day in the sunshine");
    let mut result = ok_result(
        json!({
            "answer_text": "Quantum chips shipped in record volume last winter.",
            "citations": [],
            "confidence": 0.9,
        }),
        "Quantum chips shipped in record volume last winter.",
    );
    result.citations = vec![citation];

    let verdict = verifier.check(&spec_for("research"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Block);
    assert!(matches!(
        verdict.reasons[0],
        ReasonCode::CoverageBelowBlock { .. }
    ));
}

#[tokio::test]
async fn partially_supported_research_warns() {
    let (verifier, store) = verifier_with(Arc::new(KeywordEntailment));
    let plan = ActionPlan::new("research", json!({ "query": "cats" }));

    let supported = "Cats sleep all day in the sunshine.";
    let citation = store.put("doc://cats", (0, supported.len()), supported.as_bytes());
    let reply = format!("{supported} Dogs invented the telephone last year.");
    let mut result = ok_result(
        json!({ "answer_text": reply.clone(), "citations": [1], "confidence": 0.7 }),
        &reply,
    );
    result.citations = vec![citation];

    let verdict = verifier.check(&spec_for("research"), &plan, &result).await;
    // Coverage 0.5 sits exactly at the block floor, inside the warn band.
    assert_eq!(verdict.status, VerdictStatus::Warn);
    assert!(matches!(
        verdict.reasons[0],
        ReasonCode::CoverageBelowWarn { .. }
    ));
    assert_eq!(verdict.evidence.len(), 1);
}

#[tokio::test]
async fn degraded_entailment_warns_never_passes_silently() {
    let (verifier, store) = verifier_with(Arc::new(OfflineEntailment));
    let plan = ActionPlan::new("research", json!({ "query": "anything" }));

    let text = "Tokio is an async runtime for Rust.";
    let citation = store.put("doc://rust", (0, text.len()), text.as_bytes());
    let mut result = ok_result(
        json!({ "answer_text": text, "citations": [1], "confidence": 0.9 }),
        text,
    );
    result.citations = vec![citation];

    let verdict = verifier.check(&spec_for("research"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Warn);
    assert!(verdict.reasons.contains(&ReasonCode::VerifierDegraded));
}

/// Entailment model returning one fixed score for every pair.
struct ConstEntailment(f32);

#[async_trait]
impl EntailmentModel for ConstEntailment {
    async fn score_batch(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<f32>, ServiceError> {
        Ok(vec![self.0; pairs.len()])
    }
}

#[tokio::test]
async fn entailment_floor_is_inclusive() {
    let plan = ActionPlan::new("research", json!({ "query": "floor" }));
    let text = "A single factual sentence about something.";

    // Exactly at the floor: supported, full coverage, pass.
    let (at_floor, store) = verifier_with(Arc::new(ConstEntailment(0.6)));
    let citation = store.put("doc://floor", (0, text.len()), text.as_bytes());
    let mut result = ok_result(
        json!({ "answer_text": text, "citations": [1], "confidence": 0.8 }),
        text,
    );
    result.citations = vec![citation.clone()];
    let verdict = at_floor.check(&spec_for("research"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Pass);

    // Just below: unsupported, coverage zero, block.
    let (below, store_b) = verifier_with(Arc::new(ConstEntailment(0.5999)));
    let citation_b = store_b.put("doc://floor", (0, text.len()), text.as_bytes());
    let mut result_b = ok_result(
        json!({ "answer_text": text, "citations": [1], "confidence": 0.8 }),
        text,
    );
    result_b.citations = vec![citation_b];
    let verdict_b = below.check(&spec_for("research"), &plan, &result_b).await;
    assert_eq!(verdict_b.status, VerdictStatus::Block);
}

#[tokio::test]
async fn tools_without_citations_skip_claim_checks() {
    let (verifier, _) = verifier_with(Arc::new(OfflineEntailment));
    let plan = ActionPlan::new("calculate", json!({ "expression": "2+2" }));
    let result = ok_result(json!({ "expression": "2+2", "result": "4" }), "2+2 = 4");

    // Even with entailment offline, a non-textual tool passes cleanly.
    let verdict = verifier.check(&spec_for("calculate"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Pass);
    assert!(verdict.reasons.is_empty());
}

#[tokio::test]
async fn write_postcondition_checks_the_planned_path() {
    let (verifier, _) = verifier_with(Arc::new(KeywordEntailment));
    let plan = ActionPlan::new(
        "write_file",
        json!({ "path": "notes/a.txt", "content": "hi" }),
    );
    let mut result = ok_result(json!({ "path": "notes/a.txt", "bytes": 2 }), "Wrote 2 bytes.");
    result.side_effects = vec![SideEffectRecord::FileWrite {
        path: "notes/a.txt".into(),
        bytes: 2,
    }];

    let verdict = verifier.check(&spec_for("write_file"), &plan, &result).await;
    assert_eq!(verdict.status, VerdictStatus::Pass);
}
