pub mod citations;
pub mod claims;
pub mod postconditions;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::config::VerifierConfig;
use crate::executor::ExecutionResult;
use crate::planner::ActionPlan;
use crate::registry::{RiskTier, ToolSpec};
use crate::services::entailment::EntailmentModel;

pub use citations::{CitationRef, CitationStore, InMemoryCitationStore};
pub use claims::Claim;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Pass,
    Warn,
    Block,
}

impl VerdictStatus {
    fn worst(self, other: VerdictStatus) -> VerdictStatus {
        use VerdictStatus::*;
        match (self, other) {
            (Block, _) | (_, Block) => Block,
            (Warn, _) | (_, Warn) => Warn,
            _ => Pass,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Pass => "pass",
            VerdictStatus::Warn => "warn",
            VerdictStatus::Block => "block",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ReasonCode {
    ExecutionFailed { kind: String },
    PostConditionFailed { id: String, detail: String },
    CoverageBelowBlock { coverage: f32 },
    CoverageBelowWarn { coverage: f32 },
    VerifierDegraded,
}

impl ReasonCode {
    /// Short human phrasing for reply caveats. Internal codes never leak
    /// verbatim.
    pub fn human(&self) -> String {
        match self {
            ReasonCode::ExecutionFailed { .. } => "the action did not complete".into(),
            ReasonCode::PostConditionFailed { .. } => {
                "the result did not check out as expected".into()
            }
            ReasonCode::CoverageBelowBlock { .. } => {
                "I could not back most of that with sources".into()
            }
            ReasonCode::CoverageBelowWarn { .. } => {
                "parts of that are not fully backed by sources".into()
            }
            ReasonCode::VerifierDegraded => "I could not fully verify that right now".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub reasons: Vec<ReasonCode>,
    pub evidence: Vec<CitationRef>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self { status: VerdictStatus::Pass, reasons: Vec::new(), evidence: Vec::new() }
    }
}

/// Tools whose replies carry factual claims subject to coverage policy.
fn coverage_policy_applies(tool: &str) -> bool {
    matches!(tool, "research" | "search_web")
}

/// Post-execution gatekeeper: tool-specific post-conditions plus claim
/// entailment for textual tools.
pub struct Verifier {
    entailment: Arc<dyn EntailmentModel>,
    citations: Arc<dyn CitationStore>,
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(
        entailment: Arc<dyn EntailmentModel>,
        citations: Arc<dyn CitationStore>,
        config: VerifierConfig,
    ) -> Self {
        Self { entailment, citations, config }
    }

    pub async fn check(
        &self,
        spec: &ToolSpec,
        plan: &ActionPlan,
        result: &ExecutionResult,
    ) -> Verdict {
        if !result.success {
            let kind = result
                .error
                .as_ref()
                .map(|e| e.kind.clone())
                .unwrap_or_else(|| "unknown".into());
            return Verdict {
                status: VerdictStatus::Block,
                reasons: vec![ReasonCode::ExecutionFailed { kind }],
                evidence: Vec::new(),
            };
        }

        let mut status = VerdictStatus::Pass;
        let mut reasons = Vec::new();
        let mut evidence = Vec::new();

        // Post-condition predicate: block for review and above, warn for
        // safe tools.
        if let Err(detail) = postconditions::evaluate(&spec.post_condition, plan, result) {
            let severity = if spec.risk >= RiskTier::Review {
                VerdictStatus::Block
            } else {
                VerdictStatus::Warn
            };
            status = status.worst(severity);
            reasons.push(ReasonCode::PostConditionFailed {
                id: spec.post_condition.clone(),
                detail,
            });
        }

        // Claim entailment for tools that produced citations.
        if !result.citations.is_empty() {
            let claims = claims::extract_claims(&result.reply);
            if !claims.is_empty() {
                let report = claims::verify_claims(
                    &claims,
                    &result.citations,
                    &self.citations,
                    &self.entailment,
                    &self.config,
                )
                .await;

                if report.degraded {
                    status = status.worst(VerdictStatus::Warn);
                    reasons.push(ReasonCode::VerifierDegraded);
                } else if coverage_policy_applies(&spec.name) {
                    if report.coverage < self.config.coverage_block {
                        status = status.worst(VerdictStatus::Block);
                        reasons.push(ReasonCode::CoverageBelowBlock { coverage: report.coverage });
                    } else if report.coverage < self.config.coverage_warn {
                        status = status.worst(VerdictStatus::Warn);
                        reasons.push(ReasonCode::CoverageBelowWarn { coverage: report.coverage });
                    }
                } else if report.coverage < self.config.coverage_warn {
                    status = status.worst(VerdictStatus::Warn);
                    reasons.push(ReasonCode::CoverageBelowWarn { coverage: report.coverage });
                }
                evidence = report.evidence;
            }
        }

        debug!(tool = %spec.name, status = status.as_str(), "verification complete");
        Verdict { status, reasons, evidence }
    }
}
