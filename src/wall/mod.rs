pub mod audit;
pub mod lint;
pub mod policy;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::WallConfig;
use crate::planner::ActionPlan;
use crate::registry::{RiskTier, ToolRegistry};

pub use audit::{AuditKind, AuditLog, AuditRecord, TierOutcome};
use policy::RateState;

/// Which tier produced a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallTier {
    Schema,
    Policy,
    Lint,
    Audit,
}

impl WallTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            WallTier::Schema => "schema",
            WallTier::Policy => "policy",
            WallTier::Lint => "lint",
            WallTier::Audit => "audit",
        }
    }
}

/// Final wall decision. `NeedsConfirmation` and `NeedsOwnerAuth` are
/// outcomes, not errors: the turn suspends rather than fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WallVerdict {
    Approved,
    NeedsConfirmation { reason: String },
    NeedsOwnerAuth,
    Rejected { tier: WallTier, code: String, detail: String },
}

impl WallVerdict {
    pub fn decision_label(&self) -> String {
        match self {
            WallVerdict::Approved => "approved".into(),
            WallVerdict::NeedsConfirmation { .. } => "needs_confirmation".into(),
            WallVerdict::NeedsOwnerAuth => "needs_owner_auth".into(),
            WallVerdict::Rejected { tier, code, .. } => {
                format!("rejected:{}:{}", tier.as_str(), code)
            }
        }
    }
}

/// Authorization carried by the inbound turn: an affirmative confirmation
/// token and/or a pre-authenticated owner token, both resolved by the
/// orchestrator before evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnAuth {
    pub confirmed: bool,
    pub owner: bool,
}

#[derive(Debug, Clone)]
pub struct WallDecision {
    pub verdict: WallVerdict,
    pub tiers: Vec<TierOutcome>,
}

#[derive(Debug, Error)]
pub enum WallError {
    #[error("audit write failed: {0}")]
    AuditFailure(String),
}

/// Five sequential tiers between the planner and the executor. Any
/// rejection short-circuits later tiers; the audit record always captures
/// which tier decided and why. The only mutable state is the per-user
/// rate buckets.
pub struct ValidationWall {
    registry: Arc<ToolRegistry>,
    config: WallConfig,
    rates: StdMutex<RateState>,
    audit: Arc<AuditLog>,
}

impl ValidationWall {
    pub fn new(registry: Arc<ToolRegistry>, config: WallConfig, audit: Arc<AuditLog>) -> Self {
        Self {
            registry,
            config,
            rates: StdMutex::new(RateState::default()),
            audit,
        }
    }

    pub fn audit_log(&self) -> Arc<AuditLog> {
        self.audit.clone()
    }

    pub async fn evaluate(
        &self,
        user_id: &str,
        turn_id: Uuid,
        plan: &ActionPlan,
        auth: TurnAuth,
        now: Instant,
    ) -> Result<WallDecision, WallError> {
        let mut tiers: Vec<TierOutcome> = Vec::with_capacity(5);
        let verdict = self.run_tiers(user_id, plan, auth, now, &mut tiers);

        if verdict == WallVerdict::Approved {
            if let Some(spec) = self.registry.lookup(&plan.tool_name) {
                let mut rates = self.rates.lock().unwrap_or_else(|p| p.into_inner());
                let limit = self.config.rate_limit_for(spec.rate_class);
                rates.bucket(user_id, spec.rate_class, limit, now).take(now);
            }
        }

        let record = AuditRecord {
            ts: chrono::Utc::now(),
            turn_id,
            user_id: user_id.to_string(),
            kind: AuditKind::Decision,
            tool: plan.tool_name.clone(),
            args_digest: audit::digest_value(&plan.args),
            args: Some(audit::redact(&plan.args)),
            wall_tiers: tiers.clone(),
            decision: Some(verdict.decision_label()),
            result_summary: None,
            verdict: None,
            reply_digest: None,
        };
        self.audit.append(&record).await?;

        debug!(user = user_id, tool = %plan.tool_name, decision = %verdict.decision_label(), "wall evaluated");
        Ok(WallDecision { verdict, tiers })
    }

    fn run_tiers(
        &self,
        user_id: &str,
        plan: &ActionPlan,
        auth: TurnAuth,
        now: Instant,
        tiers: &mut Vec<TierOutcome>,
    ) -> WallVerdict {
        // Tier 1: schema. The grammar should have enforced this; it is
        // re-checked against the registry regardless.
        let spec = match self.registry.lookup(&plan.tool_name) {
            Some(spec) => spec,
            None => {
                tiers.push(reject_outcome(WallTier::Schema, "unknown_tool"));
                return WallVerdict::Rejected {
                    tier: WallTier::Schema,
                    code: "unknown_tool".into(),
                    detail: format!("tool '{}' is not registered", plan.tool_name),
                };
            }
        };
        match self.registry.validate_args(&plan.tool_name, &plan.args) {
            Some(violations) if violations.is_empty() => {
                tiers.push(pass_outcome(WallTier::Schema));
            }
            Some(violations) => {
                let (path, message) = violations[0].clone();
                tiers.push(reject_outcome(WallTier::Schema, "schema_violation"));
                return WallVerdict::Rejected {
                    tier: WallTier::Schema,
                    code: "schema_violation".into(),
                    detail: format!("args{path}: {message}"),
                };
            }
            None => unreachable!("lookup succeeded above"),
        }

        // Tier 2: policy. The rate bucket is peeked here and debited only
        // on final approval, so prompts and rejections cost nothing.
        let within_rate = {
            let mut rates = self.rates.lock().unwrap_or_else(|p| p.into_inner());
            let limit = self.config.rate_limit_for(spec.rate_class);
            rates
                .bucket(user_id, spec.rate_class, limit, now)
                .would_allow(now)
        };
        if !within_rate {
            tiers.push(reject_outcome(WallTier::Policy, "rate_limited"));
            return WallVerdict::Rejected {
                tier: WallTier::Policy,
                code: "rate_limited".into(),
                detail: format!(
                    "rate limit for {} tools exceeded for user '{user_id}'",
                    spec.rate_class.as_str()
                ),
            };
        }
        if let Some((rule, detail)) = policy::check_policies(&self.config, spec, plan) {
            tiers.push(reject_outcome(WallTier::Policy, &rule));
            return WallVerdict::Rejected {
                tier: WallTier::Policy,
                code: rule,
                detail,
            };
        }
        tiers.push(pass_outcome(WallTier::Policy));

        // Tier 3: static analysis of code-like arguments.
        if let Some((pattern, detail)) = lint::lint_plan(plan, &self.config.fs_root) {
            tiers.push(reject_outcome(WallTier::Lint, &pattern));
            return WallVerdict::Rejected {
                tier: WallTier::Lint,
                code: pattern,
                detail,
            };
        }
        tiers.push(pass_outcome(WallTier::Lint));

        // Tier 4: audit decision by risk tier.
        match spec.risk {
            RiskTier::Safe => {
                tiers.push(pass_outcome(WallTier::Audit));
                WallVerdict::Approved
            }
            RiskTier::Review => {
                info!(
                    tool = %spec.name,
                    args = %audit::redact(&plan.args),
                    "dry-run preview for review-tier tool"
                );
                tiers.push(TierOutcome {
                    tier: WallTier::Audit.as_str().into(),
                    outcome: "pass".into(),
                    code: Some("dry_run_preview".into()),
                });
                WallVerdict::Approved
            }
            RiskTier::Confirm => {
                if auth.confirmed {
                    tiers.push(pass_outcome(WallTier::Audit));
                    WallVerdict::Approved
                } else {
                    tiers.push(TierOutcome {
                        tier: WallTier::Audit.as_str().into(),
                        outcome: "needs_confirmation".into(),
                        code: None,
                    });
                    WallVerdict::NeedsConfirmation {
                        reason: format!("'{}' requires an explicit confirmation", spec.name),
                    }
                }
            }
            RiskTier::OwnerRoot => {
                if auth.owner && auth.confirmed {
                    tiers.push(pass_outcome(WallTier::Audit));
                    WallVerdict::Approved
                } else {
                    tiers.push(TierOutcome {
                        tier: WallTier::Audit.as_str().into(),
                        outcome: "needs_owner_auth".into(),
                        code: None,
                    });
                    WallVerdict::NeedsOwnerAuth
                }
            }
        }
    }
}

fn pass_outcome(tier: WallTier) -> TierOutcome {
    TierOutcome {
        tier: tier.as_str().into(),
        outcome: "pass".into(),
        code: None,
    }
}

fn reject_outcome(tier: WallTier, code: &str) -> TierOutcome {
    TierOutcome {
        tier: tier.as_str().into(),
        outcome: "reject".into(),
        code: Some(code.to_string()),
    }
}
