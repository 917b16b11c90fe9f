use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::ExecutionResult;
use crate::memory::ContextBundle;
use crate::planner::ActionPlan;
use crate::verifier::Verdict;

/// One completed interaction, as persisted into memory and surfaced to
/// the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Monotonic per-user sequence number.
    pub seq: u64,
    pub id: Uuid,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub utterance: String,
    pub context: ContextBundle,
    pub plan: Option<ActionPlan>,
    pub result: Option<ExecutionResult>,
    pub verdict: Option<Verdict>,
    pub reply: String,
    pub success: bool,
}

/// What the caller of `handle_turn` gets back.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub verdict: Option<Verdict>,
    pub result_summary: Option<String>,
    /// Context assembly ran in recent-only mode.
    pub degraded: bool,
    /// Present when the turn suspended awaiting a confirmation (or owner)
    /// token; the next inbound turn must carry it.
    pub pending_token: Option<String>,
}
