use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::executor::{ExecutionResult, SandboxExecutor, ToolDeps};
use crate::memory::{CommitRequest, ContextBundle, MemoryService};
use crate::planner::{ActionPlan, Planner, PlanningError};
use crate::registry::{RiskTier, ToolRegistry};
use crate::services::embedding::HashEmbedder;
use crate::services::entailment::KeywordEntailment;
use crate::verifier::{VerdictStatus, Verifier};
use crate::wall::{AuditKind, AuditRecord, TurnAuth, ValidationWall, WallVerdict};

use super::cancel::CancelHandle;
use super::turn::{Turn, TurnOutcome};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("turn cancelled")]
    Cancelled,
}

/// A confirm- or owner-tier plan parked until the next inbound turn
/// brings its token. Only a marker is kept; no full Turn is committed.
#[derive(Debug, Clone)]
struct PendingConfirmation {
    plan: ActionPlan,
    utterance: String,
    context: ContextBundle,
    token: String,
    requires_owner: bool,
}

/// Sequences one turn end to end: context, plan, wall, execute, verify,
/// reply, commit. Collaborators are injected; there is no module-level
/// state. Per-user locks make each user's turns totally ordered while
/// users progress independently.
pub struct Pipeline {
    config: Config,
    registry: Arc<ToolRegistry>,
    memory: Arc<MemoryService>,
    planner: Planner,
    wall: ValidationWall,
    executor: SandboxExecutor,
    verifier: Verifier,
    owner_secret: Option<String>,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    pending: Mutex<HashMap<String, PendingConfirmation>>,
    seqs: Mutex<HashMap<String, u64>>,
    /// Global cap on turns in flight across all users.
    turn_permits: tokio::sync::Semaphore,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        registry: Arc<ToolRegistry>,
        memory: Arc<MemoryService>,
        planner: Planner,
        wall: ValidationWall,
        executor: SandboxExecutor,
        verifier: Verifier,
        owner_secret: Option<String>,
    ) -> Self {
        let turn_permits =
            tokio::sync::Semaphore::new(config.executor.global_parallelism.max(1));
        Self {
            config,
            registry,
            memory,
            planner,
            wall,
            executor,
            verifier,
            owner_secret,
            user_locks: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            seqs: Mutex::new(HashMap::new()),
            turn_permits,
        }
    }

    /// Fully offline pipeline: rule-based planning, hash embeddings,
    /// keyword entailment, in-process memory, built-in corpus. The shape
    /// used by the REPL driver and most tests.
    pub fn offline(config: Config) -> Self {
        use crate::executor::tools::research::default_corpus;
        use crate::memory::InProcessBackend;
        use crate::verifier::InMemoryCitationStore;

        let mut registry = ToolRegistry::new();
        for spec in crate::registry::toolset::default_toolset() {
            // The canonical set registers cleanly by construction.
            registry.register(spec).expect("canonical toolset registers");
        }
        let registry = Arc::new(registry);

        let memory = Arc::new(MemoryService::new(
            Arc::new(InProcessBackend::new()),
            Arc::new(HashEmbedder::default()),
            config.memory.clone(),
        ));

        let citations: Arc<dyn crate::verifier::CitationStore> =
            Arc::new(InMemoryCitationStore::new());
        let deps = ToolDeps {
            memory: Some(memory.clone()),
            citations: citations.clone(),
            model: None,
            corpus: Arc::new(default_corpus()),
            fs_root: config.wall.fs_root.clone(),
        };

        let audit = Arc::new(crate::wall::AuditLog::new(
            config.audit.path.clone(),
            config.audit.rotate_bytes,
        ));
        let wall = ValidationWall::new(registry.clone(), config.wall.clone(), audit);
        let executor = SandboxExecutor::new(registry.clone(), config.executor.clone(), deps);
        let verifier = Verifier::new(
            Arc::new(KeywordEntailment),
            citations,
            config.verifier.clone(),
        );
        let planner = Planner::rule_based(registry.clone());

        Self::new(config, registry, memory, planner, wall, executor, verifier, None)
    }

    pub fn with_owner_secret(mut self, secret: &str) -> Self {
        self.owner_secret = Some(secret.to_string());
        self
    }

    pub fn memory(&self) -> Arc<MemoryService> {
        self.memory.clone()
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.registry.clone()
    }

    pub fn audit_log(&self) -> Arc<crate::wall::AuditLog> {
        self.wall.audit_log()
    }

    /// Administrative surface: rotate the audit log now.
    pub async fn rotate_audit_log(&self) -> Result<(), crate::wall::WallError> {
        self.wall.audit_log().rotate().await
    }

    pub async fn handle_turn(
        &self,
        user_id: &str,
        utterance: &str,
        confirmation_token: Option<&str>,
    ) -> Result<TurnOutcome, PipelineError> {
        self.handle_turn_cancellable(user_id, utterance, confirmation_token, CancelHandle::new())
            .await
    }

    /// Full-control entry point: cancellation handle supplied by the
    /// caller (audio frontend barge-in, caller timeout).
    pub async fn handle_turn_cancellable(
        &self,
        user_id: &str,
        utterance: &str,
        confirmation_token: Option<&str>,
        cancel: CancelHandle,
    ) -> Result<TurnOutcome, PipelineError> {
        // Input errors surface as refusals, with no commit.
        if user_id.trim().is_empty() {
            return Ok(refusal_outcome("I can't tell who is asking."));
        }
        if utterance.trim().is_empty() {
            return Ok(refusal_outcome("I didn't catch anything to act on."));
        }

        // Global concurrency cap, then per-user serialization: the lock
        // is held from here to commit (or abort).
        let _permit = self.turn_permits.acquire().await.ok();
        let lock = {
            let mut locks = self.user_locks.lock().await;
            locks
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = lock.lock().await;

        let turn_id = Uuid::new_v4();
        let result = self
            .run_turn(user_id, utterance, confirmation_token, turn_id, &cancel)
            .await;

        if matches!(result, Err(PipelineError::Cancelled)) {
            // Best-effort cancellation trace; a cancelled turn commits
            // nothing and produces no reply.
            let record = AuditRecord {
                ts: chrono::Utc::now(),
                turn_id,
                user_id: user_id.to_string(),
                kind: AuditKind::Cancelled,
                tool: String::new(),
                args_digest: String::new(),
                args: None,
                wall_tiers: Vec::new(),
                decision: Some("cancelled".into()),
                result_summary: None,
                verdict: None,
                reply_digest: None,
            };
            if let Err(e) = self.wall.audit_log().append(&record).await {
                warn!("cancelled-turn audit write failed: {e}");
            }
        }
        result
    }

    async fn run_turn(
        &self,
        user_id: &str,
        utterance: &str,
        confirmation_token: Option<&str>,
        turn_id: Uuid,
        cancel: &CancelHandle,
    ) -> Result<TurnOutcome, PipelineError> {
        let check_cancel = || {
            if cancel.is_cancelled() {
                Err(PipelineError::Cancelled)
            } else {
                Ok(())
            }
        };
        check_cancel()?;

        // A turn carrying a token resumes its parked plan instead of
        // planning afresh.
        let mut auth = TurnAuth::default();
        let resumed = if let Some(token) = confirmation_token {
            let mut pending = self.pending.lock().await;
            match pending.remove(user_id) {
                Some(p) if p.token == token || self.is_owner_token(token) => {
                    auth.confirmed = true;
                    auth.owner = self.is_owner_token(token);
                    Some(p)
                }
                Some(p) => {
                    // Wrong token: the marker stays parked.
                    pending.insert(user_id.to_string(), p);
                    None
                }
                None => None,
            }
        } else {
            None
        };

        let (plan, context, effective_utterance) = match resumed {
            Some(p) => (p.plan, p.context, p.utterance),
            None => {
                // Step 1: context assembly, degrading rather than failing.
                let context = match self
                    .memory
                    .assemble_context(user_id, utterance, self.config.memory.context_budget_chars)
                    .await
                {
                    Ok(bundle) => bundle,
                    Err(e) => {
                        warn!(user = user_id, "context assembly failed: {e}");
                        let mut bundle = ContextBundle::empty(user_id);
                        bundle.degraded = true;
                        bundle
                    }
                };
                check_cancel()?;

                // Step 2: planning, with a refusal turn on failure.
                let deadline = tokio::time::Instant::now()
                    + Duration::from_millis(self.config.planner.deadline_ms);
                let plan = match self.planner.plan(utterance, &context, deadline).await {
                    Ok(plan) => plan,
                    Err(e) => {
                        return self
                            .finish_planning_failure(user_id, utterance, context, e)
                            .await;
                    }
                };
                (plan, context, utterance.to_string())
            }
        };
        check_cancel()?;

        // Step 3: the wall. An unauditable decision aborts the turn.
        let decision = match self
            .wall
            .evaluate(user_id, turn_id, &plan, auth, std::time::Instant::now())
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                error!(user = user_id, "audit failure, aborting turn: {e}");
                return Ok(refusal_outcome(
                    "I can't act right now because my audit trail is failing.",
                ));
            }
        };

        match decision.verdict {
            WallVerdict::Rejected { ref code, ref detail, .. } => {
                info!(user = user_id, tool = %plan.tool_name, code = %code, "plan rejected");
                let reply = format!("I can't do that: {}.", refusal_reason(code));
                warn!(detail = %detail, "rejection detail");
                self.commit_turn(user_id, &effective_utterance, &plan, None, &reply, false)
                    .await;
                return Ok(TurnOutcome {
                    reply,
                    verdict: None,
                    result_summary: None,
                    degraded: context.degraded,
                    pending_token: None,
                });
            }
            WallVerdict::NeedsConfirmation { ref reason } => {
                let token = Uuid::new_v4().to_string();
                self.pending.lock().await.insert(
                    user_id.to_string(),
                    PendingConfirmation {
                        plan: plan.clone(),
                        utterance: effective_utterance.clone(),
                        context: context.clone(),
                        token: token.clone(),
                        requires_owner: false,
                    },
                );
                return Ok(TurnOutcome {
                    reply: format!("This requires confirmation: {reason}. Say yes to proceed."),
                    verdict: None,
                    result_summary: None,
                    degraded: context.degraded,
                    pending_token: Some(token),
                });
            }
            WallVerdict::NeedsOwnerAuth => {
                let token = Uuid::new_v4().to_string();
                self.pending.lock().await.insert(
                    user_id.to_string(),
                    PendingConfirmation {
                        plan: plan.clone(),
                        utterance: effective_utterance.clone(),
                        context: context.clone(),
                        token,
                        requires_owner: true,
                    },
                );
                return Ok(TurnOutcome {
                    reply: "This requires owner authorization and an explicit confirmation."
                        .to_string(),
                    verdict: None,
                    result_summary: None,
                    degraded: context.degraded,
                    // Owner actions resume with the owner token, not a
                    // turn-scoped one.
                    pending_token: None,
                });
            }
            WallVerdict::Approved => {}
        }
        check_cancel()?;

        // Step 4: sandboxed execution.
        let result = self.executor.execute(user_id, &plan, cancel.clone()).await;
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        // Step 5: verification. The wall only approves registered tools,
        // so a missing spec here is a refusal, not a panic.
        let Some(spec) = self.registry.lookup(&plan.tool_name) else {
            return Ok(refusal_outcome("I can't do that: the request didn't form a valid action."));
        };
        let verdict = self.verifier.check(spec, &plan, &result).await;

        // Step 6: reply per the decision matrix.
        let reply = match verdict.status {
            VerdictStatus::Pass if result.success => result.reply.clone(),
            VerdictStatus::Warn => {
                let caveat = verdict
                    .reasons
                    .iter()
                    .map(|r| r.human())
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("Heads up: {caveat}. {}", result.reply)
            }
            _ => {
                let reason = verdict
                    .reasons
                    .first()
                    .map(|r| r.human())
                    .unwrap_or_else(|| "the action did not complete".into());
                format!("I can't complete that: {reason}.")
            }
        };
        let success = result.success && verdict.status != VerdictStatus::Block;

        // Step 7: memory commit, then the execution audit entry.
        let turn = Turn {
            seq: self.next_seq(user_id).await,
            id: turn_id,
            user_id: user_id.to_string(),
            timestamp: chrono::Utc::now(),
            utterance: effective_utterance.clone(),
            context: context.clone(),
            plan: Some(plan.clone()),
            result: Some(result.clone()),
            verdict: Some(verdict.clone()),
            reply: reply.clone(),
            success,
        };
        self.commit_turn(user_id, &turn.utterance, &plan, Some(&result), &reply, success)
            .await;

        let execution_record = AuditRecord {
            ts: chrono::Utc::now(),
            turn_id,
            user_id: user_id.to_string(),
            kind: AuditKind::Execution,
            tool: plan.tool_name.clone(),
            args_digest: crate::wall::audit::digest_value(&plan.args),
            args: None,
            wall_tiers: Vec::new(),
            decision: None,
            result_summary: Some(result.summary()),
            verdict: Some(verdict.status.as_str().to_string()),
            reply_digest: Some(crate::wall::audit::sha256_hex(reply.as_bytes())),
        };
        if let Err(e) = self.wall.audit_log().append(&execution_record).await {
            error!(user = user_id, "execution audit failed, suppressing reply: {e}");
            return Ok(refusal_outcome(
                "I can't act right now because my audit trail is failing.",
            ));
        }

        Ok(TurnOutcome {
            reply,
            verdict: Some(verdict),
            result_summary: Some(result.summary()),
            degraded: context.degraded,
            pending_token: None,
        })
    }

    fn is_owner_token(&self, token: &str) -> bool {
        self.owner_secret.as_deref() == Some(token)
    }

    async fn next_seq(&self, user_id: &str) -> u64 {
        let mut seqs = self.seqs.lock().await;
        let seq = seqs.entry(user_id.to_string()).or_insert(0);
        *seq += 1;
        *seq
    }

    async fn finish_planning_failure(
        &self,
        user_id: &str,
        utterance: &str,
        context: ContextBundle,
        error: PlanningError,
    ) -> Result<TurnOutcome, PipelineError> {
        warn!(user = user_id, "planning failed: {error}");
        let reply = "I can't do that: I couldn't work out a safe way to help.".to_string();
        // Failure turns are committed too; they are useful experience.
        let request = CommitRequest {
            utterance: utterance.to_string(),
            reply: reply.clone(),
            tool_name: "none".to_string(),
            success: false,
            risk_elevated: false,
        };
        if let Err(e) = self.memory.commit(user_id, request).await {
            warn!(user = user_id, "failure-turn commit failed: {e}");
        }
        Ok(TurnOutcome {
            reply,
            verdict: None,
            result_summary: None,
            degraded: context.degraded,
            pending_token: None,
        })
    }

    async fn commit_turn(
        &self,
        user_id: &str,
        utterance: &str,
        plan: &ActionPlan,
        result: Option<&ExecutionResult>,
        reply: &str,
        success: bool,
    ) {
        let risk_elevated = self
            .registry
            .lookup(&plan.tool_name)
            .map(|s| s.risk >= RiskTier::Review)
            .unwrap_or(false);
        let request = CommitRequest {
            utterance: utterance.to_string(),
            reply: reply.to_string(),
            tool_name: plan.tool_name.clone(),
            success: success && result.map(|r| r.success).unwrap_or(false),
            risk_elevated,
        };
        if let Err(e) = self.memory.commit(user_id, request).await {
            warn!(user = user_id, "turn commit failed: {e}");
        }
    }
}

fn refusal_outcome(reply: &str) -> TurnOutcome {
    TurnOutcome {
        reply: reply.to_string(),
        verdict: None,
        result_summary: None,
        degraded: false,
        pending_token: None,
    }
}

/// Static mapping from internal rejection codes to short human reasons.
fn refusal_reason(code: &str) -> &'static str {
    match code {
        "rate_limited" => "you're doing that too often, give it a moment",
        "fs_outside_root" | "fs_path_traversal" => "that path is off limits",
        "fs_denied_extension" => "that file type is off limits",
        "fs_content_too_large" => "that content is too large",
        "domain_not_allowlisted" | "domain_blocklisted" | "url_unparseable" => {
            "that site isn't on the allowed list"
        }
        "side_effect_ungated" => "that action isn't enabled by policy",
        "unknown_tool" | "schema_violation" => "the request didn't form a valid action",
        "cmd_chaining" | "subshell_interpolation" | "redirect_outside_root" => {
            "that command contains constructs I won't run"
        }
        "dangerous_expression" => "that expression contains constructs I won't evaluate",
        "sql_statement_denied" => "only read-only queries are allowed",
        _ => "policy does not allow it",
    }
}
