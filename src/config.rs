use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable runtime configuration. Built once at startup and shared by
/// reference; live reconfiguration is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub memory: MemoryConfig,
    pub planner: PlannerConfig,
    pub wall: WallConfig,
    pub executor: ExecutorConfig,
    pub verifier: VerifierConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Most recent turns pulled into every context bundle.
    pub recent_k: usize,
    /// Semantic hits pulled into every context bundle.
    pub semantic_k: usize,
    /// Minimum cosine similarity for a semantic hit to count.
    pub similarity_floor: f32,
    /// Similarity at or above which a record joins an existing cluster.
    pub cluster_join_threshold: f32,
    /// Stricter floor for semantic "forget" matches.
    pub forget_floor: f32,
    /// Character budget for the rendered context bundle.
    pub context_budget_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_k: 8,
            semantic_k: 5,
            similarity_floor: 0.25,
            cluster_join_threshold: 0.55,
            forget_floor: 0.7,
            context_budget_chars: 4096,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Parse-and-retry attempts for the model strategy before failing over.
    pub max_retries: u32,
    pub deadline_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            deadline_ms: 10_000,
        }
    }
}

/// Requests allowed per window, per risk tier, per user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_calls: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallConfig {
    pub rate_safe: RateLimit,
    pub rate_review: RateLimit,
    pub rate_confirm: RateLimit,
    pub rate_owner_root: RateLimit,
    /// Domains web tools may touch. Empty list means "allow none".
    pub allowlist_domains: Vec<String>,
    pub blocklist_domains: Vec<String>,
    /// All filesystem tool paths are confined under this root.
    pub fs_root: PathBuf,
    pub fs_denied_extensions: Vec<String>,
    /// Byte ceiling for file-writing tool content arguments.
    pub fs_max_bytes: usize,
    /// Tools whose network / os-control side effects carry an explicit
    /// policy entry. A networked tool absent from this list is rejected.
    pub side_effect_grants: Vec<String>,
}

impl Default for WallConfig {
    fn default() -> Self {
        Self {
            rate_safe: RateLimit { max_calls: 50, window_secs: 60 },
            rate_review: RateLimit { max_calls: 20, window_secs: 60 },
            rate_confirm: RateLimit { max_calls: 5, window_secs: 300 },
            rate_owner_root: RateLimit { max_calls: 2, window_secs: 3600 },
            allowlist_domains: vec![
                "github.com".into(),
                "stackoverflow.com".into(),
                "wikipedia.org".into(),
                "arxiv.org".into(),
                "docs.rs".into(),
            ],
            blocklist_domains: Vec::new(),
            fs_root: PathBuf::from("cortex_workspace"),
            fs_denied_extensions: vec![
                ".sh".into(),
                ".bash".into(),
                ".zsh".into(),
                ".exe".into(),
                ".bat".into(),
                ".cmd".into(),
                ".scr".into(),
                ".vbs".into(),
                ".jar".into(),
            ],
            fs_max_bytes: 1024 * 1024,
            side_effect_grants: vec![
                "get_weather".into(),
                "search_web".into(),
                "research".into(),
                "run_command".into(),
            ],
        }
    }
}

impl WallConfig {
    pub fn rate_limit_for(&self, tier: crate::registry::RiskTier) -> RateLimit {
        use crate::registry::RiskTier;
        match tier {
            RiskTier::Safe => self.rate_safe,
            RiskTier::Review => self.rate_review,
            RiskTier::Confirm => self.rate_confirm,
            RiskTier::OwnerRoot => self.rate_owner_root,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub default_deadline_ms: u64,
    pub max_output_bytes: usize,
    /// Turns in flight for one user; the orchestrator lock enforces 1.
    pub per_user_parallelism: usize,
    pub global_parallelism: usize,
    pub max_scratch_bytes: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_deadline_ms: 30_000,
            max_output_bytes: 1_048_576,
            per_user_parallelism: 1,
            global_parallelism: 32,
            max_scratch_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// A claim is supported when its best entailment score reaches this.
    pub entailment_floor: f32,
    /// Coverage below this blocks research/search replies.
    pub coverage_block: f32,
    /// Coverage below this (but above block) attaches a warning.
    pub coverage_warn: f32,
    pub batch_size: usize,
    pub batch_deadline_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            entailment_floor: 0.6,
            coverage_block: 0.5,
            coverage_warn: 0.8,
            batch_size: 16,
            batch_deadline_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub path: PathBuf,
    pub rotate_bytes: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("cortex_audit.jsonl"),
            rotate_bytes: 8 * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            planner: PlannerConfig::default(),
            wall: WallConfig::default(),
            executor: ExecutorConfig::default(),
            verifier: VerifierConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}
