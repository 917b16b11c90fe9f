//! Policy tier: rate limits, domain allowlists, filesystem confinement,
//! size ceilings, and side-effect gating.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use crate::config::{RateLimit, WallConfig};
use crate::planner::ActionPlan;
use crate::registry::{RiskTier, SideEffect, ToolSpec};

/// Classic token bucket with fractional refill at `capacity / window`.
/// Callers pass `now` explicitly so the wall stays a pure function of its
/// inputs plus bucket state.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(limit: RateLimit, now: Instant) -> Self {
        let capacity = limit.max_calls as f64;
        Self {
            capacity,
            refill_per_sec: capacity / limit.window_secs.max(1) as f64,
            tokens: capacity,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn would_allow(&mut self, now: Instant) -> bool {
        self.refill(now);
        self.tokens >= 1.0
    }

    /// Debit one call. Only invoked once a plan is finally approved, so a
    /// rejected or confirmation-pending evaluation costs nothing.
    pub fn take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Per-(user, tier) buckets. The only mutable wall state.
#[derive(Debug, Default)]
pub struct RateState {
    buckets: HashMap<(String, RiskTier), TokenBucket>,
}

impl RateState {
    pub fn bucket(
        &mut self,
        user_id: &str,
        tier: RiskTier,
        limit: RateLimit,
        now: Instant,
    ) -> &mut TokenBucket {
        self.buckets
            .entry((user_id.to_string(), tier))
            .or_insert_with(|| TokenBucket::new(limit, now))
    }
}

/// A single policy violation: `(rule_id, detail)`.
pub type PolicyViolation = (String, String);

fn violation(rule: &str, detail: String) -> Option<PolicyViolation> {
    Some((rule.to_string(), detail))
}

/// Resolve a tool path argument against the configured root without
/// touching the filesystem. Absolute paths must already live under the
/// root; relative paths must not traverse out of it.
pub fn resolve_under_root(root: &Path, raw: &str) -> Result<PathBuf, &'static str> {
    let candidate = Path::new(raw);
    if candidate.is_absolute() {
        if candidate.starts_with(root) {
            return Ok(candidate.to_path_buf());
        }
        return Err("fs_outside_root");
    }
    let mut depth: i32 = 0;
    for part in candidate.components() {
        match part {
            Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return Err("fs_path_traversal");
                }
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            _ => return Err("fs_path_traversal"),
        }
    }
    Ok(root.join(candidate))
}

fn check_paths(config: &WallConfig, spec: &ToolSpec, plan: &ActionPlan) -> Option<PolicyViolation> {
    let path = plan.arg_str("path")?;
    if let Err(rule) = resolve_under_root(&config.fs_root, path) {
        return violation(rule, format!("path '{path}' escapes '{}'", config.fs_root.display()));
    }
    if spec.side_effect == SideEffect::WritesFs {
        let lower = path.to_lowercase();
        if let Some(ext) = config.fs_denied_extensions.iter().find(|e| lower.ends_with(*e)) {
            return violation("fs_denied_extension", format!("extension '{ext}' is denied"));
        }
    }
    None
}

fn check_sizes(config: &WallConfig, plan: &ActionPlan) -> Option<PolicyViolation> {
    let content = plan.arg_str("content")?;
    if content.len() > config.fs_max_bytes {
        return violation(
            "fs_content_too_large",
            format!("{} bytes exceeds cap of {}", content.len(), config.fs_max_bytes),
        );
    }
    None
}

fn check_domains(config: &WallConfig, plan: &ActionPlan) -> Option<PolicyViolation> {
    let raw = plan.arg_str("url")?;
    let parsed = match url::Url::parse(raw) {
        Ok(u) => u,
        Err(e) => return violation("url_unparseable", format!("'{raw}': {e}")),
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if config
        .blocklist_domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    {
        return violation("domain_blocklisted", format!("domain '{host}' is blocked"));
    }
    let allowed = config
        .allowlist_domains
        .iter()
        .any(|d| host == *d || host.ends_with(&format!(".{d}")));
    if !allowed {
        return violation("domain_not_allowlisted", format!("domain '{host}' not in allowlist"));
    }
    None
}

fn check_side_effect_gate(config: &WallConfig, spec: &ToolSpec) -> Option<PolicyViolation> {
    if matches!(spec.side_effect, SideEffect::Network | SideEffect::OsControl)
        && !config.side_effect_grants.iter().any(|t| t == &spec.name)
    {
        return violation(
            "side_effect_ungated",
            format!(
                "tool '{}' has a {:?} side effect but no policy entry",
                spec.name, spec.side_effect
            ),
        );
    }
    None
}

/// Non-rate policy checks. Rate limiting is peeked separately so the
/// bucket is only debited on final approval.
pub fn check_policies(
    config: &WallConfig,
    spec: &ToolSpec,
    plan: &ActionPlan,
) -> Option<PolicyViolation> {
    check_side_effect_gate(config, spec)
        .or_else(|| check_domains(config, plan))
        .or_else(|| check_paths(config, spec, plan))
        .or_else(|| check_sizes(config, plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::toolset::default_toolset;
    use serde_json::json;
    use std::time::Duration;

    fn spec_for(name: &str) -> ToolSpec {
        default_toolset().into_iter().find(|s| s.name == name).unwrap()
    }

    #[test]
    fn bucket_exhausts_then_refills_after_window() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(RateLimit { max_calls: 5, window_secs: 300 }, start);
        for _ in 0..5 {
            assert!(bucket.take(start));
        }
        assert!(!bucket.would_allow(start), "6th call inside the window is denied");

        let later = start + Duration::from_secs(300);
        assert!(bucket.would_allow(later), "window elapsed, a call proceeds");
    }

    #[test]
    fn absolute_path_outside_root_is_rejected() {
        let config = WallConfig::default();
        let plan = ActionPlan::new("delete_file", json!({ "path": "/etc/passwd" }));
        let (rule, _) = check_policies(&config, &spec_for("delete_file"), &plan).unwrap();
        assert_eq!(rule, "fs_outside_root");
    }

    #[test]
    fn traversal_out_of_root_is_rejected() {
        let config = WallConfig::default();
        let plan = ActionPlan::new("read_file", json!({ "path": "../../secrets.txt" }));
        let (rule, _) = check_policies(&config, &spec_for("read_file"), &plan).unwrap();
        assert_eq!(rule, "fs_path_traversal");
    }

    #[test]
    fn denied_extension_on_write_is_rejected() {
        let config = WallConfig::default();
        let plan = ActionPlan::new(
            "write_file",
            json!({ "path": "notes/run.sh", "content": "echo hi" }),
        );
        let (rule, _) = check_policies(&config, &spec_for("write_file"), &plan).unwrap();
        assert_eq!(rule, "fs_denied_extension");
    }

    #[test]
    fn ungated_network_tool_is_rejected() {
        let mut config = WallConfig::default();
        config.side_effect_grants.retain(|t| t != "search_web");
        let plan = ActionPlan::new("search_web", json!({ "query": "rust" }));
        let (rule, _) = check_policies(&config, &spec_for("search_web"), &plan).unwrap();
        assert_eq!(rule, "side_effect_ungated");
    }

    #[test]
    fn relative_path_inside_root_is_allowed() {
        let config = WallConfig::default();
        let plan = ActionPlan::new(
            "write_file",
            json!({ "path": "notes/todo.txt", "content": "x" }),
        );
        assert!(check_policies(&config, &spec_for("write_file"), &plan).is_none());
    }
}
