//! Validation wall behavior: tier ordering, rate-limit boundaries,
//! confirmation outcomes and the audit trail.


use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use cortex::config::WallConfig;
use cortex::planner::ActionPlan;
use cortex::registry::{toolset::default_toolset, ToolRegistry};
use cortex::wall::{AuditKind, AuditLog, TurnAuth, ValidationWall, WallTier, WallVerdict};

fn wall() -> (ValidationWall, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ToolRegistry::new();
    for spec in default_toolset() {
        registry.register(spec).unwrap();
    }
    let mut config = WallConfig::default();
    config.fs_root = dir.path().join("workspace");
    let audit = Arc::new(AuditLog::new(dir.path().join("audit.jsonl"), 1024 * 1024));
    (ValidationWall::new(Arc::new(registry), config, audit), dir)
}

fn confirmed() -> TurnAuth {
    TurnAuth { confirmed: true, owner: false }
}

#[tokio::test]
async fn schema_tier_rejects_bad_args() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new("get_weather", json!({ "location": 17 }));
    let decision = wall
        .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), Instant::now())
        .await
        .unwrap();
    match decision.verdict {
        WallVerdict::Rejected { tier, code, .. } => {
            assert_eq!(tier, WallTier::Schema);
            assert_eq!(code, "schema_violation");
        }
        other => panic!("expected schema rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_tool_is_rejected_defensively() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new("summon_demon", json!({}));
    let decision = wall
        .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), Instant::now())
        .await
        .unwrap();
    assert!(matches!(
        decision.verdict,
        WallVerdict::Rejected { tier: WallTier::Schema, .. }
    ));
}

#[tokio::test]
async fn lint_tier_rejects_chained_commands() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new("run_command", json!({ "cmd": "ls && rm -rf /" }));
    let decision = wall
        .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), Instant::now())
        .await
        .unwrap();
    match decision.verdict {
        WallVerdict::Rejected { tier, code, .. } => {
            assert_eq!(tier, WallTier::Lint);
            assert_eq!(code, "cmd_chaining");
        }
        other => panic!("expected lint rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn confirm_tier_without_token_suspends() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new(
        "write_file",
        json!({ "path": "notes.txt", "content": "hello" }),
    );
    let decision = wall
        .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), Instant::now())
        .await
        .unwrap();
    assert!(matches!(decision.verdict, WallVerdict::NeedsConfirmation { .. }));

    let with_token = wall
        .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), Instant::now())
        .await
        .unwrap();
    assert_eq!(with_token.verdict, WallVerdict::Approved);
}

#[tokio::test]
async fn owner_tier_needs_both_tokens() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new("forget_memory", json!({ "query": "everything" }));

    let none = wall
        .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), Instant::now())
        .await
        .unwrap();
    assert_eq!(none.verdict, WallVerdict::NeedsOwnerAuth);

    let confirm_only = wall
        .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), Instant::now())
        .await
        .unwrap();
    assert_eq!(confirm_only.verdict, WallVerdict::NeedsOwnerAuth);

    let both = wall
        .evaluate(
            "u1",
            Uuid::new_v4(),
            &plan,
            TurnAuth { confirmed: true, owner: true },
            Instant::now(),
        )
        .await
        .unwrap();
    assert_eq!(both.verdict, WallVerdict::Approved);
}

#[tokio::test]
async fn rate_limit_window_boundary() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new(
        "write_file",
        json!({ "path": "notes.txt", "content": "hello" }),
    );
    let start = Instant::now();

    // Five confirmed requests inside the window proceed.
    for i in 0..5 {
        let decision = wall
            .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), start)
            .await
            .unwrap();
        assert_eq!(decision.verdict, WallVerdict::Approved, "request {i}");
    }

    // The sixth is rejected by the policy tier.
    let sixth = wall
        .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), start)
        .await
        .unwrap();
    match sixth.verdict {
        WallVerdict::Rejected { tier, code, .. } => {
            assert_eq!(tier, WallTier::Policy);
            assert_eq!(code, "rate_limited");
        }
        other => panic!("expected rate-limit rejection, got {other:?}"),
    }

    // Once the window elapses, requests proceed again.
    let later = start + Duration::from_secs(301);
    let after = wall
        .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), later)
        .await
        .unwrap();
    assert_eq!(after.verdict, WallVerdict::Approved);
}

#[tokio::test]
async fn rate_buckets_are_per_user() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new(
        "write_file",
        json!({ "path": "notes.txt", "content": "hello" }),
    );
    let start = Instant::now();
    for _ in 0..5 {
        wall.evaluate("u1", Uuid::new_v4(), &plan, confirmed(), start)
            .await
            .unwrap();
    }
    let other_user = wall
        .evaluate("u2", Uuid::new_v4(), &plan, confirmed(), start)
        .await
        .unwrap();
    assert_eq!(other_user.verdict, WallVerdict::Approved);
}

#[tokio::test]
async fn suspended_turns_do_not_consume_rate_budget() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new(
        "write_file",
        json!({ "path": "notes.txt", "content": "hello" }),
    );
    let start = Instant::now();

    // Ten unconfirmed prompts cost nothing.
    for _ in 0..10 {
        let decision = wall
            .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), start)
            .await
            .unwrap();
        assert!(matches!(decision.verdict, WallVerdict::NeedsConfirmation { .. }));
    }
    let confirmed_turn = wall
        .evaluate("u1", Uuid::new_v4(), &plan, confirmed(), start)
        .await
        .unwrap();
    assert_eq!(confirmed_turn.verdict, WallVerdict::Approved);
}

#[tokio::test]
async fn evaluation_is_deterministic_for_fixed_state() {
    let plan = ActionPlan::new("get_weather", json!({ "location": "London" }));
    let now = Instant::now();

    let (wall_a, _dir_a) = wall();
    let (wall_b, _dir_b) = wall();
    let a = wall_a
        .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), now)
        .await
        .unwrap();
    let b = wall_b
        .evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), now)
        .await
        .unwrap();
    assert_eq!(a.verdict, b.verdict);
    assert_eq!(
        a.tiers.iter().map(|t| (&t.tier, &t.outcome)).collect::<Vec<_>>(),
        b.tiers.iter().map(|t| (&t.tier, &t.outcome)).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn every_evaluation_writes_one_decision_record() {
    let (wall, _dir) = wall();
    let approved = ActionPlan::new("get_weather", json!({ "location": "London" }));
    let rejected = ActionPlan::new("delete_file", json!({ "path": "/etc/passwd" }));

    wall.evaluate("u1", Uuid::new_v4(), &approved, TurnAuth::default(), Instant::now())
        .await
        .unwrap();
    wall.evaluate("u1", Uuid::new_v4(), &rejected, TurnAuth::default(), Instant::now())
        .await
        .unwrap();

    let entries = wall.audit_log().read_all().await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| matches!(e.kind, AuditKind::Decision)));
    assert!(entries.iter().all(|e| e.decision.is_some()));
    assert_eq!(entries[0].decision.as_deref(), Some("approved"));
    assert_eq!(
        entries[1].decision.as_deref(),
        Some("rejected:policy:fs_outside_root")
    );
}

#[tokio::test]
async fn audit_args_are_redacted_but_digested() {
    let (wall, _dir) = wall();
    let plan = ActionPlan::new(
        "respond",
        json!({ "message": "my api_key is sk-verysecretvalue123" }),
    );
    wall.evaluate("u1", Uuid::new_v4(), &plan, TurnAuth::default(), Instant::now())
        .await
        .unwrap();

    let entries = wall.audit_log().read_all().await.unwrap();
    let args = entries[0].args.as_ref().unwrap();
    let rendered = args.to_string();
    assert!(!rendered.contains("sk-verysecretvalue123"), "args: {rendered}");
    assert!(rendered.contains("[redacted]"));
    assert_eq!(entries[0].args_digest.len(), 64, "sha256 hex digest");
}
