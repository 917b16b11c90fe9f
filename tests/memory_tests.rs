//! Memory service laws: commit/recent round trip, search floors, forget,
//! profiles, clustering and context budget trimming.


use std::sync::Arc;

use cortex::config::MemoryConfig;
use cortex::memory::{
    CommitRequest, ForgetTarget, InProcessBackend, MemoryService,
};
use cortex::services::embedding::HashEmbedder;

fn service() -> (MemoryService, Arc<InProcessBackend>) {
    let backend = Arc::new(InProcessBackend::new());
    let svc = MemoryService::new(
        backend.clone(),
        Arc::new(HashEmbedder::default()),
        MemoryConfig::default(),
    );
    (svc, backend)
}

fn turn(utterance: &str, reply: &str, tool: &str, success: bool) -> CommitRequest {
    CommitRequest {
        utterance: utterance.to_string(),
        reply: reply.to_string(),
        tool_name: tool.to_string(),
        success,
        risk_elevated: false,
    }
}

#[tokio::test]
async fn commit_then_recent_returns_the_record() {
    let (svc, _) = service();
    let id = svc
        .commit("u1", turn("hello there", "hi!", "respond", true))
        .await
        .unwrap();

    let recent = svc.recent("u1", 1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, id);
    assert_eq!(recent[0].utterance, "hello there");
    assert_eq!(recent[0].reply, "hi!");
    assert_eq!(recent[0].tool_name, "respond");
    assert!(recent[0].success);
    assert!((0.0..=1.0).contains(&recent[0].importance));
}

#[tokio::test]
async fn recent_is_newest_first_and_bounded() {
    let (svc, _) = service();
    for i in 0..5 {
        svc.commit("u1", turn(&format!("utterance number {i}"), "ok", "respond", true))
            .await
            .unwrap();
    }
    let recent = svc.recent("u1", 3).await.unwrap();
    assert_eq!(recent.len(), 3);
    assert_eq!(recent[0].utterance, "utterance number 4");
}

#[tokio::test]
async fn search_respects_the_similarity_floor() {
    let (svc, _) = service();
    svc.commit("u1", turn("the weather in london is mild", "noted", "respond", true))
        .await
        .unwrap();

    let hits = svc.search("u1", "weather in london", 5).await.unwrap();
    assert!(!hits.is_empty(), "overlapping query should match");
    assert!(hits[0].1 >= 0.25);

    let misses = svc
        .search("u1", "quantum chromodynamics lattice", 5)
        .await
        .unwrap();
    assert!(misses.is_empty(), "disjoint query stays under the floor");
}

#[tokio::test]
async fn search_is_scoped_per_user() {
    let (svc, _) = service();
    svc.commit("u1", turn("my favourite colour is green", "ok", "respond", true))
        .await
        .unwrap();
    let other = svc.search("u2", "favourite colour green", 5).await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn forget_by_id_removes_the_record() {
    let (svc, _) = service();
    let id = svc
        .commit("u1", turn("remember the cabbages", "ok", "remember", true))
        .await
        .unwrap();

    let removed = svc.forget("u1", ForgetTarget::Id(id)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(svc.recent("u1", 10).await.unwrap().is_empty());
    assert!(svc.search("u1", "cabbages", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn forget_by_id_ignores_other_users_records() {
    let (svc, _) = service();
    let id = svc
        .commit("u1", turn("private note", "ok", "respond", true))
        .await
        .unwrap();
    let removed = svc.forget("u2", ForgetTarget::Id(id)).await.unwrap();
    assert_eq!(removed, 0);
    assert_eq!(svc.recent("u1", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn forget_by_query_uses_the_stricter_floor() {
    let (svc, _) = service();
    svc.commit("u1", turn("the launch code is swordfish", "ok", "remember", true))
        .await
        .unwrap();
    svc.commit("u1", turn("tuesday is bin day", "ok", "remember", true))
        .await
        .unwrap();

    // Near-identical text clears the 0.7 forget floor; the other survives.
    let removed = svc
        .forget("u1", ForgetTarget::Query("the launch code is swordfish ok".into()))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    let rest = svc.recent("u1", 10).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].utterance, "tuesday is bin day");
}

#[tokio::test]
async fn profile_aggregates_tools_and_success() {
    let (svc, _) = service();
    svc.commit("u1", turn("weather in oslo", "cold", "get_weather", true))
        .await
        .unwrap();
    svc.commit("u1", turn("weather in rome", "warm", "get_weather", true))
        .await
        .unwrap();
    svc.commit("u1", turn("compute 1 + 1", "2", "calculate", false))
        .await
        .unwrap();

    let profile = svc.profile("u1").await.unwrap();
    assert_eq!(profile.total_turns, 3);
    assert!((profile.success_rate - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(profile.tool_histogram[0], ("get_weather".to_string(), 2));
    assert!(profile.first_seen.unwrap() <= profile.last_seen.unwrap());
}

#[tokio::test]
async fn near_duplicate_turns_share_a_cluster() {
    let (svc, _) = service();
    svc.commit("u1", turn("weather forecast for london today", "mild", "get_weather", true))
        .await
        .unwrap();
    svc.commit("u1", turn("weather forecast for london tomorrow", "mild", "get_weather", true))
        .await
        .unwrap();

    let recent = svc.recent("u1", 2).await.unwrap();
    let a = recent[0].cluster_id.expect("cluster assigned");
    let b = recent[1].cluster_id.expect("cluster assigned");
    assert_eq!(a, b, "near-duplicates join the same cluster");
}

#[tokio::test]
async fn context_contains_recent_and_profile() {
    let (svc, _) = service();
    svc.commit("u1", turn("my name is alex", "noted", "remember", true))
        .await
        .unwrap();

    let bundle = svc.assemble_context("u1", "what is my name", 4096).await.unwrap();
    assert!(!bundle.degraded);
    assert_eq!(bundle.recent.len(), 1);
    assert_eq!(bundle.profile.total_turns, 1);
    assert!(bundle.render().contains("my name is alex"));
}

#[tokio::test]
async fn context_trims_to_budget_but_keeps_newest_two() {
    let (svc, _) = service();
    let filler = "a fairly long sentence about nothing in particular that eats budget";
    for i in 0..8 {
        svc.commit("u1", turn(&format!("{filler} number {i}"), filler, "respond", true))
            .await
            .unwrap();
    }

    let tight = svc.assemble_context("u1", filler, 600).await.unwrap();
    assert_eq!(tight.recent.len(), 2, "newest two turns always survive");
    assert!(tight.recent[0].utterance.contains("number 7"));
    assert!(tight.recent[1].utterance.contains("number 6"));
    assert!(tight.render().contains("profile:"), "profile summary is never dropped");
}

#[tokio::test]
async fn semantic_hits_exclude_records_already_recent() {
    let config = MemoryConfig { recent_k: 2, ..MemoryConfig::default() };
    let backend = Arc::new(InProcessBackend::new());
    let svc = MemoryService::new(backend, Arc::new(HashEmbedder::default()), config);

    svc.commit("u1", turn("rust borrow checker question", "answered", "respond", true))
        .await
        .unwrap();
    svc.commit("u1", turn("dinner plans tonight", "ok", "respond", true))
        .await
        .unwrap();
    svc.commit("u1", turn("lunch plans tomorrow", "ok", "respond", true))
        .await
        .unwrap();

    let bundle = svc
        .assemble_context("u1", "rust borrow checker question", 4096)
        .await
        .unwrap();
    // The matching record fell out of the recent window, so it must come
    // back through semantic search exactly once.
    let in_recent = bundle.recent.iter().any(|r| r.utterance.contains("borrow"));
    let in_semantic = bundle.semantic.iter().any(|(r, _)| r.utterance.contains("borrow"));
    assert!(!in_recent);
    assert!(in_semantic);
}

#[tokio::test]
async fn offline_backend_buffers_to_wal_then_flushes() {
    let (svc, backend) = service();

    backend.set_offline(true);
    let id = svc
        .commit("u1", turn("buffered while offline", "ok", "respond", true))
        .await
        .unwrap();
    assert_eq!(svc.wal_depth().await, 1, "record parked in the WAL");

    backend.set_offline(false);
    let recent = svc.recent("u1", 10).await.unwrap();
    assert_eq!(recent.len(), 1, "WAL flushed on next operation");
    assert_eq!(recent[0].id, id);
    assert_eq!(svc.wal_depth().await, 0);
}

#[tokio::test]
async fn context_degrades_when_backend_goes_down_mid_query() {
    let (svc, backend) = service();
    svc.commit("u1", turn("hello", "hi", "respond", true)).await.unwrap();

    // list_by_user succeeds, vector query then fails: recent-only mode.
    struct FlakyEmbedder;
    #[async_trait::async_trait]
    impl cortex::services::embedding::EmbeddingModel for FlakyEmbedder {
        async fn embed(
            &self,
            _text: &str,
        ) -> Result<Vec<f32>, cortex::services::ServiceError> {
            Err(cortex::services::ServiceError::Unavailable("embedder down".into()))
        }
    }
    let flaky = MemoryService::new(
        backend.clone(),
        Arc::new(FlakyEmbedder),
        MemoryConfig::default(),
    );
    let bundle = flaky.assemble_context("u1", "hello", 4096).await.unwrap();
    assert!(bundle.degraded);
    assert_eq!(bundle.recent.len(), 1);
    assert!(bundle.semantic.is_empty());
}
