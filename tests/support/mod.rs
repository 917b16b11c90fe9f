#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use cortex::config::Config;
use cortex::executor::tools::research::default_corpus;
use cortex::executor::{SandboxExecutor, ToolDeps};
use cortex::memory::{InProcessBackend, MemoryService};
use cortex::planner::Planner;
use cortex::registry::{toolset::default_toolset, ToolRegistry};
use cortex::services::embedding::HashEmbedder;
use cortex::services::entailment::{EntailmentModel, KeywordEntailment};
use cortex::verifier::{CitationStore, InMemoryCitationStore, Verifier};
use cortex::wall::{AuditLog, ValidationWall};
use cortex::Pipeline;

/// Config pointed at a private temp directory: fs root and audit log
/// both live under it.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.wall.fs_root = dir.join("workspace");
    std::fs::create_dir_all(&config.wall.fs_root).unwrap();
    config.audit.path = dir.join("audit.jsonl");
    config
}

pub fn offline_pipeline() -> (Pipeline, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::offline(test_config(dir.path()));
    (pipeline, dir)
}

/// Same wiring as `Pipeline::offline` but with a caller-chosen entailment
/// collaborator, for degraded-verifier scenarios.
pub fn offline_pipeline_with_entailment(
    entailment: Arc<dyn EntailmentModel>,
) -> (Pipeline, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());

    let mut registry = ToolRegistry::new();
    for spec in default_toolset() {
        registry.register(spec).unwrap();
    }
    let registry = Arc::new(registry);

    let memory = Arc::new(MemoryService::new(
        Arc::new(InProcessBackend::new()),
        Arc::new(HashEmbedder::default()),
        config.memory.clone(),
    ));
    let citations: Arc<dyn CitationStore> = Arc::new(InMemoryCitationStore::new());
    let deps = ToolDeps {
        memory: Some(memory.clone()),
        citations: citations.clone(),
        model: None,
        corpus: Arc::new(default_corpus()),
        fs_root: config.wall.fs_root.clone(),
    };
    let audit = Arc::new(AuditLog::new(config.audit.path.clone(), config.audit.rotate_bytes));
    let wall = ValidationWall::new(registry.clone(), config.wall.clone(), audit);
    let executor = SandboxExecutor::new(registry.clone(), config.executor.clone(), deps);
    let verifier = Verifier::new(entailment, citations, config.verifier.clone());
    let planner = Planner::rule_based(registry.clone());

    let pipeline = Pipeline::new(
        config, registry, memory, planner, wall, executor, verifier, None,
    );
    (pipeline, dir)
}

pub fn keyword_entailment() -> Arc<dyn EntailmentModel> {
    Arc::new(KeywordEntailment)
}
