use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use uuid::Uuid;

use crate::services::embedding::cosine_similarity;

use super::types::{MemoryError, MemoryRecord};

/// Capability set a concrete store must provide to back the memory
/// service. The service layer owns importance, clustering and context
/// assembly; backends own storage and nearest-neighbor.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    async fn put(&self, record: MemoryRecord) -> Result<(), MemoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryRecord>, MemoryError>;
    /// Newest first, at most `limit`.
    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;
    /// Nearest neighbors over this user's records, best first, cosine
    /// similarity normalized to [0, 1].
    async fn vector_query(
        &self,
        user_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Uuid, f32)>, MemoryError>;
    async fn delete_by_id(&self, id: Uuid) -> Result<bool, MemoryError>;
}

/// In-process backend with a linear-scan nearest-neighbor. Adequate for
/// small deployments and the reference for tests; an external vector
/// database slots in behind the same trait.
pub struct InProcessBackend {
    records: RwLock<HashMap<Uuid, MemoryRecord>>,
    /// Test hook: flips every operation into `BackendUnavailable`.
    offline: AtomicBool,
}

impl InProcessBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), MemoryError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(MemoryError::BackendUnavailable("in-process backend offline".into()))
        } else {
            Ok(())
        }
    }
}

impl Default for InProcessBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InProcessBackend {
    async fn put(&self, record: MemoryRecord) -> Result<(), MemoryError> {
        self.check_online()?;
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        records.insert(record.id, record);
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<MemoryRecord>, MemoryError> {
        self.check_online()?;
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        Ok(records.get(&id).cloned())
    }

    async fn list_by_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.check_online()?;
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        let mut matching: Vec<MemoryRecord> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn vector_query(
        &self,
        user_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(Uuid, f32)>, MemoryError> {
        self.check_online()?;
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        let mut scored: Vec<(Uuid, f32)> = records
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| {
                // Negative cosine means "unrelated"; clamp into [0, 1].
                let sim = cosine_similarity(vector, &r.embedding).max(0.0);
                (r.id, sim)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<bool, MemoryError> {
        self.check_online()?;
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        Ok(records.remove(&id).is_some())
    }
}
