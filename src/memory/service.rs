use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MemoryConfig;
use crate::services::embedding::EmbeddingModel;

use super::backend::MemoryBackend;
use super::cluster::{nearest_label, ClusterSet, TAXONOMY};
use super::types::{
    ContextBundle, ForgetTarget, MemoryError, MemoryRecord, ThemeExemplar, UserProfile,
};

/// What one completed turn contributes to memory. The orchestrator maps
/// its `Turn` into this to keep the service decoupled from pipeline types.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub utterance: String,
    pub reply: String,
    pub tool_name: String,
    pub success: bool,
    /// True when the executed tool's risk tier was review or above.
    pub risk_elevated: bool,
}

const PUT_RETRIES: u32 = 3;
const PUT_BACKOFF_MS: u64 = 50;

/// Durable per-user experience store with semantic retrieval and context
/// assembly. Backends own storage and nearest-neighbor; this layer owns
/// importance, clustering and the context budget.
pub struct MemoryService {
    backend: Arc<dyn MemoryBackend>,
    embedder: Arc<dyn EmbeddingModel>,
    config: MemoryConfig,
    clusters: Mutex<HashMap<String, ClusterSet>>,
    prototypes: Mutex<Option<Arc<Vec<(String, Vec<f32>)>>>>,
    /// Write-ahead queue for records the backend refused. Flushed on the
    /// next successful operation; commit never drops a record silently.
    wal: Mutex<VecDeque<MemoryRecord>>,
}

impl MemoryService {
    pub fn new(
        backend: Arc<dyn MemoryBackend>,
        embedder: Arc<dyn EmbeddingModel>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            backend,
            embedder,
            config,
            clusters: Mutex::new(HashMap::new()),
            prototypes: Mutex::new(None),
            wal: Mutex::new(VecDeque::new()),
        }
    }

    async fn taxonomy_prototypes(&self) -> Result<Arc<Vec<(String, Vec<f32>)>>, MemoryError> {
        let mut cached = self.prototypes.lock().await;
        if let Some(p) = cached.as_ref() {
            return Ok(p.clone());
        }
        let mut prototypes = Vec::with_capacity(TAXONOMY.len());
        for (label, seed) in TAXONOMY {
            let v = self
                .embedder
                .embed(seed)
                .await
                .map_err(|e| MemoryError::Embedding(e.to_string()))?;
            prototypes.push((label.to_string(), v));
        }
        let arc = Arc::new(prototypes);
        *cached = Some(arc.clone());
        Ok(arc)
    }

    /// Importance of a new record: success bonus, elevated-risk bonus,
    /// novelty (distance to the nearest existing embedding), and a
    /// recency-decayed base. Clamped to [0, 1].
    fn score_importance(request: &CommitRequest, novelty: f32) -> f32 {
        let mut score = 0.2;
        if request.success {
            score += 0.3;
        }
        if request.risk_elevated {
            score += 0.2;
        }
        score += 0.3 * novelty.clamp(0.0, 1.0);
        score.clamp(0.0, 1.0)
    }

    pub async fn commit(
        &self,
        user_id: &str,
        request: CommitRequest,
    ) -> Result<Uuid, MemoryError> {
        self.flush_wal().await;

        let text = format!("{}\n{}", request.utterance, request.reply);
        let embedding = self
            .embedder
            .embed(&text)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        // Novelty = 1 - similarity to the nearest existing record. A down
        // backend leaves novelty at its maximum; the put below will buffer.
        let novelty = match self.backend.vector_query(user_id, &embedding, 1).await {
            Ok(hits) => hits.first().map(|(_, sim)| 1.0 - sim).unwrap_or(1.0),
            Err(_) => 1.0,
        };

        let cluster_id = match self.taxonomy_prototypes().await {
            Ok(prototypes) => {
                let label = nearest_label(&embedding, &prototypes);
                let mut clusters = self.clusters.lock().await;
                let set = clusters.entry(user_id.to_string()).or_default();
                Some(set.assign(&embedding, &label, self.config.cluster_join_threshold))
            }
            Err(e) => {
                warn!("cluster labeling skipped: {e}");
                None
            }
        };

        let record = MemoryRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            timestamp: chrono::Utc::now(),
            utterance: request.utterance.clone(),
            reply: request.reply.clone(),
            tool_name: request.tool_name.clone(),
            success: request.success,
            embedding,
            cluster_id,
            importance: Self::score_importance(&request, novelty),
        };
        let id = record.id;

        let mut attempt = 0;
        let mut backoff = Duration::from_millis(PUT_BACKOFF_MS);
        loop {
            match self.backend.put(record.clone()).await {
                Ok(()) => {
                    debug!(user = user_id, %id, "memory record committed");
                    return Ok(id);
                }
                Err(e) if attempt < PUT_RETRIES => {
                    attempt += 1;
                    warn!(user = user_id, attempt, "memory put failed, retrying: {e}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    warn!(user = user_id, %id, "memory put failed, buffering to WAL: {e}");
                    self.wal.lock().await.push_back(record);
                    return Ok(id);
                }
            }
        }
    }

    async fn flush_wal(&self) {
        let mut wal = self.wal.lock().await;
        while let Some(record) = wal.pop_front() {
            match self.backend.put(record.clone()).await {
                Ok(()) => debug!(id = %record.id, "WAL record flushed"),
                Err(_) => {
                    wal.push_front(record);
                    break;
                }
            }
        }
    }

    pub async fn wal_depth(&self) -> usize {
        self.wal.lock().await.len()
    }

    /// Last `k` records, newest first.
    pub async fn recent(&self, user_id: &str, k: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.flush_wal().await;
        self.backend.list_by_user(user_id, k).await
    }

    /// Nearest-neighbor search over this user's records; at most `k`
    /// results at or above the similarity floor, best first.
    pub async fn search(
        &self,
        user_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>, MemoryError> {
        self.flush_wal().await;
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;
        let hits = self.backend.vector_query(user_id, &vector, k.max(1) * 2).await?;

        let mut results = Vec::new();
        for (id, sim) in hits {
            if sim < self.config.similarity_floor {
                continue;
            }
            if let Some(record) = self.backend.get_by_id(id).await? {
                results.push((record, sim));
            }
            if results.len() == k {
                break;
            }
        }
        Ok(results)
    }

    /// Remove records by id or by semantic match above the forget floor.
    /// Returns the number removed. Never rewrites surviving ids.
    pub async fn forget(
        &self,
        user_id: &str,
        target: ForgetTarget,
    ) -> Result<usize, MemoryError> {
        match target {
            ForgetTarget::Id(id) => {
                let owned = match self.backend.get_by_id(id).await? {
                    Some(record) => record.user_id == user_id,
                    None => false,
                };
                if !owned {
                    return Ok(0);
                }
                Ok(self.backend.delete_by_id(id).await? as usize)
            }
            ForgetTarget::Query(query) => {
                let vector = self
                    .embedder
                    .embed(&query)
                    .await
                    .map_err(|e| MemoryError::Embedding(e.to_string()))?;
                let hits = self.backend.vector_query(user_id, &vector, 64).await?;
                let mut removed = 0;
                for (id, sim) in hits {
                    if sim >= self.config.forget_floor && self.backend.delete_by_id(id).await? {
                        removed += 1;
                    }
                }
                Ok(removed)
            }
        }
    }

    /// Recomputed lazily from committed records.
    pub async fn profile(&self, user_id: &str) -> Result<UserProfile, MemoryError> {
        let records = self.backend.list_by_user(user_id, 10_000).await?;
        let mut profile = UserProfile {
            user_id: user_id.to_string(),
            ..UserProfile::default()
        };
        if records.is_empty() {
            return Ok(profile);
        }

        let clusters = self.clusters.lock().await;
        let labels = clusters.get(user_id);

        let mut theme_counts: HashMap<String, usize> = HashMap::new();
        let mut tool_counts: HashMap<String, usize> = HashMap::new();
        let mut successes = 0usize;
        for record in &records {
            if record.success {
                successes += 1;
            }
            *tool_counts.entry(record.tool_name.clone()).or_default() += 1;
            let label = record
                .cluster_id
                .and_then(|id| labels.and_then(|set| set.label_of(id)))
                .unwrap_or("other");
            *theme_counts.entry(label.to_string()).or_default() += 1;
        }

        profile.total_turns = records.len();
        profile.success_rate = successes as f32 / records.len() as f32;
        // list_by_user is newest first.
        profile.last_seen = records.first().map(|r| r.timestamp);
        profile.first_seen = records.last().map(|r| r.timestamp);

        let mut themes: Vec<(String, usize)> = theme_counts.into_iter().collect();
        themes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        profile.themes = themes;

        let mut tools: Vec<(String, usize)> = tool_counts.into_iter().collect();
        tools.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        profile.tool_histogram = tools;

        Ok(profile)
    }

    /// Build the planner's context bundle: recent turns, semantic hits,
    /// one exemplar per represented cluster, the profile summary, then
    /// trim to the character budget (lowest-importance semantic hits
    /// first, then oldest recents, never the newest two or the profile).
    ///
    /// Pure with respect to committed memory: nothing here writes.
    pub async fn assemble_context(
        &self,
        user_id: &str,
        query: &str,
        budget_chars: usize,
    ) -> Result<ContextBundle, MemoryError> {
        let recent = self.backend.list_by_user(user_id, self.config.recent_k).await?;

        let mut degraded = false;
        let recent_ids: HashSet<Uuid> = recent.iter().map(|r| r.id).collect();
        let semantic: Vec<(MemoryRecord, f32)> =
            match self.search(user_id, query, self.config.semantic_k).await {
                Ok(hits) => hits
                    .into_iter()
                    .filter(|(r, _)| !recent_ids.contains(&r.id))
                    .collect(),
                Err(e) => {
                    warn!(user = user_id, "semantic lookup degraded: {e}");
                    degraded = true;
                    Vec::new()
                }
            };

        let exemplars = {
            let clusters = self.clusters.lock().await;
            let labels = clusters.get(user_id);
            let mut best_per_cluster: HashMap<u32, &MemoryRecord> = HashMap::new();
            for record in recent.iter().chain(semantic.iter().map(|(r, _)| r)) {
                if let Some(cid) = record.cluster_id {
                    let slot = best_per_cluster.entry(cid).or_insert(record);
                    if record.importance > slot.importance {
                        *slot = record;
                    }
                }
            }
            let mut exemplars: Vec<ThemeExemplar> = best_per_cluster
                .into_iter()
                .filter_map(|(cid, record)| {
                    labels.and_then(|set| set.label_of(cid)).map(|label| ThemeExemplar {
                        label: label.to_string(),
                        record: record.clone(),
                    })
                })
                .collect();
            exemplars.sort_by(|a, b| a.label.cmp(&b.label));
            exemplars
        };

        let profile = self.profile(user_id).await.unwrap_or_else(|_| UserProfile {
            user_id: user_id.to_string(),
            ..UserProfile::default()
        });

        let mut bundle = ContextBundle {
            recent,
            semantic,
            exemplars,
            profile,
            degraded,
        };

        while bundle.rendered_len() > budget_chars {
            // Drop the least important semantic hit first.
            if !bundle.semantic.is_empty() {
                let (drop_idx, _) = bundle
                    .semantic
                    .iter()
                    .enumerate()
                    .min_by(|a, b| {
                        a.1 .0
                            .importance
                            .partial_cmp(&b.1 .0.importance)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(i, _)| (i, ()))
                    .unwrap_or((0, ()));
                bundle.semantic.remove(drop_idx);
                continue;
            }
            // Then the oldest recent turns, preserving the newest two.
            if bundle.recent.len() > 2 {
                bundle.recent.pop();
                continue;
            }
            if !bundle.exemplars.is_empty() {
                bundle.exemplars.pop();
                continue;
            }
            // Profile and the newest two turns are never dropped.
            break;
        }

        Ok(bundle)
    }
}
