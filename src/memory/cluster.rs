use serde::{Deserialize, Serialize};

use crate::services::embedding::cosine_similarity;

/// Fixed theme taxonomy. Labels are assigned by nearest-prototype match
/// against these seed phrases; the set is closed at build time.
pub const TAXONOMY: &[(&str, &str)] = &[
    ("time", "time clock date today schedule calendar when"),
    ("weather", "weather temperature forecast rain sunny cold warm"),
    ("programming", "code program rust python function compile debug error"),
    ("memory", "remember recall memory forgot name told earlier before"),
    ("personal", "name family friend home favorite birthday feel"),
    ("research", "research investigate study findings paper source latest"),
    ("ops", "file directory command run process install system disk"),
    ("other", "general conversation miscellaneous chat"),
];

/// One per-user centroid cluster, updated online as records commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u32,
    pub label: String,
    pub centroid: Vec<f32>,
    pub size: usize,
}

impl Cluster {
    /// Running-mean centroid update.
    pub fn absorb(&mut self, embedding: &[f32]) {
        if self.centroid.len() != embedding.len() {
            return;
        }
        let n = self.size as f32;
        for (c, x) in self.centroid.iter_mut().zip(embedding) {
            *c = (*c * n + x) / (n + 1.0);
        }
        self.size += 1;
    }
}

/// All clusters for one user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSet {
    pub clusters: Vec<Cluster>,
    next_id: u32,
}

impl ClusterSet {
    /// Nearest existing cluster as (index, similarity).
    pub fn nearest(&self, embedding: &[f32]) -> Option<(usize, f32)> {
        self.clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(embedding, &c.centroid).max(0.0)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Join the nearest cluster when similarity reaches `join_threshold`,
    /// otherwise open a new cluster with the given label. Returns the
    /// assigned cluster id.
    pub fn assign(&mut self, embedding: &[f32], label: &str, join_threshold: f32) -> u32 {
        if let Some((idx, sim)) = self.nearest(embedding) {
            if sim >= join_threshold {
                self.clusters[idx].absorb(embedding);
                return self.clusters[idx].id;
            }
        }
        let id = self.next_id;
        self.next_id += 1;
        self.clusters.push(Cluster {
            id,
            label: label.to_string(),
            centroid: embedding.to_vec(),
            size: 1,
        });
        id
    }

    pub fn label_of(&self, id: u32) -> Option<&str> {
        self.clusters
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.label.as_str())
    }
}

/// Pick the taxonomy label whose prototype embedding is closest.
pub fn nearest_label(embedding: &[f32], prototypes: &[(String, Vec<f32>)]) -> String {
    prototypes
        .iter()
        .map(|(label, proto)| (label, cosine_similarity(embedding, proto)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(label, _)| label.clone())
        .unwrap_or_else(|| "other".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_moves_centroid_toward_new_point() {
        let mut c = Cluster {
            id: 0,
            label: "x".into(),
            centroid: vec![1.0, 0.0],
            size: 1,
        };
        c.absorb(&[0.0, 1.0]);
        assert_eq!(c.size, 2);
        assert!((c.centroid[0] - 0.5).abs() < 1e-6);
        assert!((c.centroid[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn assign_joins_close_and_splits_far() {
        let mut set = ClusterSet::default();
        let a = set.assign(&[1.0, 0.0, 0.0], "time", 0.55);
        let b = set.assign(&[0.95, 0.05, 0.0], "time", 0.55);
        assert_eq!(a, b, "near-identical vectors share a cluster");

        let c = set.assign(&[0.0, 0.0, 1.0], "weather", 0.55);
        assert_ne!(a, c, "orthogonal vector opens a new cluster");
        assert_eq!(set.label_of(c), Some("weather"));
    }
}
