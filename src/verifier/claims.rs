//! Claim/citation verification: split the textual reply into sentence
//! claims, entail each against stored evidence, and convert coverage
//! into a pass/warn/block outcome.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::VerifierConfig;
use crate::services::entailment::EntailmentModel;
use crate::verifier::citations::{CitationRef, CitationStore};

/// Sentence-level assertion extracted from a reply, in reply order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub ordinal: usize,
    pub text: String,
}

pub fn extract_claims(reply: &str) -> Vec<Claim> {
    crate::executor::tools::research::split_sentences(reply)
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| Claim { ordinal, text })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ClaimReport {
    /// (claim, best score, supported) in claim order.
    pub scored: Vec<(Claim, f32, bool)>,
    pub coverage: f32,
    pub degraded: bool,
    /// Citations that resolved and backed at least one supported claim.
    pub evidence: Vec<CitationRef>,
}

/// Score every claim against every resolvable citation, batched to the
/// configured size with claim order preserved. An entailment failure or
/// per-batch deadline miss marks the report degraded rather than passing
/// anything silently.
pub async fn verify_claims(
    claims: &[Claim],
    citations: &[CitationRef],
    store: &Arc<dyn CitationStore>,
    entailment: &Arc<dyn EntailmentModel>,
    config: &VerifierConfig,
) -> ClaimReport {
    let premises: Vec<(CitationRef, String)> = citations
        .iter()
        .filter(|c| store.verify_hash(c))
        .filter_map(|c| {
            store
                .get(&c.content_hash)
                .map(|bytes| (c.clone(), String::from_utf8_lossy(&bytes).into_owned()))
        })
        .collect();

    if claims.is_empty() {
        return ClaimReport {
            scored: Vec::new(),
            coverage: 1.0,
            degraded: false,
            evidence: Vec::new(),
        };
    }
    if premises.is_empty() {
        return ClaimReport {
            scored: claims.iter().map(|c| (c.clone(), 0.0, false)).collect(),
            coverage: 0.0,
            degraded: false,
            evidence: Vec::new(),
        };
    }

    // One pair per (claim, premise); scores fold back to a per-claim max.
    let pairs: Vec<(String, String)> = claims
        .iter()
        .flat_map(|claim| {
            premises
                .iter()
                .map(move |(_, premise)| (premise.clone(), claim.text.clone()))
        })
        .collect();

    let mut scores: Vec<f32> = Vec::with_capacity(pairs.len());
    for batch in pairs.chunks(config.batch_size.max(1)) {
        let deadline = Duration::from_millis(config.batch_deadline_ms);
        match tokio::time::timeout(deadline, entailment.score_batch(batch)).await {
            Ok(Ok(batch_scores)) if batch_scores.len() == batch.len() => {
                scores.extend(batch_scores);
            }
            Ok(Ok(_)) | Ok(Err(_)) | Err(_) => {
                warn!("entailment unavailable, degrading claim verification");
                return ClaimReport {
                    scored: claims.iter().map(|c| (c.clone(), 0.0, false)).collect(),
                    coverage: 0.0,
                    degraded: true,
                    evidence: Vec::new(),
                };
            }
        }
    }

    let per_claim = premises.len();
    let mut scored = Vec::with_capacity(claims.len());
    let mut evidence = Vec::new();
    let mut supported_count = 0usize;
    for (i, claim) in claims.iter().enumerate() {
        let window = &scores[i * per_claim..(i + 1) * per_claim];
        let (best_idx, best) = window
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(idx, s)| (idx, *s))
            .unwrap_or((0, 0.0));
        // A score exactly at the floor counts as supported.
        let supported = best >= config.entailment_floor;
        if supported {
            supported_count += 1;
            let cref = premises[best_idx].0.clone();
            if !evidence.contains(&cref) {
                evidence.push(cref);
            }
        }
        scored.push((claim.clone(), best, supported));
    }

    ClaimReport {
        scored,
        coverage: supported_count as f32 / claims.len() as f32,
        degraded: false,
        evidence,
    }
}
