use async_trait::async_trait;

use super::embedding::tokenize;
use super::ServiceError;

/// Natural-language entailment collaborator: how strongly does `premise`
/// support `hypothesis`, in [0, 1]. The batch form is the required surface;
/// the verifier always calls in bounded batches.
#[async_trait]
pub trait EntailmentModel: Send + Sync {
    async fn score_batch(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<f32>, ServiceError>;

    async fn score(&self, premise: &str, hypothesis: &str) -> Result<f32, ServiceError> {
        let scores = self
            .score_batch(&[(premise.to_string(), hypothesis.to_string())])
            .await?;
        scores
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::Malformed("empty batch result".into()))
    }
}

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "of", "in",
    "on", "at", "to", "for", "and", "or", "it", "its", "this", "that", "with",
    "as", "by", "from", "you", "your", "i", "my", "we", "our",
];

fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Deterministic keyword-overlap entailment for offline use and tests:
/// the fraction of the hypothesis' content tokens present in the premise.
pub struct KeywordEntailment;

#[async_trait]
impl EntailmentModel for KeywordEntailment {
    async fn score_batch(
        &self,
        pairs: &[(String, String)],
    ) -> Result<Vec<f32>, ServiceError> {
        Ok(pairs
            .iter()
            .map(|(premise, hypothesis)| {
                let premise_tokens = content_tokens(premise);
                let hypothesis_tokens = content_tokens(hypothesis);
                if hypothesis_tokens.is_empty() {
                    return 0.0;
                }
                let hits = hypothesis_tokens
                    .iter()
                    .filter(|t| premise_tokens.contains(t))
                    .count();
                hits as f32 / hypothesis_tokens.len() as f32
            })
            .collect())
    }
}

/// Always-failing entailment used to exercise the degraded-verifier path.
pub struct OfflineEntailment;

#[async_trait]
impl EntailmentModel for OfflineEntailment {
    async fn score_batch(
        &self,
        _pairs: &[(String, String)],
    ) -> Result<Vec<f32>, ServiceError> {
        Err(ServiceError::Unavailable("entailment backend offline".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_overlap_scores_one() {
        let scores = KeywordEntailment
            .score_batch(&[(
                "London temperature today reached 18 degrees".into(),
                "London reached 18 degrees".into(),
            )])
            .await
            .unwrap();
        assert!((scores[0] - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn disjoint_text_scores_zero() {
        let score = KeywordEntailment
            .score("cats sleep all afternoon", "quantum chips shipped early")
            .await
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[tokio::test]
    async fn batch_preserves_pair_order() {
        let scores = KeywordEntailment
            .score_batch(&[
                ("alpha beta gamma".into(), "alpha beta".into()),
                ("alpha beta gamma".into(), "delta epsilon".into()),
            ])
            .await
            .unwrap();
        assert!(scores[0] > scores[1]);
    }
}
