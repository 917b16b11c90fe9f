pub mod embedding;
pub mod entailment;
pub mod llm;

use thiserror::Error;

/// Failure surface shared by the external collaborators. The pipeline
/// treats `Unavailable` as a degradation signal, everything else as a
/// per-call error.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator call timed out")]
    Timeout,
    #[error("collaborator returned malformed payload: {0}")]
    Malformed(String),
}
