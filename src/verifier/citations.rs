//! Content-addressed evidence store. Every cited quote is stored by the
//! sha256 of its bytes; a citation resolves only while the stored bytes
//! still hash to the reference. Forgetting memory never cascades here:
//! citations are evidence with their own retention.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::wall::audit::sha256_hex;

/// One piece of retrieved evidence: where it came from, the byte range
/// in the source, and the digest of the quoted bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRef {
    pub source_uri: String,
    pub byte_span: (usize, usize),
    pub content_hash: String,
}

pub trait CitationStore: Send + Sync {
    /// Store quoted bytes, returning the resolvable reference.
    fn put(&self, source_uri: &str, byte_span: (usize, usize), bytes: &[u8]) -> CitationRef;
    fn get(&self, content_hash: &str) -> Option<Vec<u8>>;
    /// True when the stored bytes still hash to the reference.
    fn verify_hash(&self, citation: &CitationRef) -> bool;
}

#[derive(Default)]
pub struct InMemoryCitationStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryCitationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CitationStore for InMemoryCitationStore {
    fn put(&self, source_uri: &str, byte_span: (usize, usize), bytes: &[u8]) -> CitationRef {
        let content_hash = sha256_hex(bytes);
        self.blobs
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(content_hash.clone(), bytes.to_vec());
        CitationRef {
            source_uri: source_uri.to_string(),
            byte_span,
            content_hash,
        }
    }

    fn get(&self, content_hash: &str) -> Option<Vec<u8>> {
        self.blobs
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .get(content_hash)
            .cloned()
    }

    fn verify_hash(&self, citation: &CitationRef) -> bool {
        match self.get(&citation.content_hash) {
            Some(bytes) => sha256_hex(&bytes) == citation.content_hash,
            None => false,
        }
    }
}
