//! Semantic duplicate suppression over the vector index.
//!
//! Deciding "we already have this dish" is a cost optimization, never a
//! correctness gate: every failure path here fails open and lets generation
//! proceed.

use std::sync::Arc;

use super::embedding_cache::{embed_with_cache, EmbeddingCache};
use super::embedding_engine::Embedder;
use super::vector_index::{ScoredHit, VectorSearch};

/// Similarity at or above this treats the candidate as a near-identical
/// duplicate. Tunable constant, not derived.
pub const DUPLICATE_SCORE_THRESHOLD: f32 = 0.95;

#[derive(Debug, Clone)]
pub struct DuplicateVerdict {
    pub should_generate: bool,
    pub existing: Option<ScoredHit>,
}

impl DuplicateVerdict {
    fn allow() -> Self {
        Self {
            should_generate: true,
            existing: None,
        }
    }
}

pub struct SemanticDuplicateChecker {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorSearch>,
    cache: Arc<EmbeddingCache>,
    threshold: f32,
}

impl SemanticDuplicateChecker {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorSearch>,
        cache: Arc<EmbeddingCache>,
    ) -> Self {
        Self {
            embedder,
            index,
            cache,
            threshold: DUPLICATE_SCORE_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Looks for a near-identical existing item for `candidate_text` within
    /// `context_tag`. Empty results, an unavailable embedder, or any search
    /// failure all report `should_generate = true`.
    pub async fn check(&self, candidate_text: &str, context_tag: &str) -> DuplicateVerdict {
        if !self.embedder.is_available() {
            return DuplicateVerdict::allow();
        }

        let embedding = match embed_with_cache(self.embedder.as_ref(), &self.cache, candidate_text).await
        {
            Ok(Some(embedding)) => embedding,
            Ok(None) => return DuplicateVerdict::allow(),
            Err(err) => {
                tracing::warn!(error = %err, "embedding failed, skipping duplicate check");
                return DuplicateVerdict::allow();
            }
        };

        let hits = match self.index.query(&embedding, context_tag, 1).await {
            Ok(hits) => hits,
            Err(err) => {
                tracing::warn!(error = %err, "similarity search failed, skipping duplicate check");
                return DuplicateVerdict::allow();
            }
        };

        match hits.into_iter().next() {
            Some(top) if top.score >= self.threshold => {
                tracing::debug!(id = %top.id, score = top.score, "suppressing near-duplicate generation");
                DuplicateVerdict {
                    should_generate: false,
                    existing: Some(top),
                }
            }
            _ => DuplicateVerdict::allow(),
        }
    }
}
