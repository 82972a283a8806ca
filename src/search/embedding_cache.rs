//! Process-local cache of computed text embeddings.
//!
//! Purely an optimization: it may be cleared at any moment without
//! correctness loss (a cold cache is the worst case, not an error state).
//! Growth is unbounded for the process lifetime, matching app behavior.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;

use super::embedding_engine::Embedder;

fn normalize_key(text: &str) -> String {
    text.trim().to_lowercase()
}

#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: Mutex<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        self.entries
            .lock()
            .expect("embedding cache poisoned")
            .get(&normalize_key(text))
            .cloned()
    }

    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.entries
            .lock()
            .expect("embedding cache poisoned")
            .insert(normalize_key(text), vector);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("embedding cache poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("embedding cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embeds `text` through the cache: a hit skips the embedding call entirely,
/// a miss computes and stores the vector.
pub async fn embed_with_cache(
    embedder: &dyn Embedder,
    cache: &EmbeddingCache,
    text: &str,
) -> Result<Option<Vec<f32>>> {
    if let Some(hit) = cache.get(text) {
        tracing::debug!(text_len = text.len(), "embedding cache hit");
        return Ok(Some(hit));
    }
    let embedded = embedder.embed_one(text).await?;
    if let Some(vector) = &embedded {
        cache.set(text, vector.clone());
    }
    Ok(embedded)
}
