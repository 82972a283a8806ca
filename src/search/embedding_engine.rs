use anyhow::Result;
use async_trait::async_trait;
use model2vec_rs::model::StaticModel;

const EMBEDDING_MODEL_ID: &str = "minishlab/potion-base-32M";

pub const EMBEDDING_DIMENSION: usize = 512;

/// The embedding capability as consumers see it. `Ok(None)` means the text
/// could not be embedded; an unavailable embedder makes every dependent
/// optimization skip itself rather than fail the request.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }
    async fn embed_one(&self, text: &str) -> Result<Option<Vec<f32>>>;
}

/// Local static-model embedder. Model weights are fetched on first
/// construction, so `new` is fallible and callers fall back to
/// `NullEmbedder` when it cannot load.
pub struct EmbeddingEngine {
    model: StaticModel,
}

impl EmbeddingEngine {
    pub fn new() -> Result<Self> {
        let model = StaticModel::from_pretrained(EMBEDDING_MODEL_ID, None, None, None)?;
        Ok(Self { model })
    }

    pub fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        self.model.encode(texts)
    }
}

#[async_trait]
impl Embedder for EmbeddingEngine {
    async fn embed_one(&self, text: &str) -> Result<Option<Vec<f32>>> {
        let embeddings = self.model.encode(&[text.to_string()]);
        Ok(embeddings.into_iter().next())
    }
}

/// Stand-in used when no embedding model is configured: reports itself
/// unavailable so semantic dedup and vector persistence are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEmbedder;

#[async_trait]
impl Embedder for NullEmbedder {
    fn is_available(&self) -> bool {
        false
    }

    async fn embed_one(&self, _text: &str) -> Result<Option<Vec<f32>>> {
        Ok(None)
    }
}
