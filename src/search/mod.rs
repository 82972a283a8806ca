pub mod embedding_cache;
pub mod embedding_engine;
pub mod semantic_dedup;
pub mod vector_index;

pub use embedding_cache::{embed_with_cache, EmbeddingCache};
pub use embedding_engine::{Embedder, EmbeddingEngine, NullEmbedder, EMBEDDING_DIMENSION};
pub use semantic_dedup::{DuplicateVerdict, SemanticDuplicateChecker, DUPLICATE_SCORE_THRESHOLD};
pub use vector_index::{ScoredHit, VectorIndex, VectorRecord, VectorSearch};
