//! In-process cosine-similarity vector index.
//!
//! Backs the semantic cache: dish embeddings are upserted with their full
//! document as metadata and queried by namespace. Vectors are normalized on
//! insert so similarity is a plain dot product. An optional JSON snapshot
//! (vectors packed as base64 little-endian f32) lets the CLI persist the
//! index between runs; the orchestrator treats the index as ephemeral.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use bytemuck::cast_slice;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub namespace: String,
    #[serde(skip)]
    pub vector: Vec<f32>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// The similarity-search capability consumers depend on. Both methods are
/// best-effort from the orchestrator's point of view: errors are logged and
/// the dependent optimization is skipped.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    async fn query(
        &self,
        embedding: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredHit>>;
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    dimension: usize,
    records: Vec<VectorRecord>,
    #[serde(with = "base64_floats")]
    matrix: Vec<f32>,
}

mod base64_floats {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vec: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        let b64 = general_purpose::STANDARD.encode(cast_slice(vec));
        serializer.serialize_str(&b64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                chunk
                    .try_into()
                    .map(f32::from_le_bytes)
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

struct IndexState {
    records: Vec<VectorRecord>,
    /// Row i holds the normalized vector for records[i].
    matrix: Vec<f32>,
    positions: HashMap<String, usize>,
}

pub struct VectorIndex {
    dimension: usize,
    state: Mutex<IndexState>,
}

fn normalize(vector: &[f32]) -> Vec<f32> {
    let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / magnitude).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            state: Mutex::new(IndexState {
                records: Vec::new(),
                matrix: Vec::new(),
                positions: HashMap::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("vector index poisoned").records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn upsert_records(&self, records: Vec<VectorRecord>) -> Result<()> {
        let mut state = self.state.lock().expect("vector index poisoned");
        for mut record in records {
            if record.vector.len() != self.dimension {
                anyhow::bail!(
                    "embedding dimension mismatch for '{}': expected {}, got {}",
                    record.id,
                    self.dimension,
                    record.vector.len()
                );
            }
            let normalized = normalize(&record.vector);
            record.vector = normalized.clone();
            match state.positions.get(&record.id).copied() {
                Some(pos) => {
                    let start = pos * self.dimension;
                    state.matrix[start..start + self.dimension].copy_from_slice(&normalized);
                    state.records[pos] = record;
                }
                None => {
                    let pos = state.records.len();
                    state.positions.insert(record.id.clone(), pos);
                    state.matrix.extend_from_slice(&normalized);
                    state.records.push(record);
                }
            }
        }
        Ok(())
    }

    fn query_records(&self, embedding: &[f32], namespace: &str, top_k: usize) -> Vec<ScoredHit> {
        let state = self.state.lock().expect("vector index poisoned");
        if state.records.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let query = normalize(embedding);
        let dimension = self.dimension;

        let mut scored: Vec<(f32, usize)> = state
            .records
            .par_iter()
            .enumerate()
            .filter(|(_, record)| record.namespace == namespace)
            .map(|(idx, _)| {
                let row = &state.matrix[idx * dimension..(idx + 1) * dimension];
                (dot(row, &query), idx)
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(score, idx)| {
                let record = &state.records[idx];
                ScoredHit {
                    id: record.id.clone(),
                    score,
                    metadata: record.metadata.clone(),
                }
            })
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.state.lock().expect("vector index poisoned");
        let snapshot = Snapshot {
            dimension: self.dimension,
            records: state.records.clone(),
            matrix: state.matrix.clone(),
        };
        let serialized = serde_json::to_string(&snapshot)?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write vector index snapshot to {:?}", path))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read vector index snapshot from {:?}", path))?;
        let mut snapshot: Snapshot = serde_json::from_str(&contents)?;
        let expected = snapshot.records.len() * snapshot.dimension;
        if snapshot.matrix.len() != expected {
            anyhow::bail!(
                "vector index snapshot corrupt: matrix has {} floats, expected {}",
                snapshot.matrix.len(),
                expected
            );
        }
        // vectors are skipped during serialization, restore them from the matrix
        for (idx, record) in snapshot.records.iter_mut().enumerate() {
            let start = idx * snapshot.dimension;
            record.vector = snapshot.matrix[start..start + snapshot.dimension].to_vec();
        }
        let positions = snapshot
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        Ok(Self {
            dimension: snapshot.dimension,
            state: Mutex::new(IndexState {
                records: snapshot.records,
                matrix: snapshot.matrix,
                positions,
            }),
        })
    }
}

#[async_trait]
impl VectorSearch for VectorIndex {
    async fn query(
        &self,
        embedding: &[f32],
        namespace: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredHit>> {
        if embedding.len() != self.dimension {
            anyhow::bail!(
                "query embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }
        Ok(self.query_records(embedding, namespace, top_k))
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        self.upsert_records(records)
    }
}
