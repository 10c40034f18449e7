//! Retrieval result types shared between the rag and agent crates.

use serde::{Deserialize, Serialize};

use crate::Chunk;

/// Which search modality (or fusion of modalities) produced a scored chunk.
/// Grounded on the teacher's `rag::retriever::SearchSource` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Dense,
    Sparse,
    Hybrid,
}

/// A chunk plus the scores and final rank it was retrieved with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub dense_score: Option<f32>,
    pub rerank_score: Option<f32>,
    pub rank: usize,
    pub source: SearchSource,
}

/// The ordered output of a `Retriever::retrieve` call.
pub type RetrievalResult = Vec<ScoredChunk>;
