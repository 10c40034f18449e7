//! VectorStore trait (C3) — spec §4.4.

use async_trait::async_trait;

use crate::{Chunk, Result};

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Dense ANN search, descending cosine similarity.
    async fn search_dense(&self, vector: &[f32], k: usize) -> Result<Vec<(Chunk, f32)>>;

    /// Sparse trigram search, descending similarity, floor-gated by
    /// `threshold`. Returns `Ok(None)` when the trigram index is absent —
    /// callers must degrade to dense-only rather than fail.
    async fn search_sparse(
        &self,
        text: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Option<Vec<(Chunk, f32)>>>;

    /// Idempotent on `chunk.id`. Used by the offline indexer, not by the
    /// request path.
    async fn upsert(&self, chunk: Chunk) -> Result<()>;

    async fn batch_upsert(&self, chunks: Vec<Chunk>) -> Result<()>;
}
