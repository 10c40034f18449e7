//! Reranker trait (C2) — spec §4.3.

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Score each passage against `query`. Scores are monotonic in
    /// relevance and deterministic for identical input; callers sort
    /// descending themselves.
    async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<f32>>;
}
