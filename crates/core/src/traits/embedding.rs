//! EmbeddingProvider trait (C1) — spec §4.2.

use async_trait::async_trait;

use crate::Result;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode a batch of texts into dense vectors of the provider's
    /// dimension, preserving arity (one vector per input text).
    /// Implementations batch internally to respect provider limits.
    async fn encode(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// The embedding dimension, once learned from a successful `encode`
    /// call. `None` before the first call.
    fn dimension(&self) -> Option<usize>;

    /// Provider name, for logging.
    fn name(&self) -> &str;
}
