//! Retriever trait — narrowed per spec §9's redesign note: a single
//! `retrieve` operation taking a `QueryInput`, no duck-typed string-or-list
//! overload, no agentic/prefetch/cache surface (the teacher's
//! `retrieve_agentic`/`prefetch`/`clear_cache` have no spec counterpart).

use async_trait::async_trait;
use std::time::Instant;

use crate::{QueryInput, Result, RetrievalResult};

/// One of the three retrieval strategies (Simple, Rerank, Advanced).
/// Grounded on `core::traits::retriever::Retriever` in the teacher, narrowed
/// to exactly the contract spec §4.5 names.
#[async_trait]
pub trait Retriever: Send + Sync + 'static {
    /// Retrieve chunks for `input`, returning at most `top_k` results
    /// ordered by final relevance. `deadline` bounds every suspension point
    /// inside the call (embedding, search, rerank).
    async fn retrieve(
        &self,
        input: QueryInput,
        top_k: usize,
        deadline: Instant,
    ) -> Result<RetrievalResult>;

    /// Retriever name for logging/event metadata.
    fn name(&self) -> &str;
}
