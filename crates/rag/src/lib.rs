//! Hybrid retrieval for the conversational RAG backend.
//!
//! - `embeddings`: `EmbeddingProvider` impls selected by `EMBEDDING_PROVIDER`.
//! - `vector_store`: Postgres/pgvector/pg_trgm-backed `VectorStore`.
//! - `reranker`: `CrossEncoderReranker`, the external cross-encoder client.
//! - `retriever`: Simple/Rerank/Advanced `Retriever` strategies.
//! - `query_expansion`: LLM-driven query expansion for Strategy A.

pub mod embeddings;
pub mod query_expansion;
pub mod reranker;
pub mod retriever;
pub mod vector_store;

pub use embeddings::{AliyunEmbeddingProvider, LocalEmbeddingProvider, OpenAiCompatibleEmbeddingProvider};
pub use query_expansion::{ExpansionStats, QueryExpander};
pub use reranker::{CrossEncoderReranker, SimpleScorer};
pub use retriever::{AdvancedRetriever, RerankRetriever, SimpleRetriever};
pub use vector_store::PostgresVectorStore;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Reranker error: {0}")]
    Reranker(String),

    #[error("Timeout")]
    Timeout,
}

impl From<RagError> for medrag_core::Error {
    fn from(err: RagError) -> Self {
        medrag_core::Error::Component(err.to_string())
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::VectorStore(err.to_string())
    }
}
