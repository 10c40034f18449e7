//! Component traits for the conversational RAG backend.
//!
//! Every non-trivial component (C1-C4, C9) is defined here as a trait so
//! implementations are pluggable and testable behind mocks, matching the
//! teacher's trait-per-component convention (`core::traits::{speech,llm,
//! retriever,...}`).

mod embedding;
mod llm;
mod reranker;
mod retriever;
mod session_store;
mod vector_store;

pub use embedding::EmbeddingProvider;
pub use llm::AgentLlm;
pub use reranker::Reranker;
pub use retriever::Retriever;
pub use session_store::{check_ownership, SessionError, SessionStore};
pub use vector_store::VectorStore;
