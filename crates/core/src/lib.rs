//! Core traits and shared types for the conversational RAG backend.
//!
//! This crate provides the foundational types used across every other
//! crate in the workspace:
//! - Shared domain types: `Chunk`, `Message`, `Session`, `AuthToken`,
//!   `StreamEvent`, retrieval result types.
//! - Component traits for the pluggable pieces (`EmbeddingProvider`,
//!   `Reranker`, `VectorStore`, `Retriever`, `AgentLlm`, `SessionStore`).
//! - The shared error type.

pub mod auth;
pub mod chunk;
pub mod error;
pub mod llm_types;
pub mod message;
pub mod query;
pub mod retrieval;
pub mod session;
pub mod stream_event;
pub mod traits;

pub use auth::{constant_time_compare, AuthToken};
pub use chunk::Chunk;
pub use error::{Error, Result};
pub use message::{Message, MessageMetadata, Role};
pub use query::{extract_query, QueryInput};
pub use retrieval::{RetrievalResult, ScoredChunk, SearchSource};
pub use session::{AgentName, Session};
pub use stream_event::{ErrorCode, EventContent, StreamEvent, StreamEventType};

pub use traits::{
    check_ownership, AgentLlm, EmbeddingProvider, Reranker, Retriever, SessionError, SessionStore,
    VectorStore,
};
