//! Agent framework: session storage, first-turn classification, the two
//! agent shapes (emotional / RAG), and the per-request orchestrator.

pub mod orchestrator;
pub mod runner;
pub mod session;
pub mod supervisor;

pub use orchestrator::{Orchestrator, REQUEST_DEADLINE};
pub use runner::{EmotionalAgent, RagAgent, RagRunOutcome, RagStage, MEDICAL_DISCLAIMER};
pub use session::InMemorySessionStore;
pub use supervisor::Supervisor;

use thiserror::Error;

/// Agent-layer errors, spec §7's internal error taxonomy.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("supervisor could not classify the session: {0}")]
    Classification(String),

    #[error("session ownership violation")]
    OwnershipViolation,

    #[error("session missing or expired")]
    SessionUnavailable,

    #[error("conversation error: {0}")]
    Conversation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("request deadline exceeded")]
    Timeout,

    #[error("cancelled: client disconnected")]
    Cancelled,
}

impl From<medrag_core::Error> for AgentError {
    fn from(err: medrag_core::Error) -> Self {
        AgentError::Conversation(err.to_string())
    }
}

impl From<medrag_rag::RagError> for AgentError {
    fn from(err: medrag_rag::RagError) -> Self {
        AgentError::Retrieval(err.to_string())
    }
}
