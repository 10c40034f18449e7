//! OpenAI-compatible chat completion client for the conversational RAG
//! backend (C7: AgentLLM).
//!
//! Speculative SLM-racing and the multi-backend (Ollama/Claude/OpenAI)
//! abstraction from the teacher crate have no counterpart here — one
//! `AgentLlm` impl targets the single OpenAI-compatible endpoint named by
//! `OPENAI_API_BASE`/`MODEL_NAME` (spec §6).

pub mod backend;

pub use backend::{LlmConfig, OpenAiCompatibleBackend};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for medrag_core::Error {
    fn from(err: LlmError) -> Self {
        medrag_core::Error::Component(err.to_string())
    }
}
