//! HTTP/SSE server for the conversational RAG backend.

pub mod auth;
pub mod http;

pub use auth::auth_middleware;
pub use http::create_router;

use axum::http::StatusCode;
use thiserror::Error;

/// Server-layer errors — spec §7's HTTP-facing taxonomy.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("missing authorization header")]
    AuthMissing,

    #[error("invalid bearer token")]
    AuthInvalid,

    #[error("session ownership violation")]
    OwnershipViolation,

    #[error("session missing or expired")]
    SessionMissing,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServerError> for StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::AuthMissing | ServerError::AuthInvalid => StatusCode::UNAUTHORIZED,
            ServerError::OwnershipViolation => StatusCode::FORBIDDEN,
            ServerError::SessionMissing => StatusCode::NOT_FOUND,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<medrag_agent::AgentError> for ServerError {
    fn from(err: medrag_agent::AgentError) -> Self {
        match err {
            medrag_agent::AgentError::OwnershipViolation => ServerError::OwnershipViolation,
            medrag_agent::AgentError::SessionUnavailable => ServerError::SessionMissing,
            other => ServerError::Internal(other.to_string()),
        }
    }
}
