//! Shared error type for the core crate

use thiserror::Error;

/// Core-level error, mostly surfaced through the domain-type constructors
/// (`Chunk::new`, `Session::assign_agent`, ...).
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("session invariant violated: {0}")]
    InvalidSession(String),

    #[error("invalid auth token: {0}")]
    InvalidAuthToken(String),

    /// Catch-all for component-level failures (LLM/vector-store/embedding
    /// adapters) that don't correspond to a domain-invariant violation.
    /// Each adapter crate keeps its own richer error enum and converts into
    /// this variant at the trait boundary.
    #[error("component error: {0}")]
    Component(String),
}

pub type Result<T> = std::result::Result<T, Error>;
