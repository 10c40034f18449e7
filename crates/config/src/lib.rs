//! Environment-driven configuration for the conversational RAG backend.
//!
//! `Settings` is loaded once at startup from process environment variables
//! (spec §6's flat names — no prefix, no nesting) and handed down through
//! `crates/server`'s `main.rs` to every component constructor.

pub mod settings;

pub use settings::{
    load_settings, EmbeddingConfig, EmbeddingProviderKind, LlmConfig, PostgresConfig,
    RetrievalConfig, RetrievalStrategyKind, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
