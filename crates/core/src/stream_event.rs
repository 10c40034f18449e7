//! SSE stream event types — spec §6.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One event on the `/chat` SSE stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "type")]
    pub event_type: StreamEventType,
    pub content: EventContent,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    fn now(event_type: StreamEventType, content: EventContent) -> Self {
        Self {
            event_type,
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn retrieval_start() -> Self {
        Self::now(
            StreamEventType::RetrievalStart,
            EventContent::Stage {
                stage: "retrieval".into(),
                status: "started".into(),
            },
        )
    }

    pub fn retrieval_complete(doc_count: usize) -> Self {
        Self::now(
            StreamEventType::RetrievalComplete,
            EventContent::RetrievalComplete {
                stage: "retrieval".into(),
                status: "complete".into(),
                doc_count,
            },
        )
    }

    pub fn reranking_start() -> Self {
        Self::now(
            StreamEventType::RerankingStart,
            EventContent::Stage {
                stage: "reranking".into(),
                status: "started".into(),
            },
        )
    }

    pub fn reranking_complete(selected: usize) -> Self {
        Self::now(
            StreamEventType::RerankingComplete,
            EventContent::RerankingComplete {
                stage: "reranking".into(),
                status: "complete".into(),
                selected,
            },
        )
    }

    pub fn token(text: impl Into<String>) -> Self {
        Self::now(StreamEventType::Token, EventContent::Token(text.into()))
    }

    pub fn done() -> Self {
        Self::now(StreamEventType::Done, EventContent::Empty {})
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::now(
            StreamEventType::Error,
            EventContent::Error {
                message: message.into(),
                code,
            },
        )
    }

    pub fn cancelled() -> Self {
        Self::now(StreamEventType::Cancelled, EventContent::Empty {})
    }

    /// Whether this event is a terminal event (exactly one per stream).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type,
            StreamEventType::Done | StreamEventType::Error | StreamEventType::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventType {
    RetrievalStart,
    RetrievalComplete,
    RerankingStart,
    RerankingComplete,
    Token,
    Done,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventContent {
    Token(String),
    Stage {
        stage: String,
        status: String,
    },
    RetrievalComplete {
        stage: String,
        status: String,
        doc_count: usize,
    },
    RerankingComplete {
        stage: String,
        status: String,
        selected: usize,
    },
    Error {
        message: String,
        code: ErrorCode,
    },
    Empty {},
}

/// Error codes for the mid-stream `error` event — spec §6/§7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    RetrievalError,
    ProcessingError,
    TimeoutError,
    InternalError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_are_flagged() {
        assert!(StreamEvent::done().is_terminal());
        assert!(StreamEvent::cancelled().is_terminal());
        assert!(StreamEvent::error(ErrorCode::InternalError, "oops").is_terminal());
        assert!(!StreamEvent::token("hi").is_terminal());
        assert!(!StreamEvent::retrieval_start().is_terminal());
    }

    #[test]
    fn serializes_token_as_bare_string_content() {
        let event = StreamEvent::token("hello");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["content"], serde_json::json!("hello"));
        assert_eq!(json["type"], serde_json::json!("token"));
    }

    #[test]
    fn serializes_retrieval_complete_with_doc_count() {
        let event = StreamEvent::retrieval_complete(3);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["content"]["doc_count"], serde_json::json!(3));
    }

    #[test]
    fn serializes_error_with_code() {
        let event = StreamEvent::error(ErrorCode::TimeoutError, "deadline exceeded");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["content"]["code"], serde_json::json!("TIMEOUT_ERROR"));
    }
}
