//! Transcript message types
//!
//! A `Message` is one entry in a session's append-only transcript. This
//! mirrors the shape of `llm_types::Message` (role + content) but carries
//! the per-turn metadata (which agent produced it, which chunks it cites)
//! that the LLM wire format has no use for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AgentName;

/// Role of the speaker that produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata attached to a transcript message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Which agent produced this message (assistant messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentName>,
    /// Source chunk ids cited by this message, if any were retrieved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

/// A single entry in a session's transcript. Append-only: the orchestrator
/// never edits or removes a message once it has been persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_agent(mut self, agent: AgentName) -> Self {
        self.metadata.agent = Some(agent);
        self
    }

    pub fn with_sources(mut self, sources: Vec<String>) -> Self {
        self.metadata.sources = sources;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_builders_set_role() {
        let user = Message::user("hi");
        let asst = Message::assistant("hello").with_agent(AgentName::Emotional);

        assert_eq!(user.role, Role::User);
        assert_eq!(asst.role, Role::Assistant);
        assert_eq!(asst.metadata.agent, Some(AgentName::Emotional));
    }
}
