//! Session, user ownership, and the agent-name enumeration.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Message, Result, Role};

/// The fixed, finite set of agents a session can be assigned to. Once a
/// session's `assigned_agent` is set it is never changed (see
/// [`Session::assign_agent`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Emotional,
    Rag,
}

impl std::str::FromStr for AgentName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "emotional" => Ok(AgentName::Emotional),
            "rag" => Ok(AgentName::Rag),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentName::Emotional => write!(f, "emotional"),
            AgentName::Rag => write!(f, "rag"),
        }
    }
}

/// A user-owned, session-sticky conversation.
///
/// Invariants (see spec §3): belongs to exactly one user for its lifetime;
/// `assigned_agent` is write-once; transcript order is monotonic;
/// `updated_at >= created_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: String,
    pub assigned_agent: Option<AgentName>,
    pub transcript: Vec<Message>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh session owned by `user_id`, as `SessionStore::create` does.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            assigned_agent: None,
            transcript: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the transcript and refresh `updated_at`.
    pub fn push_message(&mut self, message: Message) {
        self.transcript.push(message);
        self.updated_at = Utc::now();
    }

    /// Set `assigned_agent` once. Calling this on an already-assigned
    /// session is a programmer error (the Supervisor only runs when
    /// `assigned_agent` is unset) and returns `InvalidSession`.
    pub fn assign_agent(&mut self, agent: AgentName) -> Result<()> {
        if self.assigned_agent.is_some() {
            return Err(Error::InvalidSession(
                "assigned_agent is write-once and already set".into(),
            ));
        }
        self.assigned_agent = Some(agent);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// The latest user message, if any — used by the classify-node and by
    /// the Simple/Rerank retrieval strategies.
    pub fn last_user_message(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// The last `window` messages, in chronological order — used by the
    /// Advanced retrieval strategy and the query-expansion prompt.
    pub fn tail(&self, window: usize) -> &[Message] {
        let start = self.transcript.len().saturating_sub(window);
        &self.transcript[start..]
    }
}
