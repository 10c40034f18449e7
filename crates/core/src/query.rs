//! Query extraction from the transcript.
//!
//! Spec §9 flags the source's "duck-typed retriever accepting string or
//! message list" as something to redesign: a single enum input replaces the
//! overload, with string-only callers wrapping in a single-element list at
//! the boundary.

use crate::Message;

/// What a retrieval strategy consumes: either the bare latest user message
/// (Strategies S and R) or a formatted window of recent messages
/// (Strategy A).
#[derive(Debug, Clone)]
pub enum QueryInput {
    Last(String),
    Window(Vec<Message>),
}

impl QueryInput {
    /// The text a retriever should embed/search on, regardless of shape:
    /// for `Window`, the most recent user message in the window.
    pub fn primary_text(&self) -> Option<&str> {
        match self {
            QueryInput::Last(text) => Some(text.as_str()),
            QueryInput::Window(messages) => messages
                .iter()
                .rev()
                .find(|m| m.role == crate::Role::User)
                .map(|m| m.content.as_str()),
        }
    }

    /// The full context a query-expansion LLM call should see: for `Last`,
    /// just the bare text; for `Window`, every message in the window
    /// formatted as "role: content" lines, oldest first.
    pub fn formatted_context(&self) -> String {
        match self {
            QueryInput::Last(text) => text.clone(),
            QueryInput::Window(messages) => messages
                .iter()
                .map(|m| format!("{}: {}", m.role, m.content))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Extract a `QueryInput` from a session transcript per spec §4.5's history
/// formatting rule (a configurable tail window, default 5).
pub fn extract_query(transcript: &[Message], window: usize) -> QueryInput {
    if window <= 1 {
        let last = transcript
            .iter()
            .rev()
            .find(|m| m.role == crate::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        return QueryInput::Last(last);
    }
    let start = transcript.len().saturating_sub(window);
    QueryInput::Window(transcript[start..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;

    #[test]
    fn window_one_yields_last_message_only() {
        let transcript = vec![Message::user("first"), Message::user("second")];
        match extract_query(&transcript, 1) {
            QueryInput::Last(text) => assert_eq!(text, "second"),
            _ => panic!("expected Last"),
        }
    }

    #[test]
    fn window_n_yields_tail_slice() {
        let transcript = vec![
            Message::user("a"),
            Message::assistant("b"),
            Message::user("c"),
        ];
        match extract_query(&transcript, 5) {
            QueryInput::Window(messages) => assert_eq!(messages.len(), 3),
            _ => panic!("expected Window"),
        }
    }

    #[test]
    fn primary_text_finds_last_user_message_in_window() {
        let transcript = vec![Message::user("q1"), Message::assistant("a1"), Message::user("q2")];
        let input = extract_query(&transcript, 5);
        assert_eq!(input.primary_text(), Some("q2"));
    }
}
