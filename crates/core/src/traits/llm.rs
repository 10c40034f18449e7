//! AgentLLM trait — the chat-completion client contract (C5).
//!
//! The teacher carries two LLM trait layers: `core::traits::llm::LanguageModel`
//! (tool-calling, `Pin<Box<dyn Stream>>` streaming) and
//! `llm::backend::LlmBackend` (simpler, channel-based streaming). Spec's
//! AgentLLM needs no tool-calling, so only the simpler single-trait shape is
//! carried forward here, under the `AgentLlm` name used throughout this
//! workspace.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Message, Result};

#[async_trait]
pub trait AgentLlm: Send + Sync {
    /// Generate a full completion (non-streaming) — used by the Supervisor
    /// classifier and the query-expansion LLM call.
    async fn generate(&self, messages: &[Message], temperature: f32) -> Result<String>;

    /// Generate a completion, forwarding each token/delta through `tx` as it
    /// arrives. A closed channel is treated as caller-initiated cancellation
    /// and ends generation without error.
    async fn generate_stream(
        &self,
        messages: &[Message],
        temperature: f32,
        tx: mpsc::Sender<String>,
    ) -> Result<()>;

    /// Model name, for logging.
    fn model_name(&self) -> &str;

    /// Rough token estimate for a piece of text (no tokenizer dependency).
    fn estimate_tokens(&self, text: &str) -> usize {
        text.len() / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockLlm;

    #[async_trait]
    impl AgentLlm for MockLlm {
        async fn generate(&self, _messages: &[Message], _temperature: f32) -> Result<String> {
            Ok("mock response".to_string())
        }

        async fn generate_stream(
            &self,
            _messages: &[Message],
            _temperature: f32,
            tx: mpsc::Sender<String>,
        ) -> Result<()> {
            let _ = tx.send("mock response".to_string()).await;
            Ok(())
        }

        fn model_name(&self) -> &str {
            "mock-llm"
        }
    }

    #[tokio::test]
    async fn generate_returns_text() {
        let llm = MockLlm;
        let response = llm.generate(&[Message::user("hi")], 0.1).await.unwrap();
        assert_eq!(response, "mock response");
    }

    #[test]
    fn estimate_tokens_is_positive_for_nonempty_text() {
        let llm = MockLlm;
        assert!(llm.estimate_tokens("Hello world") > 0);
    }
}
