//! `Supervisor` (C6) — first-turn agent classification, spec §4.6.
//!
//! No direct teacher file (the teacher's `GoldLoanAgent` is hardwired to one
//! domain); grounded in the general "LLM call with a strict output contract,
//! bounded retry" idiom from `llm::backend`'s retry loop, combined with the
//! redesign note replacing structured-output parsing with a small explicit
//! validator plus one bounded retry.

use std::str::FromStr;
use std::sync::Arc;

use medrag_core::{AgentLlm, AgentName, Message};

use crate::AgentError;

const CLASSIFY_TEMPERATURE: f32 = 0.1;

fn classify_prompt(first_message: &str) -> String {
    format!(
        "Classify the following user message into exactly one category: \
         \"emotional\" (the user wants empathetic conversation, venting, or \
         emotional support) or \"rag\" (the user is asking a factual or \
         medical question that needs reference material). Reply with only \
         the single word \"emotional\" or \"rag\" and nothing else.\n\n\
         Message: {first_message}"
    )
}

pub struct Supervisor {
    llm: Arc<dyn AgentLlm>,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn AgentLlm>) -> Self {
        Self { llm }
    }

    /// Classify the session's first message into an `AgentName`. Re-asks
    /// once on an unparseable response; a second miss is a hard failure.
    pub async fn classify(&self, first_message: &str) -> Result<AgentName, AgentError> {
        let messages = [Message::user(classify_prompt(first_message))];

        for _ in 0..2 {
            let response = self
                .llm
                .generate(&messages, CLASSIFY_TEMPERATURE)
                .await
                .map_err(|e| AgentError::Llm(e.to_string()))?;
            if let Ok(name) = AgentName::from_str(response.trim()) {
                return Ok(name);
            }
            tracing::warn!(response = %response, "supervisor classification unparseable, retrying");
        }

        Err(AgentError::Classification(
            "supervisor could not classify the first message after retry".to_string(),
        ))
    }
}
