//! LLM-driven query expansion for `AdvancedRetriever` (Strategy A).
//!
//! Replaces the teacher's static synonym/transliteration dictionary lookup
//! with a single `AgentLlm::generate` call that proposes query variations
//! directly, post-filtered into a bounded list. The config/stats scaffolding
//! shape is carried over from the teacher's `QueryExpansionConfig`/
//! `ExpansionStats`.

use std::sync::Arc;

use medrag_core::{AgentLlm, Message, QueryInput, Result as CoreResult};

const EXPANSION_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct QueryExpansionConfig {
    /// Upper bound on the number of query variations returned, including
    /// the original query.
    pub max_queries: usize,
}

impl Default for QueryExpansionConfig {
    fn default() -> Self {
        Self { max_queries: 4 }
    }
}

/// Outcome of one `QueryExpander::expand` call, for logging/event metadata.
#[derive(Debug, Clone, Default)]
pub struct ExpansionStats {
    pub queries_generated: usize,
    pub was_expanded: bool,
}

pub struct QueryExpander {
    llm: Arc<dyn AgentLlm>,
    config: QueryExpansionConfig,
}

impl QueryExpander {
    pub fn new(llm: Arc<dyn AgentLlm>, config: QueryExpansionConfig) -> Self {
        Self { llm, config }
    }

    /// Ask the LLM for alternate phrasings of the latest message in `input`,
    /// grounded in the input's full formatted context (the recent-message
    /// window for `QueryInput::Window`, not just its last line), returning
    /// the original query plus up to `max_queries - 1` variations. Falls
    /// back to `[query]` alone if the LLM call fails or every candidate is
    /// filtered out.
    pub async fn expand(&self, input: &QueryInput) -> CoreResult<(Vec<String>, ExpansionStats)> {
        let query = input.primary_text().unwrap_or_default().to_string();
        let context = input.formatted_context();
        let prompt = format!(
            "Rewrite the latest question below as {} alternative search queries \
             that would retrieve the same information from a medical reference \
             corpus, using the conversation so far for context (e.g. to resolve \
             pronouns or follow-up references). Vary terminology and phrasing. \
             Reply with one query per line and nothing else.\n\nConversation:\n{context}",
            self.config.max_queries.saturating_sub(1).max(1),
        );
        let messages = [Message::user(prompt)];

        let raw = match self.llm.generate(&messages, EXPANSION_TEMPERATURE).await {
            Ok(text) => text,
            Err(_) => {
                return Ok((
                    vec![query],
                    ExpansionStats { queries_generated: 1, was_expanded: false },
                ));
            }
        };

        let mut variations = filter_variations(&raw, &query, self.config.max_queries - 1);
        let was_expanded = !variations.is_empty();

        let mut queries = Vec::with_capacity(variations.len() + 1);
        queries.push(query);
        queries.append(&mut variations);

        let stats = ExpansionStats { queries_generated: queries.len(), was_expanded };
        Ok((queries, stats))
    }
}

/// Trim/drop-empty-or-punctuation-only/dedupe(case-insensitive, preserving
/// first occurrence)/truncate the LLM's newline-delimited output, excluding
/// anything identical to `original`.
fn filter_variations(raw: &str, original: &str, max: usize) -> Vec<String> {
    let original_lower = original.trim().to_lowercase();
    let mut seen = std::collections::HashSet::new();
    seen.insert(original_lower);

    let mut out = Vec::new();
    for line in raw.lines() {
        let candidate = line.trim().trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == '-' || c == ')').trim();
        if candidate.is_empty() {
            continue;
        }
        if candidate.chars().all(|c| c.is_ascii_punctuation() || c.is_whitespace()) {
            continue;
        }
        let key = candidate.to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        out.push(candidate.to_string());
        if out.len() >= max {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use medrag_core::{Error, Result};
    use tokio::sync::mpsc;

    struct StubLlm {
        response: String,
    }

    #[async_trait]
    impl AgentLlm for StubLlm {
        async fn generate(&self, _messages: &[Message], _temperature: f32) -> Result<String> {
            Ok(self.response.clone())
        }
        async fn generate_stream(&self, _: &[Message], _: f32, _: mpsc::Sender<String>) -> Result<()> {
            Ok(())
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl AgentLlm for FailingLlm {
        async fn generate(&self, _messages: &[Message], _temperature: f32) -> Result<String> {
            Err(Error::Component("unavailable".to_string()))
        }
        async fn generate_stream(&self, _: &[Message], _: f32, _: mpsc::Sender<String>) -> Result<()> {
            Ok(())
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn expand_includes_original_plus_variations() {
        let llm = Arc::new(StubLlm {
            response: "What are the side effects of aspirin?\nAspirin adverse reactions\n".to_string(),
        });
        let expander = QueryExpander::new(llm, QueryExpansionConfig::default());
        let (queries, stats) = expander
            .expand(&QueryInput::Last("aspirin side effects".to_string()))
            .await
            .unwrap();
        assert_eq!(queries[0], "aspirin side effects");
        assert!(queries.len() > 1);
        assert!(stats.was_expanded);
    }

    #[tokio::test]
    async fn expand_drops_duplicate_and_empty_lines() {
        let llm = Arc::new(StubLlm {
            response: "aspirin side effects\n\n   \nAspirin Side Effects\nwhat else".to_string(),
        });
        let expander = QueryExpander::new(llm, QueryExpansionConfig::default());
        let (queries, _) = expander
            .expand(&QueryInput::Last("aspirin side effects".to_string()))
            .await
            .unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[1], "what else");
    }

    #[tokio::test]
    async fn expand_falls_back_to_original_on_llm_failure() {
        let expander = QueryExpander::new(Arc::new(FailingLlm), QueryExpansionConfig::default());
        let (queries, stats) = expander
            .expand(&QueryInput::Last("aspirin side effects".to_string()))
            .await
            .unwrap();
        assert_eq!(queries, vec!["aspirin side effects".to_string()]);
        assert!(!stats.was_expanded);
    }

    #[tokio::test]
    async fn expand_truncates_to_max_queries() {
        let llm = Arc::new(StubLlm {
            response: "one\ntwo\nthree\nfour\nfive".to_string(),
        });
        let expander = QueryExpander::new(llm, QueryExpansionConfig { max_queries: 3 });
        let (queries, _) = expander.expand(&QueryInput::Last("original".to_string())).await.unwrap();
        assert_eq!(queries.len(), 3);
    }

    #[tokio::test]
    async fn expand_uses_full_window_as_context_not_just_last_message() {
        let llm = Arc::new(StubLlm { response: "follow-up variant".to_string() });
        let expander = QueryExpander::new(llm, QueryExpansionConfig::default());
        let window = QueryInput::Window(vec![
            Message::user("what is aspirin used for"),
            Message::assistant("it's a pain reliever and anti-inflammatory"),
            Message::user("what about side effects"),
        ]);
        assert!(window.formatted_context().contains("pain reliever"));
        let (queries, _) = expander.expand(&window).await.unwrap();
        assert_eq!(queries[0], "what about side effects");
    }
}
