//! Reranker (C2): `CrossEncoderReranker` calls an external HTTP cross-encoder
//! service — the model itself is an out-of-scope external collaborator, so
//! there is no in-process inference path here. The teacher's in-process
//! ONNX early-exit cascade reranker had no counterpart in this system and
//! was dropped; its Jaccard-overlap prefilter survives as `SimpleScorer`, a
//! deterministic `Reranker` test double.

use std::time::Duration;

use async_trait::async_trait;
use medrag_core::{Error as CoreError, Reranker, Result as CoreResult};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Calls an external cross-encoder HTTP service with bounded retry/backoff,
/// the same shape as `medrag_rag::embeddings`'s `retrying_post`.
pub struct CrossEncoderReranker {
    client: Client,
    endpoint: String,
    max_retries: u32,
}

impl CrossEncoderReranker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    passages: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<f32>,
}

#[async_trait]
impl Reranker for CrossEncoderReranker {
    async fn rerank(&self, query: &str, passages: &[String]) -> CoreResult<Vec<f32>> {
        let request = RerankRequest { query, passages };
        let mut backoff = Duration::from_millis(200);
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "rerank request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(response) if response.status().is_success() => {
                    let parsed: RerankResponse = response
                        .json()
                        .await
                        .map_err(|e| CoreError::Component(e.to_string()))?;
                    return Ok(parsed.scores);
                }
                Ok(response) if response.status().is_server_error() => {
                    last_error = Some(format!("server error {}", response.status()));
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(CoreError::Component(format!("{status}: {body}")));
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        Err(CoreError::Component(
            last_error.unwrap_or_else(|| "max retries exceeded".to_string()),
        ))
    }
}

/// Jaccard keyword-overlap scorer, repurposed as a deterministic `Reranker`
/// test double (no live cross-encoder needed).
pub struct SimpleScorer;

impl SimpleScorer {
    pub fn score(query: &str, document: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let doc_lower = document.to_lowercase();

        let query_words: std::collections::HashSet<&str> = query_lower.split_whitespace().collect();
        let doc_words: std::collections::HashSet<&str> = doc_lower.split_whitespace().collect();

        let overlap = query_words.intersection(&doc_words).count();
        let union = query_words.union(&doc_words).count();

        if union > 0 {
            overlap as f32 / union as f32
        } else {
            0.0
        }
    }
}

#[async_trait]
impl Reranker for SimpleScorer {
    async fn rerank(&self, query: &str, passages: &[String]) -> CoreResult<Vec<f32>> {
        Ok(passages.iter().map(|p| Self::score(query, p)).collect())
    }
}
