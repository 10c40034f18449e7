//! EmbeddingProvider impls (C1) — selected at startup by `EMBEDDING_PROVIDER`.
//!
//! Same retry-loop-with-exponential-backoff shape as
//! `medrag_llm::backend::OpenAiCompatibleBackend` (`crates/llm/src/backend.rs`),
//! reused here for embedding HTTP calls. The embedding model itself is an
//! external collaborator per spec §1 — these wrap whichever HTTP endpoint
//! hosts it, never run inference in-process.

use std::time::Duration;

use async_trait::async_trait;
use medrag_core::{EmbeddingProvider, Error as CoreError, Result as CoreResult};
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::RagError;

const DEFAULT_BATCH_CAP: usize = 10;

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Record the learned dimension in `cell` on first call; on later calls,
/// confirm the provider hasn't silently changed output size.
fn check_dimension(cell: &OnceCell<usize>, dim: usize) -> CoreResult<()> {
    match cell.get() {
        Some(&expected) if expected != dim => Err(CoreError::Component(format!(
            "embedding dimension mismatch: expected {expected}, got {dim}"
        ))),
        Some(_) => Ok(()),
        None => {
            let _ = cell.set(dim);
            Ok(())
        }
    }
}

async fn retrying_post<T: Serialize, R: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    bearer: Option<&str>,
    body: &T,
    max_retries: u32,
) -> Result<R, RagError> {
    let mut backoff = Duration::from_millis(200);
    let mut last_error = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tracing::warn!(attempt, ?backoff, "embedding request failed, retrying");
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                return response
                    .json::<R>()
                    .await
                    .map_err(|e| RagError::Embedding(e.to_string()));
            }
            Ok(response) if response.status().is_server_error() => {
                last_error = Some(RagError::Embedding(format!("server error {}", response.status())));
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(RagError::Embedding(format!("{status}: {body}")));
            }
            Err(e) => last_error = Some(RagError::Embedding(e.to_string())),
        }
    }

    Err(last_error.unwrap_or_else(|| RagError::Embedding("max retries exceeded".to_string())))
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// Same-host HTTP sidecar hosting the embedding model — "local" means
/// same-host, not in-process ONNX (spec §1 keeps the model itself external).
pub struct LocalEmbeddingProvider {
    client: Client,
    endpoint: String,
    model: String,
    dimension: OnceCell<usize>,
    batch_cap: usize,
}

impl LocalEmbeddingProvider {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            dimension: OnceCell::new(),
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn encode(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_cap.max(1)) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: chunk,
            };
            let response: EmbeddingResponse =
                retrying_post(&self.client, &self.endpoint, None, &request, 3)
                    .await
                    .map_err(|e| CoreError::Component(e.to_string()))?;
            for mut vector in response.data.into_iter().map(|d| d.embedding) {
                l2_normalize(&mut vector);
                check_dimension(&self.dimension, vector.len())?;
                out.push(vector);
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// OpenAI-compatible remote embedding endpoint. Spec §6's env enum literal is
/// `openrouter`; the conceptual family is "remote-openai-compatible" (see
/// DESIGN.md Open Question).
pub struct OpenAiCompatibleEmbeddingProvider {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    dimension: OnceCell<usize>,
    batch_cap: usize,
}

impl OpenAiCompatibleEmbeddingProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension: OnceCell::new(),
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleEmbeddingProvider {
    async fn encode(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base.trim_end_matches('/'));
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_cap.max(1)) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: chunk,
            };
            let response: EmbeddingResponse =
                retrying_post(&self.client, &url, Some(&self.api_key), &request, 3)
                    .await
                    .map_err(|e| CoreError::Component(e.to_string()))?;
            for mut vector in response.data.into_iter().map(|d| d.embedding) {
                l2_normalize(&mut vector);
                check_dimension(&self.dimension, vector.len())?;
                out.push(vector);
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn name(&self) -> &str {
        "remote-openai-compatible"
    }
}

/// Aliyun (DashScope-compatible) remote embedding endpoint.
pub struct AliyunEmbeddingProvider {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
    dimension: OnceCell<usize>,
    batch_cap: usize,
}

impl AliyunEmbeddingProvider {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            dimension: OnceCell::new(),
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for AliyunEmbeddingProvider {
    async fn encode(&self, texts: &[String]) -> CoreResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.api_base.trim_end_matches('/'));
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_cap.max(1)) {
            let request = EmbeddingRequest {
                model: &self.model,
                input: chunk,
            };
            let response: EmbeddingResponse =
                retrying_post(&self.client, &url, Some(&self.api_key), &request, 3)
                    .await
                    .map_err(|e| CoreError::Component(e.to_string()))?;
            for mut vector in response.data.into_iter().map(|d| d.embedding) {
                l2_normalize(&mut vector);
                check_dimension(&self.dimension, vector.len())?;
                out.push(vector);
            }
        }
        Ok(out)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension.get().copied()
    }

    fn name(&self) -> &str {
        "remote-aliyun"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_zero_vector_stays_zero() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn provider_names_match_spec_families() {
        let local = LocalEmbeddingProvider::new("http://sidecar", "m");
        let remote = OpenAiCompatibleEmbeddingProvider::new("http://api", "key", "m");
        let aliyun = AliyunEmbeddingProvider::new("http://api", "key", "m");
        assert_eq!(local.name(), "local");
        assert_eq!(remote.name(), "remote-openai-compatible");
        assert_eq!(aliyun.name(), "remote-aliyun");
    }

    #[test]
    fn dimension_is_none_before_first_encode() {
        let local = LocalEmbeddingProvider::new("http://sidecar", "m");
        assert_eq!(local.dimension(), None);
    }

    #[test]
    fn check_dimension_accepts_consistent_size() {
        let cell = OnceCell::new();
        assert!(check_dimension(&cell, 384).is_ok());
        assert!(check_dimension(&cell, 384).is_ok());
    }

    #[test]
    fn check_dimension_rejects_change() {
        let cell = OnceCell::new();
        assert!(check_dimension(&cell, 384).is_ok());
        assert!(check_dimension(&cell, 768).is_err());
    }
}
