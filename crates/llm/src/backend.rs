//! OpenAI-compatible chat completion backend.
//!
//! Talks to any `/chat/completions`-shaped endpoint (`OPENAI_API_BASE`) with
//! bearer auth (`OPENAI_API_KEY`). Retry/backoff and the streaming-channel
//! shape are carried over from the teacher's `OllamaBackend`; the wire
//! format is OpenAI SSE (`data: {...}\n\n`, terminated by `data: [DONE]`)
//! rather than Ollama's NDJSON.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use medrag_core::{AgentLlm, Error as CoreError, Message, Result as CoreResult, Role};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::LlmError;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub model: String,
    pub api_base: String,
    pub api_key: String,
    pub max_tokens: usize,
    pub timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl LlmConfig {
    pub fn new(model: impl Into<String>, api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            api_base: api_base.into(),
            api_key: api_key.into(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[Message], temperature: f32, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            stream,
            temperature,
            max_tokens: self.config.max_tokens,
        }
    }

    fn is_retryable(error: &LlmError) -> bool {
        matches!(error, LlmError::Network(_) | LlmError::Timeout)
    }

    async fn execute_non_streaming(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(LlmError::Network(format!("server error {status}: {body}")));
            }
            return Err(LlmError::Api(body));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl AgentLlm for OpenAiCompatibleBackend {
    async fn generate(&self, messages: &[Message], temperature: f32) -> CoreResult<String> {
        let request = self.request_body(messages, temperature, false);

        let mut last_error = None;
        let mut backoff = self.config.initial_backoff;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, ?backoff, "LLM request failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }

            match self.execute_non_streaming(&request).await {
                Ok(response) => {
                    let text = response
                        .choices
                        .into_iter()
                        .next()
                        .map(|c| c.message.content)
                        .unwrap_or_default();
                    return Ok(text);
                }
                Err(e) if Self::is_retryable(&e) => last_error = Some(e),
                Err(e) => return Err(llm_error_to_core(e)),
            }
        }

        Err(llm_error_to_core(
            last_error.unwrap_or_else(|| LlmError::Network("max retries exceeded".to_string())),
        ))
    }

    async fn generate_stream(
        &self,
        messages: &[Message],
        temperature: f32,
        tx: mpsc::Sender<String>,
    ) -> CoreResult<()> {
        let request = self.request_body(messages, temperature, true);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| llm_error_to_core(LlmError::Network(e.to_string())))?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(llm_error_to_core(LlmError::Api(body)));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| llm_error_to_core(LlmError::Network(e.to_string())))?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(pos) = buffer.find("\n\n") {
                let event = buffer[..pos].to_string();
                buffer.drain(..pos + 2);

                let Some(data) = event.strip_prefix("data: ").or_else(|| event.strip_prefix("data:")) else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(());
                }
                if data.is_empty() {
                    continue;
                }

                let Ok(chunk_response) = serde_json::from_str::<ChatStreamChunk>(data) else {
                    continue;
                };
                let Some(delta) = chunk_response.choices.into_iter().next().and_then(|c| c.delta.content)
                else {
                    continue;
                };
                if delta.is_empty() {
                    continue;
                }
                if tx.send(delta).await.is_err() {
                    // receiver dropped: downstream cancelled the stream.
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn llm_error_to_core(err: LlmError) -> CoreError {
    CoreError::Component(err.to_string())
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        Self {
            role: role.to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    choices: Vec<ChatStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    delta: ChatStreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_fields() {
        let config = LlmConfig::new("gpt-4o-mini", "https://api.openai.com/v1", "sk-test");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_tokens, 1024);
    }

    #[test]
    fn chat_message_from_core_message_maps_roles() {
        let msg = Message::user("hello");
        let chat: ChatMessage = (&msg).into();
        assert_eq!(chat.role, "user");
        assert_eq!(chat.content, "hello");
    }

    #[test]
    fn endpoint_strips_trailing_slash() {
        let backend = OpenAiCompatibleBackend::new(LlmConfig::new(
            "gpt-4o-mini",
            "https://api.openai.com/v1/",
            "sk-test",
        ))
        .unwrap();
        assert_eq!(backend.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
