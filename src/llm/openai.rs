//! Client for OpenAI-compatible `/chat/completions` and `/embeddings` endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    ChatMessage, ChatResponse, CompletionOptions, Embedder, LlmClient, LlmError, TokenUsage,
};
use crate::config::{LlmConfig, RetrievalConfig};

/// HTTP client for any provider speaking the OpenAI wire format
/// (OpenRouter, cloud.ru foundation models, vLLM, ...).
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    embed_model: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Build a client. The timeout applies to every request made with it.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookshelf-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embed_model: None,
        })
    }

    /// Chat client from the `[llm]` section of the config.
    pub fn for_chat(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::new(&config.base_url, &config.api_key, config.timeout)
    }

    /// Embeddings client from the retrieval settings.
    pub fn for_embeddings(
        config: &RetrievalConfig,
        timeout: std::time::Duration,
    ) -> Result<Self, LlmError> {
        Ok(
            Self::new(&config.embeddings_base_url, &config.embeddings_api_key, timeout)?
                .with_embed_model(&config.embed_model),
        )
    }

    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = Some(model.into());
        self
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, LlmError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    stop: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl CompletionResponse {
    fn into_chat_response(self) -> Result<ChatResponse, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("no choices in completion".to_string()))?;
        Ok(ChatResponse {
            content: choice.message.content,
            usage: self.usage,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ChatResponse, LlmError> {
        let request = CompletionRequest {
            model,
            messages,
            stop: &options.stop,
            temperature: options.temperature,
        };
        tracing::debug!(model, messages = messages.len(), "chat completion request");

        let response: CompletionResponse = self.post_json("chat/completions", &request).await?;
        response.into_chat_response()
    }
}

#[async_trait]
impl Embedder for OpenAiCompatibleClient {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embed_model
            .as_deref()
            .ok_or_else(|| LlmError::InvalidResponse("no embedding model configured".to_string()))?;

        let response: EmbeddingResponse = self
            .post_json("embeddings", &EmbeddingRequest { model, input: [text] })
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("empty embedding data".to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push_str("... [truncated]");
        out
    }
}
