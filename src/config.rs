//! Configuration management for the bookshelf assistant.
//!
//! Configuration can be set via environment variables:
//! - `LLM_API_KEY` - Required. API key for the OpenAI-compatible chat endpoint.
//! - `LLM_BASE_URL` - Optional. Chat endpoint base URL. Defaults to `https://openrouter.ai/api/v1`.
//! - `DEFAULT_MODEL` - Optional. The chat model to use. Defaults to `openai/gpt-4o-mini`.
//! - `LLM_TIMEOUT_SECS` - Optional. Per-request timeout for outbound model calls. Defaults to `30`.
//! - `EMBEDDINGS_API_KEY` - Optional. Key for the embeddings endpoint. Defaults to `LLM_API_KEY`.
//! - `EMBEDDINGS_BASE_URL` - Optional. Embeddings base URL. Defaults to `LLM_BASE_URL`.
//! - `EMBED_MODEL` - Optional. Embedding model. Defaults to `BAAI/bge-m3`.
//! - `EXA_API_KEY` - Optional. Exa search key. Without it web search reports nothing found.
//! - `CHROMA_URL` - Optional. Chroma server. Defaults to `http://localhost:8000`.
//! - `CHROMA_COLLECTION` - Optional. Paper collection name. Defaults to `arxiv_papers`.
//! - `RETRIEVAL_K` - Optional. Passages retrieved per lookup. Defaults to `5`.
//! - `AGENT_DATA_DIR` - Optional. Directory for the notes files. Defaults to `agent_data`.
//! - `ANSWER_LANGUAGE` - Optional. Language of final answers. Defaults to `Russian`.
//! - `MAX_ITERATIONS` - Optional. Model calls per question. Defaults to `7`.
//! - `MAX_PARSE_RECOVERIES` - Optional. Malformed model outputs tolerated per question. Defaults to `3`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_LLM_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_EMBED_MODEL: &str = "BAAI/bge-m3";
pub const DEFAULT_CHROMA_URL: &str = "http://localhost:8000";
pub const DEFAULT_CHROMA_COLLECTION: &str = "arxiv_papers";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Chat completion endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Bearer token for the chat endpoint
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    /// Model identifier sent with every completion
    pub model: String,

    /// Per-request timeout for outbound calls
    pub timeout: Duration,
}

/// Retrieval (embeddings + vector store) settings.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub embeddings_api_key: String,
    pub embeddings_base_url: String,
    pub embed_model: String,

    /// Chroma server base URL
    pub chroma_url: String,

    /// Collection holding the indexed papers
    pub collection: String,

    /// Number of passages retrieved per query
    pub top_k: usize,
}

/// Agent loop limits and presentation policy.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Maximum model invocations per question
    pub max_iterations: usize,

    /// Malformed outputs tolerated before the loop gives up
    pub max_parse_recoveries: usize,

    /// Language the final answer must be written in
    pub answer_language: String,

    /// Sampling temperature for agent turns; provider default when unset
    pub temperature: Option<f32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 7,
            max_parse_recoveries: 3,
            answer_language: "Russian".to_string(),
            temperature: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,

    pub retrieval: RetrievalConfig,

    pub agent: AgentSettings,

    /// Exa API key for the web search tool
    pub exa_api_key: Option<String>,

    /// Directory the file tool appends into
    pub data_dir: PathBuf,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `LLM_API_KEY` is not set, and
    /// `ConfigError::InvalidValue` for unparseable numbers or URLs.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;

        let base_url = validated_url(
            "LLM_BASE_URL",
            std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_LLM_BASE_URL.to_string()),
        )?;

        let model = std::env::var("DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let timeout_secs: u64 = parse_env("LLM_TIMEOUT_SECS", 30)?;

        let embeddings_base_url = match std::env::var("EMBEDDINGS_BASE_URL") {
            Ok(v) => validated_url("EMBEDDINGS_BASE_URL", v)?,
            Err(_) => base_url.clone(),
        };

        let retrieval = RetrievalConfig {
            embeddings_api_key: std::env::var("EMBEDDINGS_API_KEY")
                .unwrap_or_else(|_| api_key.clone()),
            embeddings_base_url,
            embed_model: std::env::var("EMBED_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBED_MODEL.to_string()),
            chroma_url: validated_url(
                "CHROMA_URL",
                std::env::var("CHROMA_URL").unwrap_or_else(|_| DEFAULT_CHROMA_URL.to_string()),
            )?,
            collection: std::env::var("CHROMA_COLLECTION")
                .unwrap_or_else(|_| DEFAULT_CHROMA_COLLECTION.to_string()),
            top_k: parse_env("RETRIEVAL_K", 5)?,
        };

        if retrieval.top_k == 0 {
            return Err(ConfigError::InvalidValue(
                "RETRIEVAL_K".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let defaults = AgentSettings::default();
        let agent = AgentSettings {
            max_iterations: parse_env("MAX_ITERATIONS", defaults.max_iterations)?,
            max_parse_recoveries: parse_env(
                "MAX_PARSE_RECOVERIES",
                defaults.max_parse_recoveries,
            )?,
            answer_language: std::env::var("ANSWER_LANGUAGE")
                .unwrap_or(defaults.answer_language),
            temperature: std::env::var("LLM_TEMPERATURE")
                .ok()
                .map(|_| parse_env("LLM_TEMPERATURE", 0.0f32))
                .transpose()?,
        };

        if let Some(t) = agent.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::InvalidValue(
                    "LLM_TEMPERATURE".to_string(),
                    "must be between 0 and 2".to_string(),
                ));
            }
        }

        if agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("PORT", 3000u16)?;

        Ok(Self {
            llm: LlmConfig {
                api_key,
                base_url,
                model,
                timeout: Duration::from_secs(timeout_secs),
            },
            retrieval,
            agent,
            exa_api_key: std::env::var("EXA_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            data_dir: std::env::var("AGENT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("agent_data")),
            host,
            port,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, model: String, data_dir: PathBuf) -> Self {
        Self {
            llm: LlmConfig {
                api_key: api_key.clone(),
                base_url: DEFAULT_LLM_BASE_URL.to_string(),
                model,
                timeout: Duration::from_secs(30),
            },
            retrieval: RetrievalConfig {
                embeddings_api_key: api_key,
                embeddings_base_url: DEFAULT_LLM_BASE_URL.to_string(),
                embed_model: DEFAULT_EMBED_MODEL.to_string(),
                chroma_url: DEFAULT_CHROMA_URL.to_string(),
                collection: DEFAULT_CHROMA_COLLECTION.to_string(),
                top_k: 5,
            },
            agent: AgentSettings::default(),
            exa_api_key: None,
            data_dir,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

/// Check that `value` is an absolute http(s) URL and return it without a trailing slash.
fn validated_url(name: &str, value: String) -> Result<String, ConfigError> {
    let parsed = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("unsupported scheme: {}", parsed.scheme()),
        ));
    }
    Ok(value.trim().trim_end_matches('/').to_string())
}
