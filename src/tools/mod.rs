//! Tools the agent can call.
//!
//! Every tool takes the raw `Action Input` text the model produced and
//! returns plain text. The set of tools is closed: [`ToolKind`] names every
//! tool the prompt can advertise and the parser can accept.

mod file_append;
mod rag;
mod web;

pub use file_append::{parse_append_args, AppendArgs, AppendToFile};
pub use rag::RagQuery;
pub use web::{format_hits, ExaSearchProvider, SearchHit, SearchProvider, WebSearch};

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Returned by search-style tools when they checked and found nothing.
pub const NOTHING_FOUND: &str = "Nothing found.";

/// Errors a tool can report. The agent loop turns all of them into observations.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The input does not contain the fields the tool needs at all.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The fields are present but their values are unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upstream service failed: {0}")]
    Upstream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The closed set of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ToolKind {
    #[serde(rename = "rag_query_tool")]
    RagQuery,
    #[serde(rename = "search_web_tool")]
    WebSearch,
    #[serde(rename = "append_to_file_tool")]
    AppendToFile,
}

impl ToolKind {
    /// Prompt order: retrieval first, since it should be tried before the web.
    pub const ALL: [ToolKind; 3] = [ToolKind::RagQuery, ToolKind::WebSearch, ToolKind::AppendToFile];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::WebSearch => "search_web_tool",
            ToolKind::AppendToFile => "append_to_file_tool",
            ToolKind::RagQuery => "rag_query_tool",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tool the agent can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// One-line description shown to the model.
    fn description(&self) -> &str;

    /// Example argument object shown to the model.
    fn input_example(&self) -> Value;

    /// Run the tool on the raw `Action Input` text.
    async fn execute(&self, input: &str) -> Result<String, ToolError>;
}

/// Tool metadata for prompt building.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: &'static str,
    pub description: String,
    pub input_example: Value,
}

/// Registry of the tools available to one agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second tool of the same kind replaces the first.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.kind(), tool);
    }

    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Box::new(tool));
        self
    }

    pub fn get(&self, kind: ToolKind) -> Option<&dyn Tool> {
        self.tools.get(&kind).map(|t| t.as_ref())
    }

    /// Resolve a tool name the model produced.
    pub fn lookup(&self, name: &str) -> Option<ToolKind> {
        ToolKind::from_name(name).filter(|k| self.tools.contains_key(k))
    }

    /// Names of registered tools, in prompt order.
    pub fn names(&self) -> Vec<&'static str> {
        ToolKind::ALL
            .into_iter()
            .filter(|k| self.tools.contains_key(k))
            .map(|k| k.name())
            .collect()
    }

    /// Registered tools, in prompt order.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        ToolKind::ALL
            .into_iter()
            .filter_map(|k| self.tools.get(&k))
            .map(|t| ToolInfo {
                name: t.kind().name(),
                description: t.description().to_string(),
                input_example: t.input_example(),
            })
            .collect()
    }

    pub async fn execute(&self, kind: ToolKind, input: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(&kind)
            .ok_or_else(|| ToolError::InvalidArgument(format!("{} is not available", kind)))?;
        tool.execute(input).await
    }
}

/// Arguments of the single-query tools (search and retrieval).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryArgs {
    pub query: String,
    pub max_results: Option<u64>,
}

/// Recover a query from model output.
///
/// Accepts a JSON object with a `query` field, then a `"query": "..."`
/// fragment inside otherwise broken JSON, then the bare text itself.
pub fn parse_query_args(input: &str) -> Result<QueryArgs, ToolError> {
    let trimmed = input.trim();

    let (query, max_results) = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => {
            let query = map
                .get("query")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ToolError::MalformedInput("missing 'query' field".to_string()))?;
            let max_results = map
                .get("max_results")
                .or_else(|| map.get("num_results"))
                .and_then(Value::as_u64);
            (query, max_results)
        }
        Ok(Value::String(s)) => (s, None),
        _ => match query_marker().captures(trimmed) {
            Some(caps) => (caps[1].to_string(), None),
            None => (trimmed.to_string(), None),
        },
    };

    let query = query.trim().to_string();
    if query.is_empty() {
        return Err(ToolError::InvalidArgument("query must not be empty".to_string()));
    }
    Ok(QueryArgs { query, max_results })
}

fn query_marker() -> &'static Regex {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)["']?query["']?\s*:\s*"(.*?)"\s*(?:[,}]|$)"#)
            .expect("query marker pattern is valid")
    })
}
