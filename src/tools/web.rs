//! Web search tool backed by the Exa search API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{parse_query_args, Tool, ToolError, ToolKind, NOTHING_FOUND};

/// Characters of page text kept per result.
pub const SNIPPET_CHARS: usize = 300;

const DEFAULT_RESULTS: u64 = 5;
const MAX_RESULTS: u64 = 10;
const EXA_SEARCH_URL: &str = "https://api.exa.ai/search";

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    /// Page text the snippet is cut from
    pub text: Option<String>,
    pub url: String,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, num_results: u64) -> Result<Vec<SearchHit>, ToolError>;
}

/// Search the web.
pub struct WebSearch {
    provider: Arc<dyn SearchProvider>,
}

impl WebSearch {
    pub fn new(provider: Arc<dyn SearchProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for WebSearch {
    fn kind(&self) -> ToolKind {
        ToolKind::WebSearch
    }

    fn description(&self) -> &str {
        "Search for information on the internet. Returns a list of brief results with title, snippet and URL. Use for news and anything the paper collection does not cover."
    }

    fn input_example(&self) -> Value {
        json!({ "query": "search query" })
    }

    async fn execute(&self, input: &str) -> Result<String, ToolError> {
        let args = parse_query_args(input)?;
        let num_results = args
            .max_results
            .unwrap_or(DEFAULT_RESULTS)
            .clamp(1, MAX_RESULTS);

        match self.provider.search(&args.query, num_results).await {
            Ok(hits) => Ok(format_hits(&hits)),
            Err(e) => {
                tracing::warn!(query = %args.query, "web search failed: {}", e);
                Ok(NOTHING_FOUND.to_string())
            }
        }
    }
}

/// Render hits as `title: snippet — url` lines, or the nothing-found sentinel.
pub fn format_hits(hits: &[SearchHit]) -> String {
    let lines: Vec<String> = hits
        .iter()
        .map(|hit| {
            let snippet = hit.text.as_deref().map(snippet).unwrap_or_default();
            format!("{}: {} — {}", hit.title, snippet, hit.url)
        })
        .collect();

    if lines.is_empty() {
        NOTHING_FOUND.to_string()
    } else {
        lines.join("\n")
    }
}

/// First `SNIPPET_CHARS` characters with newlines flattened to spaces.
fn snippet(text: &str) -> String {
    text.chars()
        .take(SNIPPET_CHARS)
        .map(|c| if c == '\n' { ' ' } else { c })
        .collect()
}

/// Exa `/search` client.
pub struct ExaSearchProvider {
    http: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl ExaSearchProvider {
    pub fn new(api_key: Option<String>, timeout: std::time::Duration) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bookshelf-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::Upstream(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            endpoint: EXA_SEARCH_URL.to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExaSearchRequest<'a> {
    query: &'a str,
    num_results: u64,
    contents: ExaContents,
}

#[derive(Serialize)]
struct ExaContents {
    text: bool,
}

#[derive(Debug, Deserialize)]
struct ExaSearchResponse {
    #[serde(default)]
    results: Vec<ExaResult>,
}

#[derive(Debug, Deserialize)]
struct ExaResult {
    title: Option<String>,
    url: String,
    text: Option<String>,
}

impl From<ExaResult> for SearchHit {
    fn from(r: ExaResult) -> Self {
        Self {
            title: r.title.unwrap_or_default(),
            text: r.text,
            url: r.url,
        }
    }
}

#[async_trait]
impl SearchProvider for ExaSearchProvider {
    async fn search(&self, query: &str, num_results: u64) -> Result<Vec<SearchHit>, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::Upstream("EXA_API_KEY is not configured".to_string()))?;

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", api_key)
            .json(&ExaSearchRequest {
                query,
                num_results,
                contents: ExaContents { text: true },
            })
            .send()
            .await
            .map_err(|e| ToolError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Upstream(format!("Exa returned HTTP {}", status)));
        }

        let body: ExaSearchResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Upstream(format!("unreadable Exa response: {}", e)))?;

        Ok(body.results.into_iter().map(SearchHit::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedProvider {
        hits: Result<Vec<SearchHit>, String>,
        seen: Mutex<Vec<(String, u64)>>,
    }

    impl FixedProvider {
        fn ok(hits: Vec<SearchHit>) -> Self {
            Self {
                hits: Ok(hits),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                hits: Err("503".to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for FixedProvider {
        async fn search(&self, query: &str, n: u64) -> Result<Vec<SearchHit>, ToolError> {
            self.seen.lock().unwrap().push((query.to_string(), n));
            self.hits.clone().map_err(ToolError::Upstream)
        }
    }

    fn hit(title: &str, text: Option<&str>, url: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            text: text.map(str::to_string),
            url: url.to_string(),
        }
    }

    #[test]
    fn snippet_truncates_to_budget_and_flattens_newlines() {
        let long = format!("line one\nline two\n{}", "x".repeat(500));
        let out = format_hits(&[hit("T", Some(&long), "https://a")]);
        let snippet = out
            .strip_prefix("T: ")
            .and_then(|s| s.strip_suffix(" — https://a"))
            .unwrap();
        assert_eq!(snippet.chars().count(), SNIPPET_CHARS);
        assert!(!snippet.contains('\n'));
        assert!(snippet.starts_with("line one line two "));
    }

    #[test]
    fn snippet_counts_characters_not_bytes() {
        let text = "я".repeat(400);
        let out = format_hits(&[hit("Новости", Some(&text), "https://b")]);
        assert!(out.contains(&"я".repeat(SNIPPET_CHARS)));
        assert!(!out.contains(&"я".repeat(SNIPPET_CHARS + 1)));
    }

    #[test]
    fn hits_without_text_have_empty_snippet() {
        let out = format_hits(&[hit("Title", None, "https://c"), hit("B", Some("b"), "https://d")]);
        assert_eq!(out, "Title:  — https://c\nB: b — https://d");
    }

    #[test]
    fn no_hits_is_sentinel() {
        assert_eq!(format_hits(&[]), NOTHING_FOUND);
    }

    #[tokio::test]
    async fn provider_error_becomes_sentinel() {
        let tool = WebSearch::new(Arc::new(FixedProvider::failing()));
        let out = tool.execute(r#"{"query": "rust"}"#).await.unwrap();
        assert_eq!(out, NOTHING_FOUND);
    }

    #[tokio::test]
    async fn result_count_defaults_and_clamps() {
        let provider = Arc::new(FixedProvider::ok(vec![hit("a", Some("b"), "c")]));
        let tool = WebSearch::new(provider.clone());
        tool.execute(r#"{"query": "one"}"#).await.unwrap();
        tool.execute(r#"{"query": "two", "max_results": 50}"#).await.unwrap();
        tool.execute(r#"{"query": "three", "max_results": 0}"#).await.unwrap();
        let seen = provider.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("one".to_string(), 5),
                ("two".to_string(), 10),
                ("three".to_string(), 1)
            ]
        );
    }

    #[tokio::test]
    async fn empty_query_is_a_tool_error() {
        let tool = WebSearch::new(Arc::new(FixedProvider::ok(vec![])));
        assert!(matches!(
            tool.execute(r#"{"query": ""}"#).await,
            Err(ToolError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn missing_api_key_is_upstream_error() {
        let provider = ExaSearchProvider::new(None, std::time::Duration::from_secs(1)).unwrap();
        assert!(matches!(
            provider.search("q", 3).await,
            Err(ToolError::Upstream(_))
        ));
    }

    #[test]
    fn exa_response_maps_to_hits() {
        let raw = serde_json::json!({
            "requestId": "abc",
            "results": [
                {"id": "1", "title": "AI weekly", "url": "https://news/1", "text": "Body"},
                {"id": "2", "title": null, "url": "https://news/2"}
            ]
        });
        let parsed: ExaSearchResponse = serde_json::from_value(raw).unwrap();
        let hits: Vec<SearchHit> = parsed.results.into_iter().map(SearchHit::from).collect();
        assert_eq!(hits[0], hit("AI weekly", Some("Body"), "https://news/1"));
        assert_eq!(hits[1], hit("", None, "https://news/2"));
    }

    #[test]
    fn exa_request_uses_camel_case() {
        let body = serde_json::to_value(ExaSearchRequest {
            query: "q",
            num_results: 5,
            contents: ExaContents { text: true },
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({"query": "q", "numResults": 5, "contents": {"text": true}})
        );
    }
}
