//! Web search provider for the Research stage.
//!
//! The pipeline talks to search through the [`SearchProvider`] trait;
//! [`TavilySearch`] is the production implementation. Missing credentials
//! are not an error — the Research stage simply runs without a provider
//! and falls back to local source files.

mod local;

use async_trait::async_trait;
use draftforge_shared::{DraftforgeError, Result};
use serde::Deserialize;
use tracing::debug;

pub use local::load_local_sources;

/// Default timeout in seconds for search API calls.
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// User-Agent string for search requests.
const USER_AGENT: &str = concat!("draftforge/", env!("CARGO_PKG_VERSION"));

/// One web search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Provider-reported relevance in [0,1].
    pub relevance: f64,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run one query, returning at most `count` hits.
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>>;
}

// ---------------------------------------------------------------------------
// Tavily implementation
// ---------------------------------------------------------------------------

/// Search provider speaking the Tavily JSON API.
#[derive(Debug, Clone)]
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DraftforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: "https://api.tavily.com".to_string(),
        })
    }

    /// Point at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

#[async_trait]
impl SearchProvider for TavilySearch {
    async fn search(&self, query: &str, count: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": count,
            "include_answer": false,
        });

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DraftforgeError::Network(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftforgeError::Network(format!(
                "search API returned HTTP {status} for query {query:?}"
            )));
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| DraftforgeError::parse(format!("search response: {e}")))?;

        debug!(query, hits = parsed.results.len(), "search completed");

        Ok(parsed
            .results
            .into_iter()
            .take(count)
            .map(|r| SearchHit {
                title: if r.title.is_empty() {
                    r.url.clone()
                } else {
                    r.title
                },
                url: r.url,
                snippet: r.content,
                relevance: r.score.clamp(0.0, 1.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> TavilySearch {
        TavilySearch::new("tvly-test")
            .expect("build provider")
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn search_parses_hits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_partial_json(serde_json::json!({
                "query": "container orchestration statistics"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    {
                        "title": "CNCF Annual Survey",
                        "url": "https://example.com/survey",
                        "content": "84% of organizations run containers in production.",
                        "score": 0.92
                    },
                    {
                        "title": "",
                        "url": "https://example.com/untitled",
                        "content": "no title on this one",
                        "score": 0.4
                    }
                ]
            })))
            .mount(&server)
            .await;

        let hits = provider_for(&server)
            .search("container orchestration statistics", 5)
            .await
            .expect("search");

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "CNCF Annual Survey");
        assert!(hits[0].relevance > 0.9);
        // Untitled results fall back to their URL.
        assert_eq!(hits[1].title, "https://example.com/untitled");
    }

    #[tokio::test]
    async fn search_caps_result_count() {
        let server = MockServer::start().await;
        let results: Vec<_> = (0..8)
            .map(|i| {
                serde_json::json!({
                    "title": format!("Result {i}"),
                    "url": format!("https://example.com/{i}"),
                    "content": "text",
                    "score": 0.5
                })
            })
            .collect();
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "results": results })),
            )
            .mount(&server)
            .await;

        let hits = provider_for(&server).search("anything", 3).await.expect("search");
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn search_surfaces_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = provider_for(&server).search("anything", 3).await.unwrap_err();
        assert!(matches!(err, DraftforgeError::Network(_)));
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn empty_results_are_fine() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let hits = provider_for(&server).search("obscure", 3).await.expect("search");
        assert!(hits.is_empty());
    }
}
