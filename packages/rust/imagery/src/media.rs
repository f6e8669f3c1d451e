//! Public media-commons image search.
//!
//! Last-resort image source when no cited page yields a relevant candidate.
//! Speaks the MediaWiki API two-step: a keyword search in the File namespace,
//! then an imageinfo lookup to resolve the winning title to a direct URL.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use draftforge_shared::{DraftforgeError, Result};

const DEFAULT_BASE_URL: &str = "https://commons.wikimedia.org/w/api.php";
const USER_AGENT: &str = concat!("draftforge/", env!("CARGO_PKG_VERSION"));
const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// MediaWiki namespace for File: pages.
const FILE_NAMESPACE: &str = "6";

// ---------------------------------------------------------------------------
// MediaSearch
// ---------------------------------------------------------------------------

/// Client for a MediaWiki-compatible public image search endpoint.
pub struct MediaSearch {
    client: Client,
    base_url: String,
}

impl MediaSearch {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Point the client at an alternate endpoint. Used by tests.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(SEARCH_TIMEOUT)
            .build()
            .map_err(|e| DraftforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Search for a freely-licensed image matching `query`.
    ///
    /// Returns the direct URL of the best match, or `None` when the search
    /// comes back empty or the winning title cannot be resolved.
    pub async fn find_image(&self, query: &str) -> Result<Option<String>> {
        let Some(title) = self.search_file_title(query).await? else {
            debug!(query, "media search returned no file titles");
            return Ok(None);
        };

        let url = self.resolve_image_url(&title).await?;
        debug!(query, title, resolved = url.is_some(), "media search finished");
        Ok(url)
    }

    async fn search_file_title(&self, query: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srnamespace", FILE_NAMESPACE),
                ("srlimit", "5"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| DraftforgeError::Network(format!("media search failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftforgeError::Network(format!(
                "media search returned HTTP {status}"
            )));
        }

        let parsed: SearchEnvelope = response
            .json()
            .await
            .map_err(|e| DraftforgeError::parse(format!("media search decode failed: {e}")))?;

        Ok(parsed
            .query
            .and_then(|q| q.search.into_iter().next())
            .map(|entry| entry.title))
    }

    async fn resolve_image_url(&self, title: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("action", "query"),
                ("titles", title),
                ("prop", "imageinfo"),
                ("iiprop", "url"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| DraftforgeError::Network(format!("imageinfo lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftforgeError::Network(format!(
                "imageinfo lookup returned HTTP {status}"
            )));
        }

        let parsed: InfoEnvelope = response
            .json()
            .await
            .map_err(|e| DraftforgeError::parse(format!("imageinfo decode failed: {e}")))?;

        Ok(parsed
            .query
            .map(|q| q.pages)
            .unwrap_or_default()
            .into_values()
            .flat_map(|page| page.imageinfo)
            .map(|info| info.url)
            .next())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    title: String,
}

#[derive(Debug, Deserialize)]
struct InfoEnvelope {
    query: Option<InfoQuery>,
}

#[derive(Debug, Deserialize)]
struct InfoQuery {
    #[serde(default)]
    pages: BTreeMap<String, InfoPage>,
}

#[derive(Debug, Deserialize)]
struct InfoPage {
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: String,
}

#[cfg(test)]
mod media_tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn two_step_lookup_resolves_a_direct_url() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .and(query_param("srnamespace", "6"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {
                    "search": [
                        {"title": "File:Data_pipeline.svg"},
                        {"title": "File:Other.png"}
                    ]
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "imageinfo"))
            .and(query_param("titles", "File:Data_pipeline.svg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {
                    "pages": {
                        "12345": {
                            "imageinfo": [
                                {"url": "https://upload.example.org/Data_pipeline.svg"}
                            ]
                        }
                    }
                }
            })))
            .mount(&server)
            .await;

        let media = MediaSearch::with_base_url(format!("{}/w/api.php", server.uri())).unwrap();
        let url = media.find_image("data pipeline").await.unwrap();
        assert_eq!(
            url.as_deref(),
            Some("https://upload.example.org/Data_pipeline.svg")
        );
    }

    #[tokio::test]
    async fn empty_search_results_yield_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"query": {"search": []}})),
            )
            .mount(&server)
            .await;

        let media = MediaSearch::with_base_url(format!("{}/w/api.php", server.uri())).unwrap();
        assert!(media.find_image("anything").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unresolvable_title_yields_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"search": [{"title": "File:Ghost.png"}]}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "imageinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "query": {"pages": {"-1": {}}}
            })))
            .mount(&server)
            .await;

        let media = MediaSearch::with_base_url(format!("{}/w/api.php", server.uri())).unwrap();
        assert!(media.find_image("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn server_error_surfaces_as_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let media = MediaSearch::with_base_url(format!("{}/w/api.php", server.uri())).unwrap();
        let err = media.find_image("anything").await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }
}
