//! Page fetching and image candidate extraction.
//!
//! Fetches a cited source page with a short timeout and browser-like headers,
//! parses the HTML, and returns the embedded images that survive the
//! icon/logo deny-list and minimum-dimension filters.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use draftforge_shared::{DraftforgeError, Result};

/// Some sites refuse requests from obvious bots, so page fetches identify as
/// a desktop browser rather than as draftforge.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
     Chrome/124.0.0.0 Safari/537.36";

/// Per-page fetch timeout.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Candidates whose URL, alt text, id, or class contains one of these are
/// page furniture, not content images.
const DENY_LIST: &[&str] = &[
    "icon", "logo", "banner", "sprite", "avatar", "favicon", "badge", "button", "spacer", "emoji",
];

/// Declared width or height below this is treated as an icon.
const MIN_DIMENSION: u32 = 200;

// ---------------------------------------------------------------------------
// ImageCandidate
// ---------------------------------------------------------------------------

/// An embedded image pulled from a cited page, before and after scoring.
#[derive(Debug, Clone)]
pub struct ImageCandidate {
    /// Absolute URL of the image.
    pub url: String,
    /// Alt text, empty when the page declares none.
    pub alt_text: String,
    /// URL of the page the image was found on.
    pub source_page: String,
    /// Cheap keyword-overlap score, filled in by the ranker.
    pub quick_score: f64,
    /// Semantic relevance score, filled in by the ranker.
    pub relevance_score: f64,
}

// ---------------------------------------------------------------------------
// PageFetcher
// ---------------------------------------------------------------------------

/// HTTP fetcher for citation pages.
pub struct PageFetcher {
    client: Client,
}

impl PageFetcher {
    /// Build a fetcher. `ssl_verify = false` disables certificate checks for
    /// pages behind interception proxies.
    pub fn new(ssl_verify: bool) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(FETCH_TIMEOUT)
            .danger_accept_invalid_certs(!ssl_verify)
            .build()
            .map_err(|e| DraftforgeError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Fetch `page_url` and return its content-image candidates.
    ///
    /// Candidates matching the deny-list or declaring a dimension under
    /// 200px are dropped. Relative image URLs are resolved against the page.
    pub async fn fetch_images(&self, page_url: &str) -> Result<Vec<ImageCandidate>> {
        let base = Url::parse(page_url)
            .map_err(|e| DraftforgeError::Network(format!("{page_url}: invalid URL: {e}")))?;

        let response = self
            .client
            .get(base.as_str())
            .send()
            .await
            .map_err(|e| DraftforgeError::Network(format!("{page_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DraftforgeError::Network(format!(
                "{page_url}: HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DraftforgeError::Network(format!("{page_url}: body read failed: {e}")))?;

        let candidates = extract_candidates(&body, &base);
        debug!(url = %page_url, candidates = candidates.len(), "extracted image candidates");
        Ok(candidates)
    }
}

/// Parse `html` and collect image candidates that pass the filters.
fn extract_candidates(html: &str, base: &Url) -> Vec<ImageCandidate> {
    let doc = Html::parse_document(html);
    let img_sel = Selector::parse("img").unwrap();

    let mut candidates = Vec::new();
    for el in doc.select(&img_sel) {
        let Some(src) = el.value().attr("src") else {
            continue;
        };
        if src.is_empty() || src.starts_with("data:") {
            continue;
        }

        let Ok(resolved) = base.join(src) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }

        let alt = el.value().attr("alt").unwrap_or("").trim().to_string();
        let id = el.value().attr("id").unwrap_or("");
        let class = el.value().attr("class").unwrap_or("");

        if matches_deny_list(resolved.as_str(), &alt, id, class) {
            continue;
        }

        if is_too_small(el.value().attr("width")) || is_too_small(el.value().attr("height")) {
            continue;
        }

        candidates.push(ImageCandidate {
            url: resolved.to_string(),
            alt_text: alt,
            source_page: base.to_string(),
            quick_score: 0.0,
            relevance_score: 0.0,
        });
    }

    candidates
}

fn matches_deny_list(url: &str, alt: &str, id: &str, class: &str) -> bool {
    let haystack = format!(
        "{} {} {} {}",
        url.to_lowercase(),
        alt.to_lowercase(),
        id.to_lowercase(),
        class.to_lowercase()
    );
    DENY_LIST.iter().any(|term| haystack.contains(term))
}

/// True when a declared dimension parses and is below the icon threshold.
/// Absent or unparseable attributes pass (many content images omit them).
fn is_too_small(attr: Option<&str>) -> bool {
    let Some(raw) = attr else {
        return false;
    };
    match raw.trim().trim_end_matches("px").parse::<u32>() {
        Ok(value) => value < MIN_DIMENSION,
        Err(_) => false,
    }
}
