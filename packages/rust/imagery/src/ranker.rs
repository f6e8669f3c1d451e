//! Two-tier image relevance ranking.
//!
//! Candidates from cited pages are scored twice: a near-free keyword-overlap
//! pass to build a shortlist, then one model call per shortlisted candidate
//! for a semantic 0-10 score. Only a candidate clearing the relevance floor is
//! embedded; otherwise ranking falls back to a public media search and,
//! failing that, to a textual image-need marker. An absent image is always
//! preferred over an irrelevant one.

use std::sync::Arc;

use tracing::{debug, warn};

use draftforge_backend::{ChatBackend, CompletionRequest, Message};
use draftforge_shared::{ImageRef, word_count};

use crate::fetch::{ImageCandidate, PageFetcher};
use crate::media::MediaSearch;

/// Section-title keywords that indicate a visual would help.
const VISUAL_SECTION_KEYWORDS: &[&str] = &[
    "architecture",
    "diagram",
    "process",
    "comparison",
    "mistake",
    "workflow",
    "lifecycle",
    "timeline",
    "flow",
    "trends",
];

/// Technical terms that lower the length threshold for the need-gate.
const TECHNICAL_KEYWORDS: &[&str] = &[
    "api",
    "database",
    "algorithm",
    "protocol",
    "pipeline",
    "infrastructure",
    "deployment",
    "network",
    "framework",
    "integration",
];

/// Terms in a URL or alt text that suggest the image is a content visual.
const VISUAL_HINT_TERMS: &[&str] = &[
    "diagram",
    "chart",
    "graph",
    "figure",
    "illustration",
    "infographic",
    "screenshot",
    "visualization",
];

const LONG_SECTION_WORDS: usize = 200;
const TECHNICAL_SECTION_WORDS: usize = 150;

const URL_MATCH_WEIGHT: f64 = 2.0;
const ALT_MATCH_WEIGHT: f64 = 3.0;
const VISUAL_HINT_BONUS: f64 = 1.5;
const QUICK_SCORE_CAP: f64 = 10.0;

const SCORING_TEMPERATURE: f64 = 0.0;

// ---------------------------------------------------------------------------
// RankerPolicy
// ---------------------------------------------------------------------------

/// Tunable thresholds for the ranking pipeline.
#[derive(Debug, Clone)]
pub struct RankerPolicy {
    /// Citation pages fetched per section.
    pub max_pages: usize,
    /// Candidates re-scored semantically.
    pub shortlist_size: usize,
    /// Minimum semantic score for a candidate to be embedded.
    pub relevance_floor: f64,
}

impl Default for RankerPolicy {
    fn default() -> Self {
        Self {
            max_pages: 5,
            shortlist_size: 5,
            relevance_floor: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// RelevanceRanker
// ---------------------------------------------------------------------------

/// Finds at most one relevant image for a drafted section.
pub struct RelevanceRanker {
    backend: Arc<dyn ChatBackend>,
    fetcher: PageFetcher,
    media: MediaSearch,
    model: String,
    policy: RankerPolicy,
}

impl RelevanceRanker {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        fetcher: PageFetcher,
        media: MediaSearch,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            fetcher,
            media,
            model: model.into(),
            policy: RankerPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RankerPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Produce zero or one image reference for a section.
    ///
    /// `None` means the section does not need an image. When it does, the
    /// result is a real URL only if a candidate clears the relevance floor or
    /// the media search finds one; every other outcome is an
    /// [`ImageRef::Needed`] description. This method never fails: page and
    /// backend errors degrade to the next fallback tier.
    pub async fn find_image(
        &self,
        section_title: &str,
        content: &str,
        topic: &str,
        citation_urls: &[String],
    ) -> Option<ImageRef> {
        if !needs_image(section_title, content) {
            return None;
        }

        let keywords = scoring_keywords(topic, section_title);
        let mut candidates: Vec<ImageCandidate> = Vec::new();

        // Pages are fetched one at a time to keep outbound traffic polite.
        for page_url in citation_urls.iter().take(self.policy.max_pages) {
            match self.fetcher.fetch_images(page_url).await {
                Ok(found) => {
                    for mut candidate in found {
                        candidate.quick_score = quick_score(&candidate, &keywords);
                        candidates.push(candidate);
                    }
                }
                Err(e) => {
                    warn!(url = %page_url, error = %e, "skipping citation page");
                }
            }
        }

        candidates.sort_by(|a, b| b.quick_score.total_cmp(&a.quick_score));
        candidates.truncate(self.policy.shortlist_size);

        for candidate in &mut candidates {
            candidate.relevance_score = self.semantic_score(candidate, section_title, topic).await;
        }

        let best = candidates
            .into_iter()
            .max_by(|a, b| a.relevance_score.total_cmp(&b.relevance_score));

        if let Some(best) = best {
            if best.relevance_score >= self.policy.relevance_floor {
                debug!(url = %best.url, score = best.relevance_score, "accepted image candidate");
                return Some(ImageRef::Url {
                    alt: candidate_alt(&best, section_title),
                    url: best.url,
                });
            }
            debug!(
                score = best.relevance_score,
                floor = self.policy.relevance_floor,
                "best candidate below relevance floor"
            );
        }

        match self.media.find_image(&format!("{topic} {section_title}")).await {
            Ok(Some(url)) => {
                debug!(url = %url, "using media search result");
                return Some(ImageRef::Url {
                    url,
                    alt: format!("{section_title} illustration"),
                });
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "media search failed"),
        }

        Some(ImageRef::Needed {
            description: format!(
                "Diagram or illustration of {section_title} for an article about {topic}"
            ),
        })
    }

    /// Ask the backend for a 0-10 relevance score. Falls back to the cheap
    /// keyword score when the call fails or the reply has no number in it.
    async fn semantic_score(
        &self,
        candidate: &ImageCandidate,
        section_title: &str,
        topic: &str,
    ) -> f64 {
        let prompt = format!(
            "You score how well an image matches an article section.\n\n\
             Section: \"{section_title}\"\n\
             Article topic: {topic}\n\
             Image URL: {url}\n\
             Image alt text: \"{alt}\"\n\n\
             Rubric:\n\
             10 = depicts exactly what the section explains\n\
             7-9 = clearly related diagram, chart, or illustration\n\
             4-6 = same broad subject but generic\n\
             1-3 = loosely related at best\n\
             0 = unrelated or decorative\n\n\
             Respond with a single number from 0 to 10.",
            url = candidate.url,
            alt = candidate.alt_text,
        );

        let request = CompletionRequest::new(&self.model, SCORING_TEMPERATURE)
            .message(Message::user(prompt));

        match self.backend.complete(&request).await {
            Ok(response) => match parse_score(&response) {
                Some(score) => score,
                None => {
                    warn!(url = %candidate.url, "unparseable relevance reply, keeping keyword score");
                    candidate.quick_score
                }
            },
            Err(e) => {
                warn!(url = %candidate.url, error = %e, "relevance call failed, keeping keyword score");
                candidate.quick_score
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Scoring helpers
// ---------------------------------------------------------------------------

/// Heuristic gate deciding whether a section warrants an image at all.
///
/// True when the title names a visual concept, the body runs long, or a
/// technical term appears in a moderately long body. False positives and
/// negatives are acceptable.
pub fn needs_image(section_title: &str, content: &str) -> bool {
    let title_lower = section_title.to_lowercase();
    if VISUAL_SECTION_KEYWORDS
        .iter()
        .any(|kw| title_lower.contains(kw))
    {
        return true;
    }

    let words = word_count(content);
    if words > LONG_SECTION_WORDS {
        return true;
    }

    words > TECHNICAL_SECTION_WORDS
        && TECHNICAL_KEYWORDS
            .iter()
            .any(|kw| contains_word(section_title, kw) || contains_word(content, kw))
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case(needle))
}

/// Keywords for the cheap overlap score: topic and title tokens of 4+ chars.
fn scoring_keywords(topic: &str, section_title: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for token in topic
        .split_whitespace()
        .chain(section_title.split_whitespace())
    {
        let cleaned = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if cleaned.len() >= 4 && !keywords.contains(&cleaned) {
            keywords.push(cleaned);
        }
    }
    keywords
}

/// Lexical pre-score: URL keyword hit = 2, alt-text hit = 3, plus a single
/// 1.5 bonus when the image looks like a diagram or chart, capped at 10.
fn quick_score(candidate: &ImageCandidate, keywords: &[String]) -> f64 {
    let url_lower = candidate.url.to_lowercase();
    let alt_lower = candidate.alt_text.to_lowercase();

    let mut score = 0.0;
    for kw in keywords {
        if url_lower.contains(kw.as_str()) {
            score += URL_MATCH_WEIGHT;
        }
        if alt_lower.contains(kw.as_str()) {
            score += ALT_MATCH_WEIGHT;
        }
    }

    if VISUAL_HINT_TERMS
        .iter()
        .any(|t| url_lower.contains(t) || alt_lower.contains(t))
    {
        score += VISUAL_HINT_BONUS;
    }

    score.min(QUICK_SCORE_CAP)
}

/// First number in the reply, clamped to the 0-10 scale.
fn parse_score(response: &str) -> Option<f64> {
    for token in response.split_whitespace() {
        let cleaned = token
            .split('/')
            .next()
            .unwrap_or(token)
            .trim_matches(|c: char| !c.is_ascii_digit() && c != '.');
        if cleaned.is_empty() {
            continue;
        }
        if let Ok(value) = cleaned.parse::<f64>() {
            return Some(value.clamp(0.0, 10.0));
        }
    }
    None
}

fn candidate_alt(candidate: &ImageCandidate, section_title: &str) -> String {
    if candidate.alt_text.is_empty() {
        format!("{section_title} illustration")
    } else {
        candidate.alt_text.clone()
    }
}

#[cfg(test)]
mod ranker_tests {
    use super::*;
    use async_trait::async_trait;
    use draftforge_backend::BackendError;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FixedBackend(String);

    #[async_trait]
    impl ChatBackend for FixedBackend {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> draftforge_backend::Result<String> {
            Ok(self.0.clone())
        }
    }

    struct FailingBackend;

    #[async_trait]
    impl ChatBackend for FailingBackend {
        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> draftforge_backend::Result<String> {
            Err(BackendError::Connection("scripted failure".into()))
        }
    }

    fn candidate(url: &str, alt: &str) -> ImageCandidate {
        ImageCandidate {
            url: url.to_string(),
            alt_text: alt.to_string(),
            source_page: "https://example.com/".to_string(),
            quick_score: 0.0,
            relevance_score: 0.0,
        }
    }

    fn long_body(words: usize) -> String {
        vec!["word"; words].join(" ")
    }

    async fn ranker_with(
        backend: Arc<dyn ChatBackend>,
        media_server: &MockServer,
    ) -> RelevanceRanker {
        RelevanceRanker::new(
            backend,
            PageFetcher::new(true).unwrap(),
            MediaSearch::with_base_url(format!("{}/w/api.php", media_server.uri())).unwrap(),
            "gpt-5",
        )
    }

    async fn mount_empty_media(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"query": {"search": []}})),
            )
            .mount(server)
            .await;
    }

    async fn mount_article(server: &MockServer, route: &str, html: &str) -> String {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(html.to_string()))
            .mount(server)
            .await;
        format!("{}{route}", server.uri())
    }

    // -- need-gate ---------------------------------------------------------

    #[test]
    fn gate_opens_for_visual_keyword_in_title() {
        assert!(needs_image("System Architecture Overview", &long_body(250)));
        assert!(needs_image("Common Mistakes", "short body"));
    }

    #[test]
    fn gate_opens_for_long_sections() {
        assert!(needs_image("Background", &long_body(201)));
        assert!(!needs_image("Background", &long_body(120)));
    }

    #[test]
    fn gate_lowers_threshold_for_technical_terms() {
        let body = format!("{} database tuning", long_body(155));
        assert!(needs_image("Tuning Tips", &body));
        assert!(!needs_image("Tuning Tips", &long_body(155)));
    }

    // -- scoring -----------------------------------------------------------

    #[test]
    fn quick_score_applies_documented_weights() {
        let kws = vec!["kubernetes".to_string()];

        let by_url = candidate("https://a.com/kubernetes-photo.png", "");
        assert_eq!(quick_score(&by_url, &kws), 2.0);

        let by_alt = candidate("https://a.com/photo.png", "kubernetes cluster");
        assert_eq!(quick_score(&by_alt, &kws), 3.0);

        let hint_only = candidate("https://a.com/photo.png", "flow chart");
        assert_eq!(quick_score(&hint_only, &[]), 1.5);

        let stacked = candidate(
            "https://a.com/kubernetes-diagram.png",
            "kubernetes diagram of a kubernetes cluster",
        );
        // 2 (url) + 3 (alt) + 1.5 (hint) for one keyword, then capped.
        let many = vec![
            "kubernetes".to_string(),
            "diagram".to_string(),
            "cluster".to_string(),
        ];
        assert_eq!(quick_score(&stacked, &many), 10.0);
    }

    #[test]
    fn score_parsing_tolerates_prose_and_clamps() {
        assert_eq!(parse_score("8"), Some(8.0));
        assert_eq!(parse_score("Score: 7.5"), Some(7.5));
        assert_eq!(parse_score("I'd rate it 9/10."), Some(9.0));
        assert_eq!(parse_score("15"), Some(10.0));
        assert_eq!(parse_score("no number here"), None);
    }

    // -- full ranking ------------------------------------------------------

    #[tokio::test]
    async fn accepts_candidate_that_clears_the_floor() {
        let server = MockServer::start().await;
        let page = mount_article(
            &server,
            "/post",
            r#"<img src="/img/pipeline-diagram.png" alt="data pipeline architecture diagram" width="800">"#,
        )
        .await;

        let ranker = ranker_with(Arc::new(FixedBackend("8".into())), &server).await;
        let image = ranker
            .find_image("Pipeline Architecture", &long_body(250), "data pipelines", &[page])
            .await;

        match image {
            Some(ImageRef::Url { url, alt }) => {
                assert!(url.ends_with("/img/pipeline-diagram.png"));
                assert_eq!(alt, "data pipeline architecture diagram");
            }
            other => panic!("expected a URL image, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn never_embeds_a_candidate_below_the_floor() {
        let server = MockServer::start().await;
        mount_empty_media(&server).await;
        let page = mount_article(
            &server,
            "/post",
            r#"<img src="/img/pipeline-diagram.png" alt="data pipeline architecture diagram" width="800">"#,
        )
        .await;

        let ranker = ranker_with(Arc::new(FixedBackend("4.9".into())), &server).await;
        let image = ranker
            .find_image("Pipeline Architecture", &long_body(250), "data pipelines", &[page])
            .await;

        match image {
            Some(ImageRef::Needed { description }) => {
                assert!(description.contains("Pipeline Architecture"));
            }
            other => panic!("expected a placeholder, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn section_without_need_gets_no_image() {
        let server = MockServer::start().await;
        let ranker = ranker_with(Arc::new(FixedBackend("10".into())), &server).await;
        let image = ranker
            .find_image("Introduction", "A couple of sentences.", "gardening", &[])
            .await;
        assert!(image.is_none());
    }

    #[tokio::test]
    async fn falls_back_to_media_search_without_citations() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("list", "search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"search": [{"title": "File:Microservice_architecture.png"}]}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/w/api.php"))
            .and(query_param("prop", "imageinfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": {"pages": {"1": {"imageinfo": [
                    {"url": "https://upload.example.org/Microservice_architecture.png"}
                ]}}}
            })))
            .mount(&server)
            .await;

        let ranker = ranker_with(Arc::new(FixedBackend("0".into())), &server).await;
        let image = ranker
            .find_image("System Architecture", &long_body(250), "microservices", &[])
            .await;

        match image {
            Some(ImageRef::Url { url, .. }) => {
                assert_eq!(url, "https://upload.example.org/Microservice_architecture.png");
            }
            other => panic!("expected media search result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn emits_placeholder_when_every_source_is_empty() {
        let server = MockServer::start().await;
        mount_empty_media(&server).await;

        let ranker = ranker_with(Arc::new(FixedBackend("0".into())), &server).await;
        let image = ranker
            .find_image("System Architecture", &long_body(250), "microservices", &[])
            .await
            .unwrap();

        assert!(image.to_marker().contains("Image needed:"));
    }

    #[tokio::test]
    async fn page_failure_degrades_to_remaining_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let good = mount_article(
            &server,
            "/good",
            r#"<img src="/img/cluster-diagram.png" alt="kubernetes cluster diagram" width="640">"#,
        )
        .await;

        let ranker = ranker_with(Arc::new(FixedBackend("9".into())), &server).await;
        let image = ranker
            .find_image(
                "Cluster Architecture",
                &long_body(250),
                "kubernetes",
                &[format!("{}/broken", server.uri()), good],
            )
            .await;

        assert!(matches!(image, Some(ImageRef::Url { .. })));
    }

    #[tokio::test]
    async fn backend_failure_keeps_the_keyword_score() {
        let server = MockServer::start().await;
        let page = mount_article(
            &server,
            "/post",
            r#"<img src="/img/kubernetes-diagram.png" alt="kubernetes cluster diagram" width="800">"#,
        )
        .await;

        // Keyword score for this candidate is well above the floor, so the
        // candidate survives the failed semantic call.
        let ranker = ranker_with(Arc::new(FailingBackend), &server).await;
        let image = ranker
            .find_image("Cluster Architecture", &long_body(250), "kubernetes", &[page])
            .await;

        assert!(matches!(image, Some(ImageRef::Url { .. })));
    }
}
