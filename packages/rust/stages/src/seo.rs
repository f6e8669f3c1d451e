//! Search-optimization stage: keywords, meta tags, FAQ, link suggestions.
//!
//! Keyword extraction, density, and link suggestions are deterministic text
//! analysis; only the meta tags and the FAQ section go through the model.
//! This stage also guarantees every section body starts with its own `## `
//! header, which the assembler later relies on.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use draftforge_shared::{
    InternalLink, Result, SectionMap, SeoMetadata, StageName, slug,
};
use regex::Regex;
use tracing::debug;

use crate::{Stage, StageContext};

/// Keywords carried in the metadata, topic included.
const MAX_KEYWORDS: usize = 5;

/// A word must appear this often to count as a keyword candidate.
const MIN_KEYWORD_OCCURRENCES: usize = 3;

/// Internal link suggestions kept.
const MAX_INTERNAL_LINKS: usize = 5;

/// Meta title length ceiling.
const META_TITLE_CHARS: usize = 60;

/// Meta description length ceiling.
const META_DESCRIPTION_CHARS: usize = 160;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w{4,}\b").expect("valid regex"));

/// Multi-word capitalized phrases; single capitalized words are skipped
/// because every sentence start would match.
static CAPITALIZED_TERM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b").expect("valid regex"));

/// Produces [`SeoMetadata`] and the optional FAQ section.
pub struct SeoOptimizer;

/// What the SEO stage consumes.
pub struct SeoInput {
    pub topic: String,
    pub sections: SectionMap,
}

/// Optimized sections plus the metadata block and optional FAQ markdown.
pub struct SeoOutcome {
    pub sections: SectionMap,
    pub seo: SeoMetadata,
    /// Rendered `## FAQ` block when the run asked for one.
    pub faq: Option<String>,
}

#[async_trait]
impl Stage for SeoOptimizer {
    type Input = SeoInput;
    type Output = SeoOutcome;

    const NAME: StageName = StageName::Seo;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        let raw_text: String = input
            .sections
            .iter()
            .map(|(_, body)| body)
            .collect::<Vec<_>>()
            .join(" ");

        let keywords = if ctx.config.keywords.is_empty() {
            extract_keywords(&input.topic, &raw_text)
        } else {
            ctx.config.keywords.clone()
        };
        let internal_links = suggest_internal_links(&raw_text);

        // Give every body its own H2 so downstream rendering and header
        // deduplication see a uniform shape.
        let mut sections = SectionMap::new();
        for (title, body) in input.sections.iter() {
            sections.insert(title, ensure_header(title, body));
        }

        let summary = content_summary(&input.sections);

        let (meta_title, meta_description) = if ctx.config.include_meta_tags {
            ctx.progress.thought(Self::NAME, "Writing meta tags...");
            let title = ctx
                .complete(meta_title_prompt(&input.topic, &keywords))
                .await?;
            let description = ctx
                .complete(meta_description_prompt(&input.topic, &summary, &keywords))
                .await?;
            (
                clip(strip_quotes(&title), META_TITLE_CHARS),
                clip(strip_quotes(&description), META_DESCRIPTION_CHARS),
            )
        } else {
            (String::new(), String::new())
        };

        let faq = if ctx.config.include_faq {
            ctx.progress
                .thought(Self::NAME, "Generating the FAQ section...");
            Some(
                ctx.complete(faq_prompt(&input.topic, &summary, &keywords))
                    .await?,
            )
        } else {
            None
        };

        let optimized_text: String = sections
            .iter()
            .map(|(_, body)| body)
            .collect::<Vec<_>>()
            .join(" ");
        let keyword_density = density(&optimized_text, &keywords);

        debug!(
            keywords = keywords.len(),
            links = internal_links.len(),
            faq = faq.is_some(),
            "search optimization complete"
        );

        Ok(SeoOutcome {
            sections,
            seo: SeoMetadata {
                meta_title,
                meta_description,
                target_keywords: keywords,
                keyword_density,
                internal_links,
            },
            faq,
        })
    }
}

/// Topic plus the most frequent long words, capped at [`MAX_KEYWORDS`].
///
/// Candidates are ordered by frequency, alphabetically within ties, so the
/// result is stable for identical input.
fn extract_keywords(topic: &str, text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for m in WORD_RE.find_iter(&lowered) {
        *counts.entry(m.as_str()).or_default() += 1;
    }

    let mut candidates: Vec<(&str, usize)> = counts
        .into_iter()
        .filter(|(_, count)| *count >= MIN_KEYWORD_OCCURRENCES)
        .collect();
    // Stable sort keeps the alphabetical order within equal counts.
    candidates.sort_by(|a, b| b.1.cmp(&a.1));

    let mut keywords = vec![topic.to_string()];
    for (word, _) in candidates {
        if keywords.len() == MAX_KEYWORDS {
            break;
        }
        if keywords.iter().any(|k| k.eq_ignore_ascii_case(word)) {
            continue;
        }
        keywords.push(word.to_string());
    }
    keywords
}

/// Multi-word capitalized phrases that recur become link suggestions, in
/// first-appearance order.
fn suggest_internal_links(text: &str) -> Vec<InternalLink> {
    let mut seen: Vec<(&str, usize)> = Vec::new();
    for m in CAPITALIZED_TERM_RE.find_iter(text) {
        match seen.iter_mut().find(|(term, _)| *term == m.as_str()) {
            Some((_, count)) => *count += 1,
            None => seen.push((m.as_str(), 1)),
        }
    }

    seen.into_iter()
        .filter(|(_, count)| *count >= 2)
        .take(MAX_INTERNAL_LINKS)
        .map(|(term, _)| InternalLink {
            anchor: term.to_string(),
            path: format!("/blog/{}", slug(term)),
        })
        .collect()
}

fn ensure_header(title: &str, body: &str) -> String {
    if body.trim_start().starts_with("## ") {
        body.to_string()
    } else {
        format!("## {title}\n\n{body}")
    }
}

/// First 300 words of the introduction (or the first section).
fn content_summary(sections: &SectionMap) -> String {
    let intro = sections
        .get("Introduction")
        .or_else(|| sections.iter().next().map(|(_, body)| body))
        .unwrap_or("");
    intro
        .split_whitespace()
        .take(300)
        .collect::<Vec<_>>()
        .join(" ")
}

fn strip_quotes(text: &str) -> &str {
    text.trim().trim_matches(['"', '\''])
}

/// Cap at `limit` characters, ellipsis included.
fn clip(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(limit - 3).collect();
    clipped.push_str("...");
    clipped
}

/// Non-overlapping keyword occurrences as a percentage of total words.
fn density(text: &str, keywords: &[String]) -> BTreeMap<String, f64> {
    let lowered = text.to_lowercase();
    let total_words = lowered.split_whitespace().count();

    keywords
        .iter()
        .map(|keyword| {
            let count = if total_words == 0 {
                0
            } else {
                lowered.matches(&keyword.to_lowercase()).count()
            };
            let percent = if total_words == 0 {
                0.0
            } else {
                count as f64 / total_words as f64 * 100.0
            };
            (keyword.clone(), percent)
        })
        .collect()
}

fn meta_title_prompt(topic: &str, keywords: &[String]) -> String {
    format!(
        "Generate an SEO-optimized meta title for an article.\n\n\
         Topic: {topic}\n\
         Target Keywords: {keywords}\n\n\
         Requirements:\n\
         - 50-60 characters\n\
         - Include the primary keyword naturally\n\
         - Compelling and click-worthy\n\n\
         Return only the title, no quotes or extra text.",
        keywords = keywords.join(", "),
    )
}

fn meta_description_prompt(topic: &str, summary: &str, keywords: &[String]) -> String {
    let summary: String = summary.chars().take(200).collect();
    format!(
        "Generate an SEO-optimized meta description for an article.\n\n\
         Topic: {topic}\n\
         Content Summary: {summary}\n\
         Target Keywords: {keywords}\n\n\
         Requirements:\n\
         - 150-160 characters\n\
         - Include the primary keyword\n\
         - Clear value proposition with a call to action\n\n\
         Return only the description, no quotes or extra text.",
        keywords = keywords.join(", "),
    )
}

fn faq_prompt(topic: &str, summary: &str, keywords: &[String]) -> String {
    let summary: String = summary.chars().take(500).collect();
    format!(
        "Generate exactly 5 relevant FAQ questions and answers for an article.\n\n\
         Topic: {topic}\n\
         Content Summary: {summary}\n\
         Target Keywords: {keywords}\n\n\
         Requirements:\n\
         - Generate EXACTLY 5 questions (no more, no less)\n\
         - Questions should be natural and search-friendly, specifically about {topic}\n\
         - Answers should be concise (50-100 words each)\n\
         - Include target keywords naturally\n\
         - Format as markdown with a ## FAQ section and ### for each question\n\n\
         Return the FAQ section in markdown format with exactly 5 Q/A pairs.",
        keywords = keywords.join(", "),
    )
}
