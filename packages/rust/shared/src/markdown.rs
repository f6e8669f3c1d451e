//! Markdown text utilities shared by the content stages.
//!
//! Word counting strips markup first so image markers, links, and code
//! fences never inflate the count the pipeline budgets against.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ImageRef;

static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

static IMAGE_NEEDED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!--\s*Image needed:\s*([^>]+?)\s*-->").expect("valid regex"));

static HTML_COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));

static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));

static CODE_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

static HEADING_MARK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s+").expect("valid regex"));

/// Strip markup that should not count as content words.
///
/// Removes image markdown, HTML comments (image-needed markers included),
/// code blocks, bare URLs, and heading markers; collapses links to their
/// display text.
pub fn clean_for_word_count(md: &str) -> String {
    let mut result = md.to_string();

    result = CODE_BLOCK_RE.replace_all(&result, " ").to_string();
    result = IMAGE_RE.replace_all(&result, " ").to_string();
    result = HTML_COMMENT_RE.replace_all(&result, " ").to_string();
    result = LINK_RE.replace_all(&result, "$1").to_string();
    result = BARE_URL_RE.replace_all(&result, " ").to_string();
    result = HEADING_MARK_RE.replace_all(&result, "").to_string();

    result
}

/// Count content words after cleaning.
pub fn word_count(md: &str) -> usize {
    clean_for_word_count(md).split_whitespace().count()
}

/// Extract every image reference (real or needed-placeholder) from markdown.
pub fn extract_images(md: &str) -> Vec<ImageRef> {
    let mut images = Vec::new();

    for caps in IMAGE_RE.captures_iter(md) {
        images.push(ImageRef::Url {
            alt: caps[1].to_string(),
            url: caps[2].to_string(),
        });
    }
    for caps in IMAGE_NEEDED_RE.captures_iter(md) {
        images.push(ImageRef::Needed {
            description: caps[1].to_string(),
        });
    }

    images
}

/// Whether the text carries any image markdown or image-needed marker.
pub fn has_image_marker(md: &str) -> bool {
    md.contains("![") || md.contains("Image needed:")
}

/// Remove a section's own redundant `## title` line and collapse
/// consecutive duplicate `##` headers.
pub fn remove_duplicate_headers(content: &str, section_title: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut last_header: Option<&str> = None;

    for line in content.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            let header = header.trim();
            if header.eq_ignore_ascii_case(section_title.trim()) {
                continue;
            }
            if last_header == Some(header) {
                continue;
            }
            last_header = Some(header);
            out.push(line);
        } else {
            if !line.trim().is_empty() {
                last_header = None;
            }
            out.push(line);
        }
    }

    out.join("\n")
}

/// Pull a JSON object out of a model response.
///
/// Models routinely wrap JSON in fenced code blocks or surround it with
/// prose; this peels fences first, then falls back to the widest `{...}`
/// slice, then to the trimmed input.
pub fn extract_json_block(response: &str) -> String {
    let inner = if let Some(after) = response.split_once("```json") {
        after.1.split("```").next().unwrap_or("")
    } else if let Some(after) = response.split_once("```") {
        after.1.split("```").next().unwrap_or("")
    } else {
        response
    };
    let inner = inner.trim();

    if inner.starts_with('{') {
        return inner.to_string();
    }
    match (inner.find('{'), inner.rfind('}')) {
        (Some(start), Some(end)) if end > start => inner[start..=end].to_string(),
        _ => inner.to_string(),
    }
}

/// Filesystem-safe topic name for output files: alphanumerics, hyphens and
/// underscores kept, spaces collapsed to underscores, capped at 50 chars.
pub fn sanitize_topic(topic: &str) -> String {
    let kept: String = topic
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    kept.trim().replace(' ', "_").chars().take(50).collect()
}

/// URL slug for internal-link suggestions: lowercase, non-alphanumerics
/// collapsed to single hyphens.
pub fn slug(term: &str) -> String {
    let mut out = String::with_capacity(term.len());
    let mut prev_hyphen = false;
    for c in term.chars() {
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            prev_hyphen = false;
        } else if !prev_hyphen && !out.is_empty() {
            out.push('-');
            prev_hyphen = true;
        }
    }
    out.trim_end_matches('-').to_string()
}
