//! Local source-file ingestion.
//!
//! Plain `.txt`/`.md` files in the configured sources directory become
//! citations with `file://` URLs, so research works fully offline.

use std::path::Path;

use draftforge_shared::{Citation, Result};
use tracing::{debug, warn};

/// Characters of each file used as the citation excerpt.
const EXCERPT_CHARS: usize = 500;

/// Relevance assigned to local sources (mid-scale; no provider score exists).
const LOCAL_RELEVANCE: f64 = 5.0;

/// Ingest local source files as citations, at most `limit` of them.
///
/// A missing directory yields an empty list; unreadable files are skipped
/// with a warning. Files are visited in name order for determinism.
pub fn load_local_sources(dir: &Path, limit: usize) -> Result<Vec<Citation>> {
    if !dir.is_dir() {
        debug!(?dir, "sources directory not present, skipping local ingestion");
        return Ok(Vec::new());
    }

    let mut paths: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
            })
            .collect(),
        Err(e) => {
            warn!(?dir, error = %e, "could not read sources directory");
            return Ok(Vec::new());
        }
    };
    paths.sort();

    let mut citations = Vec::new();
    for path in paths.into_iter().take(limit) {
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(?path, error = %e, "skipping unreadable source file");
                continue;
            }
        };

        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("local source")
            .replace(['_', '-'], " ");

        citations.push(Citation {
            title,
            url: format!("file://{}", path.display()),
            excerpt: content.chars().take(EXCERPT_CHARS).collect(),
            relevance_score: LOCAL_RELEVANCE,
        });
    }

    debug!(count = citations.len(), "ingested local sources");
    Ok(citations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_sources_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("draftforge-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn missing_directory_yields_empty() {
        let dir = std::env::temp_dir().join("draftforge-does-not-exist-xyz");
        let citations = load_local_sources(&dir, 10).expect("load");
        assert!(citations.is_empty());
    }

    #[test]
    fn ingests_txt_and_md_in_name_order() {
        let dir = temp_sources_dir("ingest");
        std::fs::write(dir.join("b_notes.md"), "Markdown notes about schedulers.").unwrap();
        std::fs::write(dir.join("a_survey.txt"), "Survey text. ".repeat(100)).unwrap();
        std::fs::write(dir.join("ignored.pdf"), "binary-ish").unwrap();

        let citations = load_local_sources(&dir, 10).expect("load");
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].title, "a survey");
        assert!(citations[0].url.starts_with("file://"));
        // Excerpt is capped.
        assert_eq!(citations[0].excerpt.chars().count(), EXCERPT_CHARS);
        assert_eq!(citations[1].title, "b notes");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn respects_limit() {
        let dir = temp_sources_dir("limit");
        for i in 0..5 {
            std::fs::write(dir.join(format!("source_{i}.txt")), "text").unwrap();
        }

        let citations = load_local_sources(&dir, 2).expect("load");
        assert_eq!(citations.len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
