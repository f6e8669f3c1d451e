//! Output file writing: one markdown and one JSON rendering per run.
//!
//! Files are written atomically (temp file, then rename) so a crashed run
//! never leaves a half-written article behind, and file names carry a
//! timestamp so repeated runs on the same topic never overwrite each other.

use std::path::{Path, PathBuf};

use chrono::Local;
use sha2::{Digest, Sha256};
use tracing::debug;

use draftforge_shared::{DraftforgeError, FinalDocument, Result, sanitize_topic};

/// Paths and content checksums of the files written for one run.
#[derive(Debug, Clone)]
pub struct OutputFiles {
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
    pub markdown_sha256: String,
    pub json_sha256: String,
}

/// Write the rendered markdown and the structured JSON for a finished run.
///
/// Both files share a `{topic}_{timestamp}` stem under `output_dir`, which is
/// created if missing.
pub fn write_document(
    output_dir: &Path,
    topic: &str,
    document: &FinalDocument,
    markdown: &str,
) -> Result<OutputFiles> {
    std::fs::create_dir_all(output_dir).map_err(|e| DraftforgeError::io(output_dir, e))?;

    let stem = format!(
        "{}_{}",
        sanitize_topic(topic),
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let markdown_path = output_dir.join(format!("{stem}.md"));
    let json_path = output_dir.join(format!("{stem}.json"));

    let json = serde_json::to_string_pretty(document)
        .map_err(|e| DraftforgeError::validation(format!("JSON serialization failed: {e}")))?;

    let markdown_sha256 = write_atomic(&markdown_path, markdown)?;
    let json_sha256 = write_atomic(&json_path, &json)?;

    debug!(
        markdown = %markdown_path.display(),
        json = %json_path.display(),
        "wrote article files"
    );

    Ok(OutputFiles {
        markdown_path,
        json_path,
        markdown_sha256,
        json_sha256,
    })
}

/// Write `content` to a temp file and rename it over `target`.
///
/// Returns the sha256 of the content as a lowercase hex string.
fn write_atomic(target: &Path, content: &str) -> Result<String> {
    let file_name = target
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("article");
    let temp = target.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| DraftforgeError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| DraftforgeError::io(target, e))?;

    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftforge_shared::{FactCheckSummary, SeoMetadata};

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("df-output-test-{}", uuid::Uuid::now_v7()))
    }

    fn sample_document() -> FinalDocument {
        FinalDocument {
            title: "Kubernetes Basics".to_string(),
            meta_description: "A short guide.".to_string(),
            sections: Vec::new(),
            citations: Vec::new(),
            fact_check: FactCheckSummary::default(),
            seo: SeoMetadata::default(),
            images: Vec::new(),
        }
    }

    #[test]
    fn writes_markdown_and_json_with_checksums() {
        let dir = temp_dir();
        let document = sample_document();

        let files = write_document(&dir, "Kubernetes Basics", &document, "# Kubernetes Basics\n")
            .expect("write");

        assert!(files.markdown_path.exists());
        assert!(files.json_path.exists());
        assert_eq!(files.markdown_sha256.len(), 64);
        assert_eq!(files.json_sha256.len(), 64);

        let markdown = std::fs::read_to_string(&files.markdown_path).expect("read markdown");
        assert_eq!(markdown, "# Kubernetes Basics\n");
        let json = std::fs::read_to_string(&files.json_path).expect("read json");
        assert!(json.contains("\"title\": \"Kubernetes Basics\""));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_names_start_with_the_sanitized_topic() {
        let dir = temp_dir();
        let document = sample_document();

        let files =
            write_document(&dir, "How Do I: CI/CD?", &document, "content").expect("write");

        let name = files
            .markdown_path
            .file_name()
            .and_then(|n| n.to_str())
            .expect("file name");
        assert!(name.starts_with("How_Do_I_CICD"), "got {name}");
        assert!(name.ends_with(".md"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = temp_dir();
        let document = sample_document();

        write_document(&dir, "Topic", &document, "content").expect("write");

        let leftovers: Vec<_> = std::fs::read_dir(&dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
