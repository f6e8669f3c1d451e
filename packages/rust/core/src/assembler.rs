//! Final document assembly: stage outputs → [`FinalDocument`] → markdown.

use tracing::debug;

use draftforge_shared::{
    Citation, DocumentSection, FactCheckSummary, FinalDocument, SectionMap, SeoMetadata,
    extract_images, remove_duplicate_headers,
};

/// Citations surfaced in the document and its References list.
const MAX_SURFACED_CITATIONS: usize = 10;

/// Bodies shorter than this render as nothing useful and are dropped.
const MIN_RENDERED_BODY_CHARS: usize = 10;

/// Everything the finished stages contribute to the document.
pub struct AssembleInput {
    pub topic: String,
    pub sections: SectionMap,
    pub citations: Vec<Citation>,
    pub seo: SeoMetadata,
    pub faq: Option<String>,
    pub fact_check: FactCheckSummary,
}

/// Build the final document from the fact-checked sections.
///
/// The document title is the SEO meta title when one was generated, otherwise
/// the topic verbatim. FAQ content becomes a trailing section, citations are
/// capped at [`MAX_SURFACED_CITATIONS`], and image references are lifted out
/// of the section bodies into their own list.
pub fn assemble(input: AssembleInput) -> FinalDocument {
    let AssembleInput {
        topic,
        sections,
        citations,
        seo,
        faq,
        fact_check,
    } = input;

    let mut document_sections: Vec<DocumentSection> = sections.into_sections();

    let mut images = Vec::new();
    for section in &document_sections {
        images.extend(extract_images(&section.content));
    }

    if let Some(faq) = faq.filter(|text| !text.trim().is_empty()) {
        document_sections.push(DocumentSection {
            title: "FAQ".to_string(),
            content: faq,
        });
    }

    let title = if seo.meta_title.is_empty() {
        topic
    } else {
        seo.meta_title.clone()
    };

    let mut citations = citations;
    citations.truncate(MAX_SURFACED_CITATIONS);

    debug!(
        sections = document_sections.len(),
        citations = citations.len(),
        images = images.len(),
        "assembled final document"
    );

    FinalDocument {
        title,
        meta_description: seo.meta_description.clone(),
        sections: document_sections,
        citations,
        fact_check,
        seo,
        images,
    }
}

/// Render the document as publishable markdown.
///
/// Sections whose body is shorter than [`MIN_RENDERED_BODY_CHARS`], or empty
/// once their own redundant header line is removed, are skipped entirely. The
/// SEO comment block at the end is emitted only when `include_meta_tags` is
/// set.
pub fn render_markdown(document: &FinalDocument, include_meta_tags: bool) -> String {
    let mut parts: Vec<String> = Vec::new();

    parts.push(format!("# {}\n", document.title));
    if !document.meta_description.is_empty() {
        parts.push(format!("*{}*\n", document.meta_description));
    }

    for section in &document.sections {
        let content = section.content.trim();
        if content.len() < MIN_RENDERED_BODY_CHARS
            || content == format!("## {}", section.title)
        {
            continue;
        }

        let cleaned = remove_duplicate_headers(content, &section.title);
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            continue;
        }

        parts.push(format!("\n## {}\n", section.title));
        parts.push(format!("{cleaned}\n"));
    }

    if !document.citations.is_empty() {
        parts.push("\n## References\n".to_string());
        for (i, citation) in document.citations.iter().enumerate() {
            parts.push(format!("{}. [{}]({})", i + 1, citation.title, citation.url));
        }
        parts.push(String::new());
    }

    if include_meta_tags {
        parts.push("\n<!-- SEO Metadata -->".to_string());
        parts.push(format!("<!-- Meta Title: {} -->", document.seo.meta_title));
        parts.push(format!(
            "<!-- Meta Description: {} -->",
            document.seo.meta_description
        ));
        if !document.seo.target_keywords.is_empty() {
            parts.push(format!(
                "<!-- Keywords: {} -->",
                document.seo.target_keywords.join(", ")
            ));
        }
    }

    let mut markdown = parts.join("\n");
    if !markdown.ends_with('\n') {
        markdown.push('\n');
    }
    markdown
}
