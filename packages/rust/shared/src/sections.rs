//! Ordered section map, the payload every content stage mutates.
//!
//! Section order is display order, so this is a vector with map-like access
//! rather than a hash map. Inserting an existing title replaces its body in
//! place and keeps the original position.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::types::DocumentSection;

/// Ordered mapping from section title to markdown body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionMap(Vec<DocumentSection>);

impl SectionMap {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of sections.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert a section. An existing title is replaced in place; a new title
    /// is appended at the end.
    pub fn insert(&mut self, title: impl Into<String>, content: impl Into<String>) {
        let title = title.into();
        let content = content.into();
        match self.0.iter_mut().find(|s| s.title == title) {
            Some(existing) => existing.content = content,
            None => self.0.push(DocumentSection { title, content }),
        }
    }

    /// Body for an exact title match.
    pub fn get(&self, title: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.content.as_str())
    }

    /// Mutable body for an exact title match.
    pub fn get_mut(&mut self, title: &str) -> Option<&mut String> {
        self.0
            .iter_mut()
            .find(|s| s.title == title)
            .map(|s| &mut s.content)
    }

    /// Remove a section, returning its body.
    pub fn remove(&mut self, title: &str) -> Option<String> {
        let idx = self.0.iter().position(|s| s.title == title)?;
        Some(self.0.remove(idx).content)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.0.iter().any(|s| s.title == title)
    }

    /// Titles in display order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.title.as_str())
    }

    /// `(title, body)` pairs in display order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|s| (s.title.as_str(), s.content.as_str()))
    }

    /// Consume into the ordered section vector.
    pub fn into_sections(self) -> Vec<DocumentSection> {
        self.0
    }

    /// Flatten into one markdown document for whole-article passes.
    ///
    /// Boundaries carry the title list and each section's span in the
    /// flattened text, so re-splitting edited output works against known
    /// titles instead of whatever header lines a model returns.
    pub fn flatten(&self) -> FlatSections {
        let mut text = String::new();
        let mut boundaries = Vec::with_capacity(self.0.len());

        for (i, section) in self.0.iter().enumerate() {
            if i > 0 {
                text.push_str("\n\n");
            }
            let start = text.len();
            text.push_str("## ");
            text.push_str(&section.title);
            text.push_str("\n\n");
            text.push_str(&section.content);
            boundaries.push(SectionBoundary {
                title: section.title.clone(),
                span: start..text.len(),
            });
        }

        FlatSections { text, boundaries }
    }
}

impl FromIterator<(String, String)> for SectionMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut map = SectionMap::new();
        for (title, content) in iter {
            map.insert(title, content);
        }
        map
    }
}

impl IntoIterator for SectionMap {
    type Item = DocumentSection;
    type IntoIter = std::vec::IntoIter<DocumentSection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// One section's position within a flattened document.
#[derive(Debug, Clone)]
pub struct SectionBoundary {
    pub title: String,
    /// Byte span of the section (header included) in the flattened text.
    pub span: Range<usize>,
}

/// A flattened document plus the out-of-band boundary list.
#[derive(Debug, Clone)]
pub struct FlatSections {
    pub text: String,
    pub boundaries: Vec<SectionBoundary>,
}

impl FlatSections {
    /// Titles in their original order.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.boundaries.iter().map(|b| b.title.as_str())
    }

    /// Original body text for a title, recovered from the flattened input.
    pub fn original_body(&self, title: &str) -> Option<&str> {
        let boundary = self.boundaries.iter().find(|b| b.title == title)?;
        let chunk = &self.text[boundary.span.clone()];
        // Drop the "## title" header line the flattening added.
        let body = chunk.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        Some(body.trim_start_matches('\n'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SectionMap {
        let mut map = SectionMap::new();
        map.insert("Introduction", "Opening paragraph.");
        map.insert("Core Concepts", "The meat of the article.");
        map.insert("Conclusion", "Wrapping up.");
        map
    }

    #[test]
    fn insert_preserves_order_and_replaces_in_place() {
        let mut map = sample();
        map.insert("Core Concepts", "Rewritten body.");

        let titles: Vec<&str> = map.titles().collect();
        assert_eq!(titles, vec!["Introduction", "Core Concepts", "Conclusion"]);
        assert_eq!(map.get("Core Concepts"), Some("Rewritten body."));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn remove_returns_body() {
        let mut map = sample();
        let body = map.remove("Introduction");
        assert_eq!(body.as_deref(), Some("Opening paragraph."));
        assert!(!map.contains("Introduction"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn flatten_produces_headers_and_spans() {
        let map = sample();
        let flat = map.flatten();

        assert!(flat.text.starts_with("## Introduction\n\nOpening paragraph."));
        assert_eq!(flat.boundaries.len(), 3);
        // Each span slices to a chunk starting with its own header.
        for boundary in &flat.boundaries {
            let chunk = &flat.text[boundary.span.clone()];
            assert!(chunk.starts_with(&format!("## {}", boundary.title)));
        }
    }

    #[test]
    fn flatten_recovers_original_bodies() {
        let map = sample();
        let flat = map.flatten();
        assert_eq!(flat.original_body("Core Concepts"), Some("The meat of the article."));
        assert_eq!(flat.original_body("Missing"), None);
    }

    #[test]
    fn serializes_as_ordered_sequence() {
        let map = sample();
        let json = serde_json::to_string(&map).expect("serialize");
        assert!(json.starts_with(r#"[{"title":"Introduction""#));
        let parsed: SectionMap = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, map);
    }
}
