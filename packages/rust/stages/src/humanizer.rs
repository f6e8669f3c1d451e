//! Humanize stage: strips AI-sounding patterns section by section.
//!
//! Each section is rewritten in place. The prompt tells the model to keep
//! image markers, but the stage does not rely on that: any marker present in
//! the input and absent from the rewrite is appended back verbatim.

use async_trait::async_trait;
use draftforge_shared::{GenerationConfig, Result, SectionMap, StageName, extract_images};
use tracing::{debug, warn};

use crate::{Stage, StageContext};

/// Rewrites every section to read as human-written.
pub struct Humanizer;

/// Humanized sections plus a note per section that actually changed.
pub struct HumanizeOutcome {
    pub sections: SectionMap,
    pub notes: Vec<String>,
}

#[async_trait]
impl Stage for Humanizer {
    type Input = SectionMap;
    type Output = HumanizeOutcome;

    const NAME: StageName = StageName::Humanizer;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        let mut sections = SectionMap::new();
        let mut notes = Vec::new();

        for (title, body) in input.iter() {
            ctx.progress
                .thought(Self::NAME, &format!("Humanizing section: {title}"));

            let rewritten = ctx
                .complete(humanize_prompt(title, body, ctx.config))
                .await?;
            let rewritten = restore_image_markers(body, rewritten);

            if rewritten.trim() != body.trim() {
                notes.push(format!("Humanized {title}"));
            }
            sections.insert(title, rewritten);
        }

        debug!(changed = notes.len(), total = sections.len(), "humanizing complete");
        Ok(HumanizeOutcome { sections, notes })
    }
}

/// Re-append any image marker the rewrite dropped.
fn restore_image_markers(original: &str, mut rewritten: String) -> String {
    for image in extract_images(original) {
        let marker = image.to_marker();
        if !rewritten.contains(&marker) {
            warn!(marker = %marker, "rewrite dropped an image marker, restoring it");
            rewritten.push_str("\n\n");
            rewritten.push_str(&marker);
        }
    }
    rewritten
}

fn humanize_prompt(title: &str, content: &str, config: &GenerationConfig) -> String {
    format!(
        "You are an expert editor specializing in making AI-generated text sound like \
         it was written by a human expert.\n\n\
         Your task: Rewrite this content to sound completely natural and human-written.\n\n\
         Section: {title}\n\
         Tone: {tone}\n\
         Audience: {audience}\n\n\
         INSTRUCTIONS:\n\n\
         1. REMOVE AI-SOUNDING PATTERNS:\n\
         - Eliminate phrases like \"Furthermore\", \"In addition\", \"It is important to note\", \
         \"Additionally\", \"Moreover\"\n\
         - Avoid \"In today's digital landscape\", \"In the realm of\", \"It is worth noting\"\n\
         - Remove excessive qualifiers like \"very\", \"extremely\", \"significantly\" when overused\n\n\
         2. VARY SENTENCE STRUCTURE:\n\
         - Mix short punchy sentences with longer explanatory ones\n\
         - Vary paragraph openings\n\
         - Break up long complex sentences when appropriate\n\n\
         3. ADD HUMAN TOUCHES:\n\
         - Use contractions naturally where appropriate\n\
         - Use specific, concrete language instead of vague generalizations\n\
         - Use active voice primarily\n\n\
         4. PRESERVE:\n\
         - All markdown formatting (headers, lists, code blocks, images)\n\
         - Technical accuracy, facts, citations, and key insights\n\n\
         CRITICAL: Preserve ALL image markdown syntax exactly as written (e.g., \
         <!-- Image needed: ... --> or ![alt](url)). Do not remove, modify, or move images.\n\n\
         Original content:\n{content}\n\n\
         Rewritten human-sounding content:",
        tone = config.tone,
        audience = config.audience,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[tokio::test]
    async fn rewrites_each_section_and_notes_changes() {
        let mut input = SectionMap::new();
        input.insert("Introduction", "Furthermore, it is important to note things.");
        input.insert("Core Concepts", "Moreover, the concepts are significant.");

        let backend = ScriptedBackend::replying(&[
            "Here's the thing about the opening.",
            "The concepts matter, plainly put.",
        ]);
        let config = test_config();

        let outcome = Humanizer
            .process(&ctx(&backend, &config), input)
            .await
            .unwrap();

        let titles: Vec<&str> = outcome.sections.titles().collect();
        assert_eq!(titles, vec!["Introduction", "Core Concepts"]);
        assert_eq!(
            outcome.sections.get("Introduction"),
            Some("Here's the thing about the opening.")
        );
        assert_eq!(
            outcome.notes,
            vec!["Humanized Introduction", "Humanized Core Concepts"]
        );
    }

    #[tokio::test]
    async fn unchanged_section_gets_no_note() {
        let body = "Already reads like a person wrote it.";
        let mut input = SectionMap::new();
        input.insert("Conclusion", body);

        let backend = ScriptedBackend::replying(&[body]);
        let config = test_config();

        let outcome = Humanizer
            .process(&ctx(&backend, &config), input)
            .await
            .unwrap();

        assert!(outcome.notes.is_empty());
    }

    #[tokio::test]
    async fn dropped_image_marker_is_restored_verbatim() {
        let marker = "<!-- Image needed: Diagram of the scheduler -->";
        let mut input = SectionMap::new();
        input.insert(
            "Architecture",
            format!("The scheduler assigns pods to nodes.\n\n{marker}"),
        );

        let backend = ScriptedBackend::replying(&["Pods land on nodes via the scheduler."]);
        let config = test_config();

        let outcome = Humanizer
            .process(&ctx(&backend, &config), input)
            .await
            .unwrap();

        let body = outcome.sections.get("Architecture").unwrap();
        assert!(body.ends_with(marker));
    }

    #[tokio::test]
    async fn kept_marker_is_not_duplicated() {
        let marker = "![scheduler diagram](https://example.com/sched.png)";
        let mut input = SectionMap::new();
        input.insert("Architecture", format!("Original text.\n\n{marker}"));

        let backend = ScriptedBackend::new(vec![Ok(format!("Rewritten text.\n\n{marker}"))]);
        let config = test_config();

        let outcome = Humanizer
            .process(&ctx(&backend, &config), input)
            .await
            .unwrap();

        let body = outcome.sections.get("Architecture").unwrap();
        assert_eq!(body.matches(marker).count(), 1);
    }

    #[tokio::test]
    async fn prompt_carries_the_preservation_instruction() {
        let mut input = SectionMap::new();
        input.insert("Core Concepts", "Body text to rewrite.");

        let backend = ScriptedBackend::replying(&["Rewritten."]);
        let config = test_config();

        Humanizer
            .process(&ctx(&backend, &config), input)
            .await
            .unwrap();

        let prompt = backend.prompt(0);
        assert!(prompt.contains("Preserve ALL image markdown syntax"));
        assert!(prompt.contains("Body text to rewrite."));
        assert!(prompt.contains("Section: Core Concepts"));
    }
}
