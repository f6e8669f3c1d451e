//! Edit stage: whole-article passes for flow, clarity, repetition, and style.
//!
//! The section map is flattened into one document so the model can fix
//! transitions across section boundaries, then re-split against the known
//! title list. Titles the edited text no longer contains are reported in
//! [`EditOutcome::missing`] instead of being silently dropped; the pipeline
//! restores those from the pre-edit draft.

use async_trait::async_trait;
use draftforge_shared::{GenerationConfig, Result, SectionMap, StageName};
use tracing::{debug, warn};

use crate::{Stage, StageContext};

/// Runs the four editing passes over the flattened draft.
pub struct Editor;

/// Edited sections plus what the passes did and what they lost.
pub struct EditOutcome {
    pub sections: SectionMap,
    /// Human-readable notes on which passes changed the text.
    pub improvements: Vec<String>,
    /// Known titles absent from the edited text, in original order.
    pub missing: Vec<String>,
}

#[async_trait]
impl Stage for Editor {
    type Input = SectionMap;
    type Output = EditOutcome;

    const NAME: StageName = StageName::Editor;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        let flat = input.flatten();
        let mut improvements = Vec::new();

        ctx.progress
            .thought(Self::NAME, "Improving flow and transitions...");
        let flowed = ctx.complete(flow_prompt(&flat.text, ctx.config)).await?;
        if flowed.trim() != flat.text.trim() {
            improvements.push("Improved overall flow and transitions between sections".to_string());
        }

        ctx.progress
            .thought(Self::NAME, "Tightening clarity and readability...");
        let clarified = ctx.complete(clarity_prompt(&flowed, ctx.config)).await?;
        if clarified.trim() != flowed.trim() {
            improvements.push("Enhanced clarity and readability".to_string());
        }

        ctx.progress.thought(Self::NAME, "Removing repetition...");
        // Repeated headers are cut mechanically first; the model pass then
        // only has to deal with repeated prose.
        let pruned = drop_repeated_headers(&clarified);
        let deduped = ctx.complete(dedup_prompt(&pruned)).await?;
        if deduped.trim() != clarified.trim() {
            improvements.push("Removed repetitive phrases and ideas".to_string());
        }

        let styled = if ctx.config.style_rules.is_empty() {
            deduped
        } else {
            ctx.progress.thought(Self::NAME, "Applying the style guide...");
            let styled = ctx.complete(style_prompt(&deduped, ctx.config)).await?;
            if styled.trim() != deduped.trim() {
                improvements.push("Applied style guide requirements".to_string());
            }
            styled
        };

        let known: Vec<&str> = flat.titles().collect();
        let (sections, missing) = split_against_titles(&styled, &known);
        if !missing.is_empty() {
            warn!(?missing, "edited text lost sections, flagging for restore");
        }
        debug!(
            sections = sections.len(),
            passes = improvements.len(),
            "editing complete"
        );

        Ok(EditOutcome {
            sections,
            improvements,
            missing,
        })
    }
}

/// Keep only the first occurrence of each `## ` header line.
fn drop_repeated_headers(text: &str) -> String {
    let mut seen: Vec<&str> = Vec::new();
    let mut kept: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.starts_with("## ") {
            let header = line.trim();
            if seen.contains(&header) {
                continue;
            }
            seen.push(header);
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Re-split edited text against the known title list.
///
/// Only `## ` lines matching a known title (case-insensitively) count as
/// boundaries, so headers the model invented stay inside the preceding
/// section's body. Sections come back in their original order; a duplicate
/// header keeps its first non-empty body.
fn split_against_titles(text: &str, titles: &[&str]) -> (SectionMap, Vec<String>) {
    let lines: Vec<&str> = text.lines().collect();

    let mut found: Vec<(usize, &str)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(header) = line.trim_start().strip_prefix("## ") {
            let header = header.trim();
            if let Some(canonical) = titles
                .iter()
                .find(|t| t.eq_ignore_ascii_case(header))
                .copied()
            {
                found.push((i, canonical));
            }
        }
    }

    let mut extracted = SectionMap::new();
    for (pos, (line_idx, title)) in found.iter().enumerate() {
        if extracted.contains(title) {
            continue;
        }
        let end = found.get(pos + 1).map_or(lines.len(), |(next, _)| *next);
        let body = lines[line_idx + 1..end].join("\n").trim().to_string();
        if !body.is_empty() {
            extracted.insert(*title, body);
        }
    }

    let mut sections = SectionMap::new();
    let mut missing = Vec::new();
    for title in titles {
        match extracted.remove(title) {
            Some(body) => sections.insert(*title, body),
            None => missing.push(title.to_string()),
        }
    }
    (sections, missing)
}

fn flow_prompt(article: &str, config: &GenerationConfig) -> String {
    format!(
        "You are an expert editor. Improve the flow and coherence of this article.\n\n\
         Tone: {tone}\n\
         Audience: {audience}\n\n\
         Focus on:\n\
         1. Smooth transitions between sections\n\
         2. Logical progression of ideas\n\
         3. Connecting paragraphs naturally\n\n\
         Return the improved article with better flow. Keep all the original content \
         and structure, just improve transitions and connections.\n\n\
         Article:\n{article}",
        tone = config.tone,
        audience = config.audience,
    )
}

fn clarity_prompt(article: &str, config: &GenerationConfig) -> String {
    format!(
        "You are an expert editor. Improve the clarity and readability of this article.\n\n\
         Audience: {audience}\n\n\
         Focus on:\n\
         1. Simplifying complex sentences\n\
         2. Clarifying ambiguous statements\n\
         3. Using precise language\n\
         4. Making technical concepts accessible\n\n\
         Return the improved article with enhanced clarity. Maintain the same meaning \
         and structure.\n\n\
         Article:\n{article}",
        audience = config.audience,
    )
}

fn dedup_prompt(article: &str) -> String {
    format!(
        "You are an expert editor. Remove repetitive content from this article.\n\n\
         Focus on:\n\
         1. Eliminating repeated phrases or sentences\n\
         2. Consolidating redundant ideas\n\
         3. Keeping only the best version of repeated concepts\n\
         4. Removing duplicate section headers (keep only the first occurrence)\n\n\
         Return the article without repetitions. Maintain all unique information \
         and insights.\n\n\
         Article:\n{article}"
    )
}

fn style_prompt(article: &str, config: &GenerationConfig) -> String {
    let rules = config
        .style_rules
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an expert editor. Apply the following style guide to this article.\n\n\
         Tone: {tone}\n\
         Style Guide Rules:\n{rules}\n\n\
         Ensure the article follows all style guide requirements while maintaining \
         its quality and meaning.\n\n\
         Article:\n{article}",
        tone = config.tone,
    )
}
