//! Write stage: drafts the article section by section.
//!
//! The introduction and conclusion are written from the thesis alone; body
//! sections each get a prompt carrying the facts and citations relevant to
//! their title. A section that comes back trivially short is retried once,
//! and fails the stage if the retry is short too.

use std::sync::Arc;

use async_trait::async_trait;
use draftforge_imagery::RelevanceRanker;
use draftforge_shared::{
    Citation, DraftforgeError, FactEntry, FactTable, GenerationRequest, OutlinePlan,
    OutlineSection, ResearchBundle, Result, SectionGoals, SectionMap, StageName, extract_images,
    has_image_marker,
};
use tracing::{debug, warn};

use crate::{Stage, StageContext};

/// Trimmed length at or below which a drafted section counts as degenerate.
const MIN_SECTION_CHARS: usize = 50;

/// Floor for the per-section word target.
const MIN_WORDS_PER_SECTION: usize = 200;

/// Facts carried into one section prompt.
const FACTS_PER_SECTION: usize = 5;

/// Citations carried into one section prompt.
const CITATIONS_PER_SECTION: usize = 3;

/// Characters of citation excerpt shown in prompts.
const PROMPT_EXCERPT_CHARS: usize = 150;

/// Drafts every section and decorates visual ones with image markers.
pub struct Writer {
    ranker: Option<Arc<RelevanceRanker>>,
}

impl Writer {
    /// `ranker: None` skips image scouting entirely.
    pub fn new(ranker: Option<Arc<RelevanceRanker>>) -> Self {
        Self { ranker }
    }

    async fn drafted(&self, ctx: &StageContext<'_>, prompt: &str, title: &str) -> Result<String> {
        let first = ctx.complete(prompt).await?;
        if !is_degenerate(&first) {
            return Ok(first);
        }

        warn!(section = title, "section came back too short, retrying once");
        let second = ctx.complete(prompt).await?;
        if !is_degenerate(&second) {
            return Ok(second);
        }
        Err(DraftforgeError::degenerate(format!(
            "section {title:?} came back under {MIN_SECTION_CHARS} characters twice"
        )))
    }
}

/// Everything the Write stage consumes.
pub struct WriterInput {
    pub request: GenerationRequest,
    pub plan: OutlinePlan,
    pub research: ResearchBundle,
}

#[async_trait]
impl Stage for Writer {
    type Input = WriterInput;
    type Output = SectionMap;

    const NAME: StageName = StageName::Writer;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        let WriterInput {
            request,
            plan,
            research,
        } = input;

        let body_count = plan
            .sections
            .iter()
            .filter(|s| !is_reserved_title(&s.title))
            .count();
        // Intro and conclusion each take a share of the target.
        let words_per_section = (request.target_word_count.saturating_sub(200) / (body_count + 2))
            .max(MIN_WORDS_PER_SECTION);

        let mut sections = SectionMap::new();

        ctx.progress
            .thought(Self::NAME, "Writing the introduction...");
        let intro_prompt = introduction_prompt(&request, &plan, words_per_section.min(200));
        let intro = ctx.complete(intro_prompt).await?;
        sections.insert("Introduction", intro);

        for (i, section) in plan.sections.iter().enumerate() {
            if is_reserved_title(&section.title) {
                // The intro and conclusion are written from dedicated prompts.
                debug!(title = %section.title, "skipping reserved outline entry");
                continue;
            }

            ctx.progress
                .thought(Self::NAME, &format!("Writing section: {}", section.title));
            let prompt = section_prompt(
                &request,
                section,
                plan.goals_for(i + 1),
                &research.fact_table,
                &research.citations,
                i + 1,
                plan.sections.len(),
                words_per_section,
            );
            let body = self.drafted(ctx, &prompt, &section.title).await?;
            sections.insert(section.title.clone(), body);
        }

        ctx.progress
            .thought(Self::NAME, "Writing the conclusion...");
        let conclusion_prompt = conclusion_prompt(&request, &plan, words_per_section.min(150));
        let conclusion = ctx.complete(conclusion_prompt).await?;
        sections.insert("Conclusion", conclusion);

        if let Some(ranker) = &self.ranker {
            ctx.progress
                .thought(Self::NAME, "Scouting images for visual sections...");
            let urls = fetchable_citation_urls(&research.citations);
            insert_images(ranker, &mut sections, &request.topic, &urls).await;
        }

        debug!(sections = sections.len(), "draft complete");
        Ok(sections)
    }
}

fn is_degenerate(text: &str) -> bool {
    text.trim().chars().count() <= MIN_SECTION_CHARS
}

/// Outline entries the writer handles itself rather than as body sections.
fn is_reserved_title(title: &str) -> bool {
    title.eq_ignore_ascii_case("introduction") || title.eq_ignore_ascii_case("conclusion")
}

/// Citation URLs the image ranker can actually fetch (no `file://`).
pub fn fetchable_citation_urls(citations: &[Citation]) -> Vec<String> {
    citations
        .iter()
        .map(|c| c.url.clone())
        .filter(|url| url.starts_with("http"))
        .collect()
}

/// Append one image marker per eligible section, skipping any section that
/// already carries an image. Never fails; the ranker degrades internally.
pub async fn insert_images(
    ranker: &RelevanceRanker,
    sections: &mut SectionMap,
    topic: &str,
    citation_urls: &[String],
) {
    let titles: Vec<String> = sections.titles().map(str::to_string).collect();
    for title in titles {
        if is_reserved_title(&title) {
            continue;
        }
        let Some(body) = sections.get(&title) else {
            continue;
        };
        if has_image_marker(body) {
            continue;
        }
        if let Some(image) = ranker.find_image(&title, body, topic, citation_urls).await {
            let marker = image.to_marker();
            debug!(section = %title, "attaching image marker");
            if let Some(body) = sections.get_mut(&title) {
                body.push_str("\n\n");
                body.push_str(&marker);
            }
        }
    }
}

/// One "add roughly N more words" call for a section below its word target.
pub async fn expand_section(
    ctx: &StageContext<'_>,
    current: &str,
    title: &str,
    topic: &str,
    additional_words: usize,
) -> Result<String> {
    let prompt = format!(
        "Expand the following section of an article about {topic}. Add approximately \
         {additional_words} more words of detailed, actionable content.\n\n\
         Current content:\n{current}\n\n\
         Requirements:\n\
         - Add more depth and detail specifically about {topic}\n\
         - Include additional examples, case studies, or technical details\n\
         - Add H3 subsections (###) if appropriate\n\
         - Maintain the tone and style of the existing content\n\n\
         Write the expanded section, keeping ALL existing content and adding new \
         detail. Do not remove or summarize existing content. The section is \
         titled \"{title}\"; do not include that title as a header."
    );
    let mut expanded = ctx.complete(prompt).await?;
    // Expansion runs after image scouting, so a dropped marker must come back.
    for image in extract_images(current) {
        let marker = image.to_marker();
        if !expanded.contains(&marker) {
            warn!(section = title, marker = %marker, "expansion dropped an image marker, restoring it");
            expanded.push_str("\n\n");
            expanded.push_str(&marker);
        }
    }
    Ok(expanded)
}

fn introduction_prompt(
    request: &GenerationRequest,
    plan: &OutlinePlan,
    target_words: usize,
) -> String {
    format!(
        "Write a compelling, focused introduction for an article about: {topic}\n\n\
         Thesis: {thesis}\n\
         Angle: {angle}\n\
         Tone: {tone}\n\
         Audience: {audience}\n\n\
         Requirements:\n\
         - Hook the reader in the first sentence with a specific point about {topic}\n\
         - Establish the problem or challenge related to {topic}\n\
         - Present the thesis clearly\n\
         - Preview what the article will cover\n\
         - Length: {target_words} words MINIMUM\n\n\
         Write the introduction content. DO NOT include any markdown headers.",
        topic = request.topic,
        thesis = plan.thesis,
        angle = plan.angle,
        tone = request.tone,
        audience = request.audience,
    )
}

#[allow(clippy::too_many_arguments)]
fn section_prompt(
    request: &GenerationRequest,
    section: &OutlineSection,
    goals: Option<&SectionGoals>,
    fact_table: &FactTable,
    citations: &[Citation],
    number: usize,
    total: usize,
    target_words: usize,
) -> String {
    let subsections = if section.subsections.is_empty() {
        "None specified".to_string()
    } else {
        section.subsections.join(", ")
    };
    let goals = goals.cloned().unwrap_or_default();

    format!(
        "Write section {number} of {total} for an article about {topic}. Focus on \
         {topic} and avoid generic information.\n\n\
         Section Title: {title}\n\
         Description: {description}\n\
         Subsections to cover: {subsections}\n\n\
         Learning Objectives: {objectives}\n\
         Key Points: {key_points}\n\
         Desired Outcome: {outcome}\n\n\
         Relevant Facts and Data:\n{facts}\n\n\
         Relevant Citations:\n{cites}\n\n\
         Requirements:\n\
         - Tone: {tone}\n\
         - Audience: {audience}\n\
         - Length: {target_words} words MINIMUM\n\
         - Use clear H3 subsections (###) to organize content\n\
         - Use citations naturally (e.g., \"According to [Source]...\")\n\
         - Include specific numbers, metrics, or technical details when relevant\n\
         - Include a relevant image suggestion in markdown format when appropriate: \
         ![Alt text](image-url)\n\n\
         CRITICAL:\n\
         - DO NOT include the section title \"## {title}\" as a header.\n\
         - Start directly with the content. Use ### for H3 subsections.\n\
         - Write AT LEAST {target_words} words of substantial, detailed content.",
        topic = request.topic,
        title = section.title,
        description = section.description,
        objectives = goals.objectives.join("; "),
        key_points = goals.key_points.join("; "),
        outcome = goals.outcome,
        facts = format_facts(&relevant_facts(&section.title, fact_table)),
        cites = format_citations(&relevant_citations(&section.title, citations)),
        tone = request.tone,
        audience = request.audience,
    )
}

fn conclusion_prompt(
    request: &GenerationRequest,
    plan: &OutlinePlan,
    target_words: usize,
) -> String {
    format!(
        "Write a strong, focused conclusion for an article about: {topic}\n\n\
         Thesis: {thesis}\n\
         Tone: {tone}\n\
         Audience: {audience}\n\n\
         Requirements:\n\
         - Reinforce the main thesis in relation to {topic}\n\
         - Summarize key takeaways\n\
         - End with a call to action or forward-looking statement\n\
         - Length: {target_words} words\n\n\
         Write the conclusion content. DO NOT include any markdown headers.",
        topic = request.topic,
        thesis = plan.thesis,
        tone = request.tone,
        audience = request.audience,
    )
}

/// Section-title keywords, the same filter the research matcher uses.
fn title_keywords(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(str::to_string)
        .collect()
}

fn relevant_facts<'a>(title: &str, fact_table: &'a FactTable) -> Vec<(&'a str, &'a FactEntry)> {
    let keywords = title_keywords(title);
    fact_table
        .iter()
        .filter(|(fact, _)| {
            let fact = fact.to_lowercase();
            keywords.iter().any(|k| fact.contains(k.as_str()))
        })
        .map(|(fact, entry)| (fact.as_str(), entry))
        .take(FACTS_PER_SECTION)
        .collect()
}

fn relevant_citations<'a>(title: &str, citations: &'a [Citation]) -> Vec<&'a Citation> {
    let keywords = title_keywords(title);
    citations
        .iter()
        .filter(|c| {
            let text = format!("{} {}", c.title, c.excerpt).to_lowercase();
            keywords.iter().any(|k| text.contains(k.as_str()))
        })
        .take(CITATIONS_PER_SECTION)
        .collect()
}

fn format_facts(facts: &[(&str, &FactEntry)]) -> String {
    if facts.is_empty() {
        return "No specific facts provided for this section.".to_string();
    }
    facts
        .iter()
        .map(|(fact, entry)| {
            let mut line = format!("- {fact} [{}]", entry.kind.as_str());
            if entry.verified {
                let titles: Vec<&str> = entry
                    .sources
                    .iter()
                    .take(2)
                    .map(|s| s.title.as_str())
                    .collect();
                line.push_str(&format!(" (verified; sources: {})", titles.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_citations(citations: &[&Citation]) -> String {
    if citations.is_empty() {
        return "No specific citations provided for this section.".to_string();
    }
    citations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let excerpt: String = c.excerpt.chars().take(PROMPT_EXCERPT_CHARS).collect();
            format!("{}. {} ({})\n   Excerpt: {excerpt}...", i + 1, c.title, c.url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
