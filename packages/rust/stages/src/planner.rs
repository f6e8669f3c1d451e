//! Plan stage: turns a topic into an article outline.
//!
//! One completion call asks for the whole plan as JSON. A malformed or
//! section-less reply falls back to a built-in template outline, so this
//! stage only fails when the backend call itself does.

use async_trait::async_trait;
use draftforge_shared::{
    GenerationRequest, OutlinePlan, OutlineSection, Result, StageName, extract_json_block,
};
use tracing::{debug, warn};

use crate::{Stage, StageContext};

/// Produces the [`OutlinePlan`] every later stage works from.
pub struct Planner;

#[async_trait]
impl Stage for Planner {
    type Input = GenerationRequest;
    type Output = OutlinePlan;

    const NAME: StageName = StageName::Planner;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        ctx.progress
            .thought(Self::NAME, "Planning the article structure...");

        let response = ctx.complete(plan_prompt(&input, ctx.config.tone.as_str())).await?;

        let plan = match serde_json::from_str::<OutlinePlan>(&extract_json_block(&response)) {
            Ok(plan) if !plan.sections.is_empty() => plan,
            Ok(_) => {
                warn!("plan had no sections, using the template outline");
                fallback_plan(&input.topic, &input.audience)
            }
            Err(error) => {
                warn!(%error, "plan was not valid JSON, using the template outline");
                fallback_plan(&input.topic, &input.audience)
            }
        };

        debug!(
            sections = plan.sections.len(),
            queries = plan.search_queries.len(),
            "plan ready"
        );
        ctx.progress.thought(
            Self::NAME,
            &format!("Outlined {} sections", plan.sections.len()),
        );
        Ok(plan)
    }
}

fn plan_prompt(request: &GenerationRequest, tone: &str) -> String {
    format!(
        r#"You are an expert content strategist creating a comprehensive article plan.

Topic: {topic}
Target Audience: {audience}
Tone: {tone}
Target Word Count: {words}

IMPORTANT: Focus specifically on {topic}. Create a plan that addresses {topic} directly, not general information about the broader subject area.

Create a detailed plan with:

1. **Angle**: A unique perspective on the topic that will engage the audience
2. **Thesis**: The main argument of the article
3. **Outline**: 5-7 body sections, each with a section title (H2), optional subsection titles (H3), and a brief description
4. **Section Goals**: For each section, what the reader should learn, key points to cover, and the desired outcome
5. **Required Facts**: Specific facts, statistics, or data points the article needs
6. **Search Queries**: 5-10 specific queries to gather research

Do not include "Introduction" or "Conclusion" in the outline; they are written separately.

Return your response as a JSON object with this exact structure:
{{
    "angle": "...",
    "thesis": "...",
    "outline": [
        {{
            "section_title": "...",
            "subsections": ["..."],
            "description": "..."
        }}
    ],
    "section_goals": {{
        "section_1": {{
            "learning_objectives": ["..."],
            "key_points": ["..."],
            "desired_outcome": "..."
        }}
    }},
    "required_facts": [
        {{
            "fact": "...",
            "type": "statistic|quote|example|definition"
        }}
    ],
    "search_queries": ["...", "..."]
}}"#,
        topic = request.topic,
        audience = request.audience,
        tone = tone,
        words = request.target_word_count,
    )
}

/// Minimal but valid outline used when the model's plan cannot be parsed.
fn fallback_plan(topic: &str, audience: &str) -> OutlinePlan {
    let section = |title: &str, description: &str| OutlineSection {
        title: title.to_string(),
        subsections: Vec::new(),
        description: description.to_string(),
    };

    OutlinePlan {
        angle: format!("An in-depth exploration of {topic} for {audience}"),
        thesis: format!("This article examines {topic} and its practical implications."),
        sections: vec![
            section("Understanding the Core Concepts", "Explain fundamental concepts"),
            section("Key Benefits and Applications", "Discuss practical applications"),
            section("Best Practices", "Provide actionable recommendations"),
        ],
        section_goals: Default::default(),
        required_facts: Vec::new(),
        search_queries: vec![
            format!("{topic} statistics"),
            format!("{topic} best practices"),
            format!("{topic} enterprise"),
        ],
    }
}
