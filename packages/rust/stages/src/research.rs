//! Research stage: gathers citations from web search and local files.
//!
//! Individual query failures degrade to the remaining queries; the stage
//! itself only fails if the summary generation call does. With zero sources
//! it still succeeds, with a summary that says so outright.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use draftforge_research::{SearchProvider, load_local_sources};
use draftforge_shared::{
    Citation, FactEntry, FactTable, RequiredFact, ResearchBundle, Result, SourceRef, StageName,
};
use tracing::{debug, warn};

use crate::{Stage, StageContext};

/// Queries actually searched, regardless of how many the planner produced.
const MAX_QUERIES: usize = 5;

/// Upper bound on hits requested per query.
const RESULTS_PER_QUERY_CAP: usize = 5;

/// Sources kept per matched fact.
const MAX_FACT_SOURCES: usize = 3;

/// Characters of source excerpt carried into the fact table.
const FACT_EXCERPT_CHARS: usize = 200;

/// Citations listed in the summary prompt.
const SUMMARY_CITATIONS: usize = 5;

/// Gathers citations, matches required facts to them, and summarizes.
pub struct Research {
    provider: Option<Arc<dyn SearchProvider>>,
    sources_dir: PathBuf,
}

impl Research {
    pub fn new(provider: Option<Arc<dyn SearchProvider>>, sources_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            sources_dir: sources_dir.into(),
        }
    }
}

/// Slice of the plan the Research stage works from.
pub struct ResearchInput {
    pub topic: String,
    pub search_queries: Vec<String>,
    pub required_facts: Vec<RequiredFact>,
}

#[async_trait]
impl Stage for Research {
    type Input = ResearchInput;
    type Output = ResearchBundle;

    const NAME: StageName = StageName::Research;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output> {
        let max_sources = ctx.config.max_sources;
        let mut citations = Vec::new();

        match (&self.provider, ctx.config.enable_web_search) {
            (Some(provider), true) => {
                let query_count = input.search_queries.len().min(MAX_QUERIES);
                if query_count > 0 {
                    // Split the source budget across queries.
                    let per_query = (max_sources / query_count).clamp(1, RESULTS_PER_QUERY_CAP);
                    for query in &input.search_queries[..query_count] {
                        ctx.progress
                            .thought(Self::NAME, &format!("Searching: {query}"));
                        match provider.search(query, per_query).await {
                            Ok(hits) => {
                                citations.extend(hits.into_iter().map(|hit| Citation {
                                    title: hit.title,
                                    url: hit.url,
                                    excerpt: hit.snippet,
                                    // Provider scores are [0,1]; citations use 0-10.
                                    relevance_score: hit.relevance * 10.0,
                                }));
                            }
                            Err(error) => {
                                warn!(query = %query, %error, "search query failed, continuing");
                            }
                        }
                    }
                }
            }
            (None, true) => debug!("no search provider configured, using local sources only"),
            _ => debug!("web search disabled, using local sources only"),
        }

        citations.extend(load_local_sources(&self.sources_dir, max_sources)?);

        ctx.progress.thought(
            Self::NAME,
            &format!("Matching facts against {} sources", citations.len()),
        );
        let fact_table = match_facts(&input.required_facts, &citations);

        let sources_count = citations.len();
        let summary = if citations.is_empty() {
            format!(
                "No sources were found for {}. The article will rely on general \
                 knowledge and carry no citations.",
                input.topic
            )
        } else {
            ctx.progress
                .thought(Self::NAME, "Compiling the research summary...");
            ctx.complete(summary_prompt(&input.topic, &citations, &fact_table))
                .await?
        };

        citations.truncate(max_sources);
        debug!(
            kept = citations.len(),
            found = sources_count,
            facts = fact_table.len(),
            "research complete"
        );

        Ok(ResearchBundle {
            citations,
            fact_table,
            summary,
            sources_count,
        })
    }
}

/// Match each required fact against citation text.
///
/// A citation counts as support when it contains the fact text itself or
/// the fact's kind name ("statistic", "quote", ...). Deliberately loose;
/// the fact-check stage re-verifies claims in the finished draft.
fn match_facts(required: &[RequiredFact], citations: &[Citation]) -> FactTable {
    let mut table = FactTable::new();
    for fact in required {
        let needle = fact.fact.to_lowercase();
        let mut sources = Vec::new();
        for citation in citations {
            let haystack = format!("{} {}", citation.title, citation.excerpt).to_lowercase();
            if haystack.contains(&needle) || haystack.contains(fact.kind.as_str()) {
                sources.push(SourceRef {
                    title: citation.title.clone(),
                    url: citation.url.clone(),
                    excerpt: citation.excerpt.chars().take(FACT_EXCERPT_CHARS).collect(),
                });
                if sources.len() == MAX_FACT_SOURCES {
                    break;
                }
            }
        }
        let verified = !sources.is_empty();
        table.insert(
            fact.fact.clone(),
            FactEntry {
                kind: fact.kind,
                sources,
                verified,
            },
        );
    }
    table
}

fn summary_prompt(topic: &str, citations: &[Citation], facts: &FactTable) -> String {
    let verified = facts.values().filter(|f| f.verified).count();
    let listing = citations
        .iter()
        .take(SUMMARY_CITATIONS)
        .enumerate()
        .map(|(i, c)| format!("{}. {} - {}", i + 1, c.title, c.url))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Summarize the research findings for an article about: {topic}\n\n\
         Citations found: {count}\n\
         Facts verified: {verified} / {total}\n\n\
         Key findings:\n{listing}\n\n\
         Provide a concise research summary (2-3 paragraphs) highlighting:\n\
         1. Key statistics and data points discovered\n\
         2. Authoritative sources found\n\
         3. Gaps in information (if any)",
        count = citations.len(),
        total = facts.len(),
    )
}
