//! End-to-end article pipeline: topic → plan → research → draft → polish → files.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use draftforge_backend::ChatBackend;
use draftforge_imagery::RelevanceRanker;
use draftforge_research::SearchProvider;
use draftforge_shared::{
    AppConfig, FinalDocument, GenerationRequest, RequestOverrides, Result, RunId, SectionMap,
    StageName, StageReport, StageStatus, SystemSettings, has_image_marker, resolve_config,
    word_count,
};
use draftforge_stages::{
    EditOutcome, Editor, FactCheckInput, FactChecker, Humanizer, Planner, Research, ResearchInput,
    SeoInput, SeoOptimizer, Stage, StageContext, StageProgress, Writer, WriterInput,
    expand_section, fetchable_citation_urls, insert_images,
};

use crate::assembler::{self, AssembleInput};
use crate::output::{self, OutputFiles};

/// Supplementary sections excluded from content word counts.
const UNCOUNTED_SECTIONS: [&str; 3] = ["References", "FAQ", "Disclaimer"];

/// The seven stages plus everything between them: configuration resolution,
/// expansion to the word-count floor, post-edit section restore, image
/// repair, assembly, and output writing.
pub struct ArticlePipeline {
    backend: Arc<dyn ChatBackend>,
    search: Option<Arc<dyn SearchProvider>>,
    ranker: Option<Arc<RelevanceRanker>>,
    app: AppConfig,
    system: SystemSettings,
    output_dir: PathBuf,
    sources_dir: PathBuf,
}

/// Result of one complete pipeline run.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// Identifier for this run.
    pub run_id: RunId,
    /// The assembled document.
    pub document: FinalDocument,
    /// What the research stage found; explicit even when zero sources.
    pub research_summary: String,
    /// Per-stage execution records, in pipeline order.
    pub reports: Vec<StageReport>,
    /// Content words in the final document, supplementary sections excluded.
    pub word_count: usize,
    /// Paths and checksums of the written files.
    pub files: OutputFiles,
    /// Total elapsed time.
    pub elapsed: Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressSink: Send + Sync {
    /// Called when a stage begins.
    fn stage_started(&self, stage: StageName);
    /// Called when a stage finishes, successfully or not.
    fn stage_finished(&self, stage: StageName, status: StageStatus, elapsed: Duration);
    /// Free-form status line streamed from inside a stage.
    fn thought(&self, stage: StageName, message: &str);
    /// Called once when the pipeline completes.
    fn done(&self, outcome: &GenerationOutcome);
}

/// No-op progress sink for headless/test usage.
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn stage_started(&self, _stage: StageName) {}
    fn stage_finished(&self, _stage: StageName, _status: StageStatus, _elapsed: Duration) {}
    fn thought(&self, _stage: StageName, _message: &str) {}
    fn done(&self, _outcome: &GenerationOutcome) {}
}

impl ArticlePipeline {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        app: AppConfig,
        system: SystemSettings,
        output_dir: impl Into<PathBuf>,
        sources_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            search: None,
            ranker: None,
            app,
            system,
            output_dir: output_dir.into(),
            sources_dir: sources_dir.into(),
        }
    }

    /// Enable web research. Without a provider the research stage works from
    /// local sources only.
    pub fn with_search(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(provider);
        self
    }

    /// Enable image scouting. Without a ranker drafts carry no images.
    pub fn with_ranker(mut self, ranker: Arc<RelevanceRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    /// Run the full generation pipeline for one topic.
    ///
    /// 1. Plan the outline
    /// 2. Research sources and facts
    /// 3. Write the draft (and expand it to the word-count floor)
    /// 4. Edit, restoring any section the edit lost
    /// 5. Humanize
    /// 6. Optimize for search
    /// 7. Fact-check, then assemble and write the output files
    ///
    /// The first stage error halts the run; nothing is written for a failed
    /// run.
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn run(
        &self,
        topic: &str,
        overrides: &RequestOverrides,
        progress: &dyn ProgressSink,
    ) -> Result<GenerationOutcome> {
        let start = Instant::now();
        let run_id = RunId::new();

        // --- Resolve configuration ---
        let config = resolve_config(&self.app, &self.system, overrides);
        config.validate()?;

        let request = GenerationRequest {
            topic: topic.to_string(),
            audience: config.audience.clone(),
            tone: config.tone,
            target_word_count: config.max_word_count,
            min_word_count: config.min_word_count,
            keywords: config.keywords.clone(),
        };

        info!(%run_id, model = %config.model, "starting generation pipeline");

        let thoughts = SinkThoughts { inner: progress };
        let ctx = StageContext::new(self.backend.as_ref(), &config, &thoughts);
        let mut reports = Vec::with_capacity(StageName::ALL.len());

        // --- Stage 1: Plan ---
        let plan = run_stage(&Planner, &ctx, request.clone(), &mut reports, progress).await?;
        info!(sections = plan.sections.len(), "outline ready");

        // --- Stage 2: Research ---
        let research_input = ResearchInput {
            topic: topic.to_string(),
            search_queries: plan.search_queries.clone(),
            required_facts: plan.required_facts.clone(),
        };
        let research = run_stage(
            &Research::new(self.search.clone(), self.sources_dir.clone()),
            &ctx,
            research_input,
            &mut reports,
            progress,
        )
        .await?;
        info!(
            sources = research.sources_count,
            facts = research.fact_table.len(),
            "research gathered"
        );

        // --- Stage 3: Write ---
        let writer = Writer::new(self.ranker.clone());
        let writer_input = WriterInput {
            request,
            plan,
            research: research.clone(),
        };
        let mut sections = run_stage(&writer, &ctx, writer_input, &mut reports, progress).await?;

        // --- Expansion to the word-count floor ---
        expand_to_minimum(&ctx, &mut sections, topic)
            .await
            .map_err(|e| e.in_stage(StageName::Writer))?;

        // --- Stage 4: Edit ---
        let pre_edit = sections.clone();
        let had_images = pre_edit.iter().any(|(_, body)| has_image_marker(body));
        let edited = run_stage(&Editor, &ctx, sections, &mut reports, progress).await?;
        let mut sections = restore_missing_sections(edited, &pre_edit);

        // --- Image repair ---
        // Only when the draft had markers and the edit stripped every one.
        if had_images && !sections.iter().any(|(_, body)| has_image_marker(body)) {
            if let Some(ranker) = &self.ranker {
                warn!("editing removed every image marker, re-running image insertion");
                let urls = fetchable_citation_urls(&research.citations);
                insert_images(ranker, &mut sections, topic, &urls).await;
            }
        }

        // --- Stage 5: Humanize ---
        let humanized = run_stage(&Humanizer, &ctx, sections, &mut reports, progress).await?;
        info!(rewritten = humanized.notes.len(), "voice pass complete");

        // --- Stage 6: Optimize for search ---
        let seo_input = SeoInput {
            topic: topic.to_string(),
            sections: humanized.sections,
        };
        let optimized = run_stage(&SeoOptimizer, &ctx, seo_input, &mut reports, progress).await?;

        // --- Stage 7: Fact-check ---
        let check_input = FactCheckInput {
            sections: optimized.sections,
            fact_table: research.fact_table.clone(),
            citations: research.citations.clone(),
        };
        let checked = run_stage(
            &FactChecker::new(),
            &ctx,
            check_input,
            &mut reports,
            progress,
        )
        .await?;

        // --- Assemble and write ---
        let document = assembler::assemble(AssembleInput {
            topic: topic.to_string(),
            sections: checked.sections,
            citations: research.citations,
            seo: optimized.seo,
            faq: optimized.faq,
            fact_check: checked.summary,
        });
        let markdown = assembler::render_markdown(&document, config.include_meta_tags);
        let words = document_word_count(&document);
        let files = output::write_document(&self.output_dir, topic, &document, &markdown)?;

        let outcome = GenerationOutcome {
            run_id,
            document,
            research_summary: research.summary,
            reports,
            word_count: words,
            files,
            elapsed: start.elapsed(),
        };

        progress.done(&outcome);

        info!(
            %run_id,
            words = outcome.word_count,
            score = outcome.document.fact_check.verification_score,
            elapsed_ms = outcome.elapsed.as_millis(),
            "generation pipeline complete"
        );

        Ok(outcome)
    }
}

/// Run one stage, recording its report and tagging any failure with the
/// stage name.
async fn run_stage<S: Stage>(
    stage: &S,
    ctx: &StageContext<'_>,
    input: S::Input,
    reports: &mut Vec<StageReport>,
    progress: &dyn ProgressSink,
) -> Result<S::Output> {
    progress.stage_started(S::NAME);
    info!(stage = %S::NAME, "stage started");

    let started = Instant::now();
    let result = stage.process(ctx, input).await;
    let elapsed = started.elapsed();

    let status = if result.is_ok() {
        StageStatus::Succeeded
    } else {
        StageStatus::Failed
    };
    reports.push(StageReport {
        stage: S::NAME,
        status,
        duration_ms: elapsed.as_millis() as u64,
    });
    progress.stage_finished(S::NAME, status, elapsed);

    result.map_err(|e| {
        error!(stage = %S::NAME, error = %e, "stage failed, halting the run");
        e.in_stage(S::NAME)
    })
}

/// Grow the draft to the configured minimum, one expansion call per section.
///
/// Shortest sections are expanded first since they have the most room to
/// grow. The introduction and conclusion keep their length; each body
/// section is expanded at most once per run.
async fn expand_to_minimum(
    ctx: &StageContext<'_>,
    sections: &mut SectionMap,
    topic: &str,
) -> Result<()> {
    let minimum = ctx.config.min_word_count;
    let mut total = section_word_count(sections);
    if total >= minimum {
        return Ok(());
    }
    info!(words = total, minimum, "draft under the word-count floor, expanding");

    let mut candidates: Vec<(String, usize)> = sections
        .iter()
        .filter(|(title, _)| !is_anchor_section(title) && !is_supplement(title))
        .map(|(title, body)| (title.to_string(), word_count(body)))
        .collect();
    candidates.sort_by_key(|(_, words)| *words);

    for (title, words) in candidates {
        if total >= minimum {
            break;
        }
        let Some(current) = sections.get(&title) else {
            continue;
        };
        ctx.progress
            .thought(StageName::Writer, &format!("Expanding section: {title}"));
        let expanded = expand_section(ctx, current, &title, topic, minimum - total).await?;
        let expanded_words = word_count(&expanded);
        if expanded_words > words {
            total += expanded_words - words;
            sections.insert(title, expanded);
        } else {
            warn!(section = %title, "expansion did not grow the section, keeping the original");
        }
    }

    if total < minimum {
        warn!(words = total, minimum, "draft still under the floor after expansion");
    }
    Ok(())
}

/// Merge restored pre-edit bodies back in, preserving the original order.
fn restore_missing_sections(outcome: EditOutcome, pre_edit: &SectionMap) -> SectionMap {
    let EditOutcome {
        sections,
        improvements,
        missing,
    } = outcome;
    if !improvements.is_empty() {
        debug!(?improvements, "edit passes applied");
    }
    if missing.is_empty() {
        return sections;
    }

    let mut merged = SectionMap::new();
    for (title, original) in pre_edit.iter() {
        match sections.get(title) {
            Some(edited) => merged.insert(title, edited.to_string()),
            None => {
                warn!(section = title, "section lost during editing, restoring pre-edit body");
                merged.insert(title, original.to_string());
            }
        }
    }
    merged
}

/// Sections with fixed roles that the pipeline never expands.
fn is_anchor_section(title: &str) -> bool {
    title.eq_ignore_ascii_case("introduction") || title.eq_ignore_ascii_case("conclusion")
}

/// Supplementary sections excluded from content word counts.
fn is_supplement(title: &str) -> bool {
    UNCOUNTED_SECTIONS
        .iter()
        .any(|s| s.eq_ignore_ascii_case(title))
}

fn section_word_count(sections: &SectionMap) -> usize {
    sections
        .iter()
        .filter(|(title, _)| !is_supplement(title))
        .map(|(_, body)| word_count(body))
        .sum()
}

fn document_word_count(document: &FinalDocument) -> usize {
    document
        .sections
        .iter()
        .filter(|s| !is_supplement(&s.title))
        .map(|s| word_count(&s.content))
        .sum()
}

// ---------------------------------------------------------------------------
// Stage progress adapter
// ---------------------------------------------------------------------------

/// Adapts a [`ProgressSink`] to the stages' narrower progress interface.
struct SinkThoughts<'a> {
    inner: &'a dyn ProgressSink,
}

impl StageProgress for SinkThoughts<'_> {
    fn thought(&self, stage: StageName, message: &str) {
        self.inner.thought(stage, message);
    }
}
