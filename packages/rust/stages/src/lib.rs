//! The seven pipeline stages that turn a topic into a publishable draft.
//!
//! Each stage is a struct implementing [`Stage`]: it consumes a typed input,
//! talks to the chat backend through a shared [`StageContext`], and produces a
//! typed output for the next stage. Stages never retry themselves and never
//! swallow backend failures; transient faults are retried inside the backend
//! client, and whatever error survives is propagated upward tagged with the
//! stage name by the pipeline.
//!
//! Stage order: plan, research, write, edit, humanize, optimize for search,
//! fact-check.

use async_trait::async_trait;
use draftforge_backend::{ChatBackend, CompletionRequest, Message};
use draftforge_shared::{GenerationConfig, Result, StageName};

pub mod editor;
pub mod fact_check;
pub mod humanizer;
pub mod planner;
pub mod research;
pub mod seo;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use editor::{EditOutcome, Editor};
pub use fact_check::{FactCheckInput, FactCheckOutcome, FactCheckPolicy, FactChecker};
pub use humanizer::{HumanizeOutcome, Humanizer};
pub use planner::Planner;
pub use research::{Research, ResearchInput};
pub use seo::{SeoInput, SeoOptimizer, SeoOutcome};
pub use writer::{Writer, WriterInput, expand_section, fetchable_citation_urls, insert_images};

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Receives free-form status lines streamed from inside a stage.
///
/// Implementations must be cheap; stages call this from hot paths.
pub trait StageProgress: Send + Sync {
    fn thought(&self, stage: StageName, message: &str);
}

/// Discards all progress events.
pub struct SilentStageProgress;

impl StageProgress for SilentStageProgress {
    fn thought(&self, _stage: StageName, _message: &str) {}
}

// ---------------------------------------------------------------------------
// Stage contract
// ---------------------------------------------------------------------------

/// Everything a stage needs from the outside world for one run.
///
/// Borrowed by the pipeline for the duration of a single stage invocation so
/// stages stay stateless between runs.
pub struct StageContext<'a> {
    pub backend: &'a dyn ChatBackend,
    pub config: &'a GenerationConfig,
    pub progress: &'a dyn StageProgress,
}

impl<'a> StageContext<'a> {
    pub fn new(
        backend: &'a dyn ChatBackend,
        config: &'a GenerationConfig,
        progress: &'a dyn StageProgress,
    ) -> Self {
        Self {
            backend,
            config,
            progress,
        }
    }

    /// One completion call with the run's model and temperature.
    pub async fn complete(&self, prompt: impl Into<String>) -> Result<String> {
        let request = CompletionRequest::new(&self.config.model, self.config.temperature)
            .message(Message::user(prompt));
        self.backend.complete(&request).await.map_err(Into::into)
    }

    /// Completion call with an explicit system message ahead of the prompt.
    pub async fn complete_with_system(
        &self,
        system: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<String> {
        let request = CompletionRequest::new(&self.config.model, self.config.temperature)
            .message(Message::system(system))
            .message(Message::user(prompt));
        self.backend.complete(&request).await.map_err(Into::into)
    }
}

/// A single step of the generation pipeline.
///
/// `process` takes the previous stage's output and returns this stage's
/// contribution. Implementations surface every error through `Result`; the
/// pipeline wraps whatever comes back in a stage-tagged error, so stages
/// themselves never mention their own name in error messages.
#[async_trait]
pub trait Stage {
    type Input: Send;
    type Output: Send;

    const NAME: StageName;

    async fn process(&self, ctx: &StageContext<'_>, input: Self::Input) -> Result<Self::Output>;
}
