//! Generation backend abstraction for Draftforge.
//!
//! Every stage talks to the text-generation backend through the
//! [`ChatBackend`] trait; [`OpenAiBackend`] is the production
//! implementation speaking the OpenAI-compatible chat completions API.
//! All failure classification lives here — stages and the orchestrator
//! only ever see [`BackendError`] kinds, never raw transport errors.

pub mod client;
pub mod error;
pub mod types;

pub use client::{BackendOptions, OpenAiBackend, RetryPolicy};
pub use error::{BackendError, Result};
pub use types::{CompletionRequest, Message, Usage};

use async_trait::async_trait;

/// The sole "compute" dependency of the pipeline.
///
/// Implementations must apply their own per-call timeout and transient
/// retry policy; callers treat one `complete` call as a finished attempt.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a completion request and return the assistant's text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}
