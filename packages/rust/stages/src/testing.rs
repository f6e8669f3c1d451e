//! Test doubles shared by the stage test modules.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use draftforge_backend::{BackendError, ChatBackend, CompletionRequest};
use draftforge_research::{SearchHit, SearchProvider};
use draftforge_shared::{AppConfig, DraftforgeError, GenerationConfig};

use crate::{SilentStageProgress, StageContext};

pub(crate) static SILENT: SilentStageProgress = SilentStageProgress;

/// Config with the compiled-in defaults, handy as a baseline to tweak.
pub(crate) fn test_config() -> GenerationConfig {
    GenerationConfig::from(&AppConfig::default())
}

pub(crate) fn ctx<'a>(
    backend: &'a dyn ChatBackend,
    config: &'a GenerationConfig,
) -> StageContext<'a> {
    StageContext::new(backend, config, &SILENT)
}

// ---------------------------------------------------------------------------
// Chat backend doubles
// ---------------------------------------------------------------------------

/// Pops scripted replies in order and records every prompt it was sent.
///
/// Panics when called more times than scripted, so a test that over-calls
/// the backend fails loudly instead of looping on a default reply.
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, BackendError>>>,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new(replies: Vec<Result<String, BackendError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub(crate) fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(&self, request: &CompletionRequest) -> draftforge_backend::Result<String> {
        let prompt = request
            .messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("backend called more times than scripted"))
    }
}

/// Always returns the same reply.
pub(crate) struct FixedBackend(pub(crate) String);

#[async_trait]
impl ChatBackend for FixedBackend {
    async fn complete(&self, _request: &CompletionRequest) -> draftforge_backend::Result<String> {
        Ok(self.0.clone())
    }
}

/// Always fails with a connection error.
pub(crate) struct FailingBackend;

#[async_trait]
impl ChatBackend for FailingBackend {
    async fn complete(&self, _request: &CompletionRequest) -> draftforge_backend::Result<String> {
        Err(BackendError::Connection("connection reset by peer".into()))
    }
}

// ---------------------------------------------------------------------------
// Search provider doubles
// ---------------------------------------------------------------------------

pub(crate) fn hit(title: &str, url: &str, snippet: &str, relevance: f64) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        url: url.to_string(),
        snippet: snippet.to_string(),
        relevance,
    }
}

/// Pops one scripted hit batch per query and records `(query, count)` pairs.
pub(crate) struct ScriptedSearch {
    batches: Mutex<VecDeque<Result<Vec<SearchHit>, DraftforgeError>>>,
    pub(crate) queries: Mutex<Vec<(String, usize)>>,
}

impl ScriptedSearch {
    pub(crate) fn new(batches: Vec<Result<Vec<SearchHit>, DraftforgeError>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearch {
    async fn search(&self, query: &str, count: usize) -> draftforge_shared::Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push((query.to_string(), count));
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("search called more times than scripted"))
    }
}
