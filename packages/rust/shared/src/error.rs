//! Error types for Draftforge.
//!
//! Library crates use [`DraftforgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Backend-call failures have their own closed kind enum in
//! `draftforge-backend`; they convert into [`DraftforgeError`] once the
//! retry loop has given up, so the taxonomy here is what the pipeline and
//! its callers dispatch on.

use std::path::PathBuf;

use crate::types::StageName;

/// Top-level error type for all Draftforge operations.
#[derive(Debug, thiserror::Error)]
pub enum DraftforgeError {
    /// Configuration loading or validation error. Always pre-flight: raised
    /// before any generation call is made.
    #[error("config error: {message}")]
    Config { message: String },

    /// Bad or missing API credentials. Never retried.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Rate limit or quota exhaustion. Never retried; distinct so callers
    /// can back off and resume later.
    #[error("quota error: {0}")]
    Quota(String),

    /// Generation backend failure after the in-stage retry loop gave up.
    #[error("backend error: {0}")]
    Backend(String),

    /// Network/HTTP error outside the generation backend (page fetches,
    /// search APIs).
    #[error("network error: {0}")]
    Network(String),

    /// Structured-text parsing error (JSON plans, API payloads).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A stage produced empty or too-short output and the bounded local
    /// retry also degenerated.
    #[error("degenerate output: {message}")]
    Degenerate { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A pipeline stage failed; wraps the underlying cause with the stage
    /// name so callers always learn which step halted the run.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageName,
        source: Box<DraftforgeError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DraftforgeError>;

impl DraftforgeError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a degenerate-output error from any displayable message.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::Degenerate {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Tag an error with the stage it occurred in. Idempotent: an error
    /// already carrying a stage tag keeps the original tag.
    pub fn in_stage(self, stage: StageName) -> Self {
        match self {
            Self::Stage { .. } => self,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The stage this error is tagged with, if any.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
