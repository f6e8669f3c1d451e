//! Shared types, error model, and configuration for Draftforge.
//!
//! This crate is the foundation depended on by all other Draftforge crates.
//! It provides:
//! - [`DraftforgeError`] — the unified error type
//! - Domain types ([`OutlinePlan`], [`Citation`], [`FinalDocument`], [`SectionMap`])
//! - Configuration ([`AppConfig`], [`GenerationConfig`], precedence resolution)
//! - Markdown text utilities (word counting, image markers, JSON extraction)

pub mod config;
pub mod error;
pub mod markdown;
pub mod sections;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, DefaultsConfig, GenerationConfig, RequestOverrides, SearchConfig,
    SystemSettings, config_dir, config_file_path, default_db_path, init_config, load_config,
    load_config_from, resolve_config, validate_api_key,
};
pub use error::{DraftforgeError, Result};
pub use markdown::{
    clean_for_word_count, extract_images, extract_json_block, has_image_marker,
    remove_duplicate_headers, sanitize_topic, slug, word_count,
};
pub use sections::{FlatSections, SectionBoundary, SectionMap};
pub use types::{
    Citation, DocumentSection, FactCheckSummary, FactEntry, FactKind, FactTable, FinalDocument,
    FlaggedClaim, GenerationRequest, ImageRef, InternalLink, OutlinePlan, OutlineSection,
    RequiredFact, ResearchBundle, RunId, SectionGoals, SeoMetadata, SourceRef, StageName,
    StageReport, StageStatus, Tone,
};
