//! Image selection for drafted sections.
//!
//! Given a section and the citations backing it, this crate decides whether
//! the section needs an image, harvests candidates from the cited pages,
//! ranks them in two tiers (keyword overlap, then a semantic model call), and
//! falls back to a public media search or a textual image-need marker when no
//! candidate is relevant enough.

pub mod fetch;
pub mod media;
pub mod ranker;

pub use fetch::{ImageCandidate, PageFetcher};
pub use media::MediaSearch;
pub use ranker::{RankerPolicy, RelevanceRanker, needs_image};
