//! Core pipeline orchestration and domain logic for Draftforge.
//!
//! This crate ties the seven generation stages together into the end-to-end
//! article workflow: configuration resolution, stage sequencing, document
//! assembly, and output writing.

pub mod assembler;
pub mod output;
pub mod pipeline;
