//! # ledgerbox-core
//!
//! Core types, traits, and abstractions for the ledgerbox attachment
//! pipeline.
//!
//! This crate provides the foundational data structures and trait
//! definitions that the storage, database, and pipeline crates depend on.

pub mod classify;
pub mod defaults;
pub mod error;
pub mod file_safety;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use classify::{
    classify, extraction_threshold, extractor_route, is_document_mime, reclassify,
    should_extract, Classification, ReclassifyContext,
};
pub use error::{Error, Result};
pub use file_safety::{detect_content_type, file_extension, sanitize_filename};
pub use models::*;
pub use traits::JobRepository;
