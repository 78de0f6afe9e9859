//! # ledgerbox-pipeline
//!
//! Attachment processing orchestrator and background job worker.
//!
//! This crate provides:
//! - [`AttachmentPipeline`] — the stateful coordinator driving each
//!   attachment through download → store → scan → classify → route
//! - A rate-limited, concurrent [`JobWorker`] over the database job queue
//! - The [`ProviderFetch`] and [`VirusScanner`] collaborator seams
//!
//! ## Example
//!
//! ```ignore
//! use ledgerbox_pipeline::{
//!     AttachmentHandler, AttachmentPipeline, NoopScanner, WorkerBuilder, WorkerConfig,
//! };
//!
//! let pipeline = Arc::new(AttachmentPipeline::new(db.clone(), store, provider, scanner));
//! let worker = WorkerBuilder::new(db)
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(AttachmentHandler::new(pipeline))
//!     .build()
//!     .await;
//! let handle = worker.start();
//! ```

pub mod attachment_handler;
pub mod handler;
pub mod pipeline;
pub mod provider;
pub mod scan;
pub mod worker;

// Re-export core types
pub use ledgerbox_core::*;

pub use attachment_handler::AttachmentHandler;
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use pipeline::AttachmentPipeline;
pub use provider::{FetchRequest, ProviderFetch, SpoolDirProvider};
pub use scan::{NoopScanner, ScanOutcome, VirusScanner};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
