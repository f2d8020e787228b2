//! # pdf-sequencer
//!
//! Chain remote document-conversion operations over a folder of files.
//!
//! A *sequence* is a JSON array of steps such as
//! `[{"operation": "createpdf"}, {"operation": "ocrpdf"}]`. Every file under
//! the input root is uploaded once, each step runs as a remote job on the
//! asset produced by the step before it, and the final result lands under
//! the output root at the same relative path, named after the input and the
//! operation that produced it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input folder
//!  │
//!  ├─ 1. Discover  walk the tree, skip dotfiles, sort
//!  ├─ 2. Admit     PDF-to-PDF guard, supported formats, font precheck
//!  ├─ 3. Upload    provision an asset, PUT the bytes
//!  ├─ 4. Steps     submit job → poll with backoff → classify response
//!  │               (chaining steps feed their asset to the next step)
//!  └─ 5. Save      download artifacts / write properties JSON, move source
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_sequencer::{Credentials, RunConfig, RunOptions, Sequence, Sequencer, ServiceClient};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sequence = Sequence::parse(r#"[{"operation":"createpdf"},{"operation":"ocrpdf"}]"#)?;
//!     let config = RunConfig::default();
//!     let client = ServiceClient::connect(&config, &Credentials::from_env()?).await?;
//!
//!     let sequencer = Sequencer::new(Arc::new(client), config, RunOptions::default());
//!     let output = sequencer
//!         .run(Path::new("input"), Path::new("output"), &sequence)
//!         .await?;
//!     eprintln!(
//!         "{} completed, {} skipped, {} failed",
//!         output.stats.completed_files, output.stats.skipped_files, output.stats.failed_files
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf-sequencer` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-sequencer = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod fonts;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod sequence;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{AccessToken, DocumentService, ServiceClient};
pub use config::{Credentials, PollPolicy, RunConfig, RunConfigBuilder, RunOptions, RunSettings};
pub use error::{FileError, SequencerError};
pub use executor::Sequencer;
pub use fonts::ServerFonts;
pub use output::{
    AssetHandle, AssetRef, BatchOutput, BatchStats, FileReport, FileStatus, JobHandle, JobResponse,
    JobStatus, OutputArtifact, StepTiming, UploadTarget,
};
pub use pipeline::input::{Admission, SupportedFormats};
pub use pipeline::save::OutputLayout;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use sequence::{OperationStep, Sequence};
