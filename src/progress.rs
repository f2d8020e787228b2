//! Progress-callback trait for batch, file and step events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::RunConfigBuilder::progress_callback`] to receive events
//! as the sequencer works through the input tree.
//!
//! # Example
//!
//! ```rust
//! use pdf_sequencer::{BatchProgressCallback, RunConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     steps: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_step_complete(&self, file: &Path, _index: usize, operation: &str, duration_ms: u64) {
//!         self.steps.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}: {} in {}ms", file.display(), operation, duration_ms);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { steps: AtomicUsize::new(0) });
//!
//! let config = RunConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the sequencer as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are processed one at a time, so calls never
/// overlap, but implementations must still be `Send + Sync` to live inside
/// [`crate::config::RunConfig`].
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after discovery and admission.
    ///
    /// # Arguments
    /// * `total_files` — number of files that will enter the pipeline
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is uploaded.
    fn on_file_start(&self, file: &Path, index: usize, total_files: usize) {
        let _ = (file, index, total_files);
    }

    /// Called after each successful step.
    ///
    /// # Arguments
    /// * `index`       — 1-indexed step position
    /// * `operation`   — operation name
    /// * `duration_ms` — submit + poll time for this step
    fn on_step_complete(&self, file: &Path, index: usize, operation: &str, duration_ms: u64) {
        let _ = (file, index, operation, duration_ms);
    }

    /// Called when a file finished every step and its outputs are written.
    fn on_file_complete(&self, file: &Path, outputs: usize, duration_ms: u64) {
        let _ = (file, outputs, duration_ms);
    }

    /// Called when a file never entered the step loop.
    fn on_file_skipped(&self, file: &Path, reason: &str) {
        let _ = (file, reason);
    }

    /// Called when a file's pipeline stopped partway.
    fn on_file_error(&self, file: &Path, error: &str) {
        let _ = (file, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, completed: usize) {
        let _ = (total_files, completed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RunConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
