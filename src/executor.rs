//! Pipeline executor and batch driver.
//!
//! [`Sequencer::process_file`] runs one file through the whole sequence:
//!
//! ```text
//! upload ─▶ ┌ step 1: submit ─▶ poll ─▶ classify ┐ ─▶ … ─▶ final save ─▶ move?
//!           └── live asset handle ◀──────────────┘
//! ```
//!
//! Every step consumes the current live handle. A chaining step replaces the
//! handle with the asset it produced; a terminal-shape step (extraction,
//! properties, page images) is saved on the spot and leaves the handle alone.
//! The last response is saved once at the end unless it was already saved.
//!
//! [`Sequencer::run`] applies that to every admitted file under the input
//! root, one file at a time.

use crate::client::DocumentService;
use crate::config::{RunConfig, RunOptions};
use crate::error::{FileError, SequencerError};
use crate::output::{
    AssetHandle, BatchOutput, BatchStats, FileReport, FileStatus, JobResponse, JobResult,
    StepTiming,
};
use crate::pipeline::input::{self, Admission};
use crate::pipeline::poll::{self, PollError};
use crate::pipeline::request::build_request_body;
use crate::pipeline::save::{self, OutputLayout};
use crate::sequence::Sequence;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drives sequences against a [`DocumentService`].
pub struct Sequencer {
    service: Arc<dyn DocumentService>,
    config: RunConfig,
    options: RunOptions,
    admission: Admission,
}

impl Sequencer {
    /// A sequencer that only refuses the PDF-to-PDF case at admission.
    pub fn new(service: Arc<dyn DocumentService>, config: RunConfig, options: RunOptions) -> Self {
        Self {
            service,
            config,
            options,
            admission: Admission::permissive(),
        }
    }

    /// Replace the admission gate. The font precheck only stays on when the
    /// config asks to prevent font substitution.
    pub fn with_admission(mut self, admission: Admission) -> Self {
        self.admission = if self.config.prevent_font_substitution {
            admission
        } else {
            admission.without_font_check()
        };
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run `sequence` over every file under `input_root`.
    ///
    /// # Errors
    /// Only fatal conditions end the run early: a missing input directory,
    /// an output directory that cannot be created, or a job submission the
    /// service refused. Per-file problems are recorded in the reports.
    pub async fn run(
        &self,
        input_root: &Path,
        output_root: &Path,
        sequence: &Sequence,
    ) -> Result<BatchOutput, SequencerError> {
        let batch_start = Instant::now();
        info!("Sequence: {}", sequence.describe());

        let files = input::discover_files(input_root)?;
        tokio::fs::create_dir_all(output_root)
            .await
            .map_err(|e| SequencerError::OutputWriteFailed {
                path: output_root.to_path_buf(),
                source: e,
            })?;
        let layout = OutputLayout::new(input_root, output_root);
        debug!(
            "Font precheck {}",
            if self.admission.checks_fonts() { "on" } else { "off" }
        );

        // ── Admission ────────────────────────────────────────────────────
        let mut slots: Vec<Option<FileReport>> = Vec::with_capacity(files.len());
        let mut admitted = Vec::new();
        for (slot, file) in files.iter().enumerate() {
            match self.admission.check(file, sequence).await {
                Ok(()) => {
                    admitted.push((slot, file));
                    slots.push(None);
                }
                Err(reason) => {
                    info!("Skipping {}: {}", file.display(), reason);
                    if let Some(ref cb) = self.config.progress_callback {
                        cb.on_file_skipped(file, &reason.to_string());
                    }
                    slots.push(Some(FileReport::skipped(file.clone(), reason)));
                }
            }
        }
        info!("{} of {} files admitted", admitted.len(), files.len());

        // ── Processing ───────────────────────────────────────────────────
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(admitted.len());
        }
        let total = admitted.len();
        let mut completed = 0;
        for (i, (slot, file)) in admitted.into_iter().enumerate() {
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_file_start(file, i + 1, total);
            }
            let report = self.process_file(&layout, file, sequence).await?;
            if report.is_completed() {
                completed += 1;
            }
            slots[slot] = Some(report);
        }
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, completed);
        }

        let reports: Vec<FileReport> = slots.into_iter().flatten().collect();
        let stats = batch_stats(&reports, batch_start.elapsed().as_millis() as u64);
        info!(
            "Batch done: {} completed, {} skipped, {} failed, {} outputs in {}ms",
            stats.completed_files,
            stats.skipped_files,
            stats.failed_files,
            stats.outputs_written,
            stats.total_duration_ms
        );
        Ok(BatchOutput {
            files: reports,
            stats,
        })
    }

    /// Run every step of `sequence` for one already-admitted file.
    ///
    /// Returns `Ok` with a skipped or failed report for per-file problems;
    /// `Err` only when a job submission was refused.
    pub async fn process_file(
        &self,
        layout: &OutputLayout,
        input: &Path,
        sequence: &Sequence,
    ) -> Result<FileReport, SequencerError> {
        let start = Instant::now();
        info!("Processing {}", input.display());

        // ── Upload ───────────────────────────────────────────────────────
        let mut live = match self.upload(input).await {
            Ok(asset) => asset,
            Err(reason) => {
                warn!("Skipping {}: {}", input.display(), reason);
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_file_skipped(input, &reason.to_string());
                }
                return Ok(FileReport::skipped(input.to_path_buf(), reason));
            }
        };

        let mut run = FileRun::new(input);
        let mut last: Option<JobResponse> = None;
        let mut last_saved = false;

        // ── Steps ────────────────────────────────────────────────────────
        for (i, step) in sequence.steps().iter().enumerate() {
            let index = i + 1;
            let step_start = Instant::now();

            let body = build_request_body(&live, step, &self.options);
            debug!(
                "{}: submitting {} ({}/{})",
                input.display(),
                step.operation,
                index,
                sequence.len()
            );
            let job = self.service.submit_job(&step.operation, &body).await?;

            let polled =
                poll::await_completion(self.service.as_ref(), &job, &self.config.poll).await;
            let payload = match polled {
                Ok(JobResult::Done(payload)) => payload,
                Ok(JobResult::Failed(error)) => {
                    return Ok(self.failed(run, start, FileError::StepFailed {
                        step: index,
                        operation: step.operation.clone(),
                        error,
                    }));
                }
                Err(PollError::TimedOut(waited)) => {
                    return Ok(self.failed(run, start, FileError::PollTimeout {
                        step: index,
                        operation: step.operation.clone(),
                        waited_secs: waited.as_secs(),
                    }));
                }
                Err(PollError::Service(e)) => return Ok(self.failed(run, start, e)),
            };

            let response = JobResponse::from_payload(&step.operation, step.is_properties(), &payload);
            let duration_ms = step_start.elapsed().as_millis() as u64;
            info!(
                "{}: {} done in {}ms ({}ms so far)",
                input.display(),
                step.operation,
                duration_ms,
                start.elapsed().as_millis()
            );
            run.steps.push(StepTiming {
                index,
                operation: step.operation.clone(),
                duration_ms,
            });
            if let Some(ref cb) = self.config.progress_callback {
                cb.on_step_complete(input, index, &step.operation, duration_ms);
            }

            if step.is_terminal_shape() {
                match save::save_output(self.service.as_ref(), layout, input, &response).await {
                    Ok(paths) => run.outputs.extend(paths),
                    Err(e) => return Ok(self.failed(run, start, e)),
                }
                last_saved = true;
            } else {
                match &response.next_asset {
                    Some(next) => live = next.clone(),
                    None => {
                        return Ok(self.failed(run, start, FileError::MissingAsset {
                            step: index,
                            operation: step.operation.clone(),
                        }));
                    }
                }
                last_saved = false;
            }
            last = Some(response);
        }

        // ── Final save ───────────────────────────────────────────────────
        if let (Some(response), false) = (&last, last_saved) {
            match save::save_output(self.service.as_ref(), layout, input, response).await {
                Ok(paths) => run.outputs.extend(paths),
                Err(e) => return Ok(self.failed(run, start, e)),
            }
        }

        if self.options.move_processed() {
            match save::move_processed(layout, input).await {
                Ok(dest) => run.moved_to = Some(dest),
                Err(e) => warn!("Could not move {}: {}", input.display(), e),
            }
        }

        let total_ms = start.elapsed().as_millis() as u64;
        info!(
            "{}: {} steps, {} outputs in {}ms",
            input.display(),
            run.steps.len(),
            run.outputs.len(),
            total_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_complete(input, run.outputs.len(), total_ms);
        }
        Ok(run.finish(FileStatus::Completed, total_ms))
    }

    async fn upload(&self, input: &Path) -> Result<AssetHandle, FileError> {
        let media_type = input::media_type_of(input);
        let target = self.service.request_upload_target(&media_type).await?;
        self.service.upload_file(&target, input, &media_type).await?;
        debug!("{}: uploaded as {}", input.display(), target.asset);
        Ok(target.asset)
    }

    fn failed(&self, run: FileRun, start: Instant, error: FileError) -> FileReport {
        warn!("{}: {}", run.input.display(), error);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_file_error(&run.input, &error.to_string());
        }
        run.finish(FileStatus::Failed(error), start.elapsed().as_millis() as u64)
    }
}

/// Accumulates what one file has produced so far.
struct FileRun {
    input: PathBuf,
    outputs: Vec<PathBuf>,
    steps: Vec<StepTiming>,
    moved_to: Option<PathBuf>,
}

impl FileRun {
    fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            outputs: Vec::new(),
            steps: Vec::new(),
            moved_to: None,
        }
    }

    fn finish(self, status: FileStatus, total_duration_ms: u64) -> FileReport {
        FileReport {
            input: self.input,
            status,
            outputs: self.outputs,
            steps: self.steps,
            total_duration_ms,
            moved_to: self.moved_to,
        }
    }
}

fn batch_stats(reports: &[FileReport], total_duration_ms: u64) -> BatchStats {
    let mut stats = BatchStats {
        discovered_files: reports.len(),
        total_duration_ms,
        ..Default::default()
    };
    for report in reports {
        match report.status {
            FileStatus::Completed => stats.completed_files += 1,
            FileStatus::Skipped(_) => stats.skipped_files += 1,
            FileStatus::Failed(_) => stats.failed_files += 1,
        }
        stats.outputs_written += report.outputs.len();
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(status: FileStatus, outputs: usize) -> FileReport {
        FileReport {
            input: PathBuf::from("in/a.pdf"),
            status,
            outputs: (0..outputs).map(|i| PathBuf::from(format!("out/{i}"))).collect(),
            steps: Vec::new(),
            total_duration_ms: 0,
            moved_to: None,
        }
    }

    #[test]
    fn stats_count_each_status() {
        let reports = vec![
            report(FileStatus::Completed, 3),
            report(FileStatus::Skipped(FileError::AlreadyPdf), 0),
            report(
                FileStatus::Failed(FileError::Transport {
                    detail: "reset".into(),
                }),
                1,
            ),
        ];
        let stats = batch_stats(&reports, 42);
        assert_eq!(stats.discovered_files, 3);
        assert_eq!(stats.completed_files, 1);
        assert_eq!(stats.skipped_files, 1);
        assert_eq!(stats.failed_files, 1);
        assert_eq!(stats.outputs_written, 4);
        assert_eq!(stats.total_duration_ms, 42);
    }

    #[test]
    fn file_run_finish_keeps_partial_outputs() {
        let mut run = FileRun::new(Path::new("in/a.pdf"));
        run.outputs.push(PathBuf::from("out/a_extractpdf.zip"));
        let r = run.finish(FileStatus::Failed(FileError::AlreadyPdf), 7);
        assert_eq!(r.outputs.len(), 1);
        assert_eq!(r.total_duration_ms, 7);
    }
}
