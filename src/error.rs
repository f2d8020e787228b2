//! Error types for the pdf-sequencer library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SequencerError`] — **Fatal**: the batch cannot proceed at all
//!   (malformed sequence, disallowed operation, missing credentials, a job
//!   submission the service refused). Returned as `Err(SequencerError)` from
//!   [`crate::executor::Sequencer::run`] and the loading functions.
//!
//! * [`FileError`] — **Non-fatal**: a single file was skipped or its
//!   pipeline stopped (upload refused, a job reported `failed`, a download
//!   broke) but the rest of the batch is fine. Stored inside
//!   [`crate::output::FileReport`] so callers can inspect partial success.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-sequencer library.
///
/// Per-file failures use [`FileError`] and are stored in
/// [`crate::output::FileReport`] rather than propagated here.
#[derive(Debug, Error)]
pub enum SequencerError {
    // ── Sequence errors ───────────────────────────────────────────────────
    /// The sequence file could not be read.
    #[error("Sequence file '{path}' cannot be read: {source}")]
    SequenceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sequence file is not valid JSON, or a step is missing its operation.
    #[error("Sequence cannot be parsed: {detail}")]
    SequenceMalformed { detail: String },

    /// The top-level JSON value is not an array.
    #[error("The sequence JSON is not an array")]
    SequenceNotArray,

    /// The array parsed but holds no steps.
    #[error("The sequence is empty; at least one operation is required")]
    SequenceEmpty,

    /// A step names an operation on the unsupported list.
    #[error("An unsupported operation '{operation}' is being used in this sequence")]
    UnsupportedOperation { operation: String },

    /// A step combines an operation with a parameter that is not allowed.
    #[error("An unsupported parameter '{parameter}' is being used in the operation '{operation}'")]
    UnsupportedParameter { operation: String, parameter: String },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// A required credential variable is absent from the environment.
    #[error("Environment variable {var} is not set.\nSet CLIENT_ID and CLIENT_SECRET (a .env file works too).")]
    MissingCredentials { var: &'static str },

    /// The OAuth2 token endpoint did not return an access token.
    #[error("Access token request failed: {reason}")]
    TokenRequestFailed { reason: String },

    /// The input directory does not exist.
    #[error("Input folder '{path}' does not exist")]
    InputDirMissing { path: PathBuf },

    /// The input tree could not be walked.
    #[error("Cannot read input '{path}': {detail}")]
    InputUnreadable { path: PathBuf, detail: String },

    /// A configuration file exists but could not be read or parsed.
    #[error("Configuration file '{path}' is invalid: {detail}")]
    ConfigLoad { path: PathBuf, detail: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Remote errors ─────────────────────────────────────────────────────
    /// The service answered a job submission with something other than 201.
    #[error("Job submission for '{operation}' was rejected (HTTP {status}): {body}")]
    JobRejected {
        operation: String,
        status: u16,
        body: String,
    },

    /// The job submission request never got an answer.
    #[error("Job submission for '{operation}' failed: {reason}")]
    JobSubmissionFailed { operation: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write inside the output tree.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single input file.
///
/// Stored in [`crate::output::FileStatus`] when a file is skipped or its
/// pipeline stops early. The batch continues with the next file.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum FileError {
    /// The service did not provision an upload target or refused the bytes.
    #[error("upload refused: {reason}")]
    UploadRefused { reason: String },

    /// The sequence creates a PDF but the source already is one.
    #[error("file is already a PDF")]
    AlreadyPdf,

    /// The extension is not in the supported input formats.
    #[error("unsupported input format '{extension}'")]
    UnsupportedFormat { extension: String },

    /// A declared font would be substituted by the service.
    #[error("font '{font}' is not embedded and may be substituted")]
    FontSubstitution { font: String },

    /// A job finished with status `failed`.
    #[error("step {step} ({operation}) failed: {error}")]
    StepFailed {
        step: usize,
        operation: String,
        error: serde_json::Value,
    },

    /// A chaining step finished without a new asset to feed forward.
    #[error("step {step} ({operation}) returned no asset")]
    MissingAsset { step: usize, operation: String },

    /// The job did not reach a terminal status within the poll policy's limit.
    #[error("step {step} ({operation}) still running after {waited_secs}s")]
    PollTimeout {
        step: usize,
        operation: String,
        waited_secs: u64,
    },

    /// A network or protocol failure while talking to the service.
    #[error("transport error: {detail}")]
    Transport { detail: String },

    /// An output artifact could not be downloaded or written.
    #[error("could not save '{path}': {detail}")]
    SaveFailed { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_operation_display() {
        let e = SequencerError::UnsupportedOperation {
            operation: "combinepdf".into(),
        };
        assert!(e.to_string().contains("'combinepdf'"));
    }

    #[test]
    fn job_rejected_display() {
        let e = SequencerError::JobRejected {
            operation: "ocrpdf".into(),
            status: 400,
            body: "{\"code\":\"BAD_INPUT\"}".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("ocrpdf"), "got: {msg}");
        assert!(msg.contains("HTTP 400"), "got: {msg}");
    }

    #[test]
    fn step_failed_display_carries_payload() {
        let e = FileError::StepFailed {
            step: 2,
            operation: "protectpdf".into(),
            error: serde_json::json!({"code": "BAD_PDF"}),
        };
        let msg = e.to_string();
        assert!(msg.contains("step 2"));
        assert!(msg.contains("BAD_PDF"));
    }

    #[test]
    fn file_error_serialises() {
        let e = FileError::PollTimeout {
            step: 1,
            operation: "ocrpdf".into(),
            waited_secs: 30,
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: FileError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
