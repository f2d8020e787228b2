//! Wire-level result types and per-file/batch reports.
//!
//! The service answers every job with loosely-shaped JSON. This module turns
//! that JSON into explicit variants exactly once, at the boundary:
//! [`JobStatus`] for a status query, [`JobResponse`] with its
//! [`OutputArtifact`]s for a finished job. Everything downstream dispatches
//! on those tags instead of probing object shapes.

use crate::error::FileError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Media type the service uses for bundled multi-file outputs.
pub const ARCHIVE_MEDIA_TYPE: &str = "application/zip";

/// Opaque identifier of a remote asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetHandle(pub String);

impl fmt::Display for AssetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of a submitted job, as returned in the `location` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where to PUT the bytes of a new asset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadTarget {
    #[serde(rename = "assetID")]
    pub asset: AssetHandle,
    #[serde(rename = "uploadUri")]
    pub upload_uri: String,
}

/// One status answer for a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Any non-terminal status; the poll loop waits and asks again.
    InProgress,
    /// The job finished; the payload holds everything but `status`.
    Done(Map<String, Value>),
    /// The job failed; carries the service's `error` object.
    Failed(Value),
}

impl JobStatus {
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut obj) = value else {
            return JobStatus::InProgress;
        };
        match obj.get("status").and_then(Value::as_str) {
            Some("done") => {
                obj.remove("status");
                JobStatus::Done(obj)
            }
            Some("failed") => JobStatus::Failed(obj.remove("error").unwrap_or(Value::Null)),
            _ => JobStatus::InProgress,
        }
    }
}

/// Terminal outcome of a job, as returned by the poll loop.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    Done(Map<String, Value>),
    Failed(Value),
}

/// A downloadable asset reference inside a finished job's payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetRef {
    pub asset: Option<AssetHandle>,
    pub media_type: String,
    pub download_uri: String,
}

impl AssetRef {
    /// Read `{ assetID?, metadata: { type }, downloadUri }`. Anything without
    /// both a media type and a download location is not downloadable.
    pub fn from_value(value: &Value) -> Option<Self> {
        let media_type = value.get("metadata")?.get("type")?.as_str()?;
        let download_uri = value.get("downloadUri")?.as_str()?;
        let asset = value
            .get("assetID")
            .and_then(Value::as_str)
            .map(|id| AssetHandle(id.to_string()));
        Some(Self {
            asset,
            media_type: media_type.to_string(),
            download_uri: download_uri.to_string(),
        })
    }

    pub fn is_archive(&self) -> bool {
        self.media_type == ARCHIVE_MEDIA_TYPE
    }
}

/// One savable shape found in a finished job's payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum OutputArtifact {
    /// A single asset object.
    Single(AssetRef),
    /// A one-element list whose only entry is an archive.
    Archive(AssetRef),
    /// Several assets, each with its 1-based position in the raw list. The
    /// position becomes the sequence suffix, so unusable entries leave gaps.
    AssetList(Vec<(usize, AssetRef)>),
    /// Inline metadata; written as JSON, nothing to download.
    Properties(Value),
}

/// A finished job, classified once.
#[derive(Debug, Clone, PartialEq)]
pub struct JobResponse {
    /// Operation that produced this response.
    pub operation: String,
    /// `asset.assetID`, when the job yields a handle for the next step.
    pub next_asset: Option<AssetHandle>,
    pub artifacts: Vec<OutputArtifact>,
}

impl JobResponse {
    /// Classify a `done` payload. `properties` selects the metadata-only shape.
    pub fn from_payload(operation: &str, properties: bool, payload: &Map<String, Value>) -> Self {
        if properties {
            let artifacts = payload
                .get("metadata")
                .map(|m| vec![OutputArtifact::Properties(m.clone())])
                .unwrap_or_default();
            return Self {
                operation: operation.to_string(),
                next_asset: None,
                artifacts,
            };
        }

        let next_asset = payload
            .get("asset")
            .and_then(|a| a.get("assetID"))
            .and_then(Value::as_str)
            .map(|id| AssetHandle(id.to_string()));

        let artifacts = payload
            .iter()
            .filter(|(key, _)| key.as_str() != "status")
            .filter_map(|(_, value)| match value {
                Value::Array(items) => {
                    let assets: Vec<(usize, AssetRef)> = items
                        .iter()
                        .enumerate()
                        .filter_map(|(i, item)| AssetRef::from_value(item).map(|a| (i + 1, a)))
                        .collect();
                    match assets.as_slice() {
                        [] => None,
                        [(_, only)] if items.len() == 1 && only.is_archive() => {
                            Some(OutputArtifact::Archive(only.clone()))
                        }
                        _ => Some(OutputArtifact::AssetList(assets)),
                    }
                }
                Value::Object(_) => AssetRef::from_value(value).map(OutputArtifact::Single),
                _ => None,
            })
            .collect();

        Self {
            operation: operation.to_string(),
            next_asset,
            artifacts,
        }
    }
}

// ── Reports ──────────────────────────────────────────────────────────────

/// Wall-clock time spent on one step of one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    /// 1-indexed position in the sequence.
    pub index: usize,
    pub operation: String,
    pub duration_ms: u64,
}

/// How a file's pipeline ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileStatus {
    Completed,
    /// Never entered the step loop.
    Skipped(FileError),
    /// Stopped partway through the sequence.
    Failed(FileError),
}

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub status: FileStatus,
    /// Every file written for this input, in write order.
    pub outputs: Vec<PathBuf>,
    pub steps: Vec<StepTiming>,
    pub total_duration_ms: u64,
    /// Where the source was moved to, when `moveProcessed` was requested.
    pub moved_to: Option<PathBuf>,
}

impl FileReport {
    pub fn skipped(input: PathBuf, reason: FileError) -> Self {
        Self {
            input,
            status: FileStatus::Skipped(reason),
            outputs: Vec::new(),
            steps: Vec::new(),
            total_duration_ms: 0,
            moved_to: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, FileStatus::Completed)
    }
}

/// Totals for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Files discovered under the input root.
    pub discovered_files: usize,
    pub completed_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub outputs_written: usize,
    pub total_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutput {
    pub files: Vec<FileReport>,
    pub stats: BatchStats,
}
