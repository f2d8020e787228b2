//! Output resolution: naming, downloads, properties JSON and the optional
//! move of processed sources.
//!
//! Names are derived from the input path alone, so re-running a batch over
//! the same tree writes the same files:
//!
//! ```text
//! <in>/reports/q3.docx  --ocrpdf-->       <out>/reports/q3_ocrpdf.pdf
//! <in>/reports/q3.pdf   --pdftoimages-->  <out>/reports/q3_pdftoimages_00001.jpeg …
//! <in>/reports/q3.pdf   --pdfproperties-> <out>/reports/q3_properties.json
//! ```

use crate::client::DocumentService;
use crate::error::FileError;
use crate::output::{AssetRef, JobResponse, OutputArtifact};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Width of the numeric suffix for multi-asset outputs.
pub const SEQUENCE_SUFFIX_WIDTH: usize = 5;

/// Extensions for the media types the service emits. Anything else goes
/// through `mime_guess`.
static PREFERRED_EXTENSIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("application/pdf", "pdf"),
        ("application/zip", "zip"),
        ("application/json", "json"),
        ("image/jpeg", "jpeg"),
        ("image/png", "png"),
        (
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "docx",
        ),
        (
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "pptx",
        ),
        (
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "xlsx",
        ),
        ("application/rtf", "rtf"),
        ("text/plain", "txt"),
    ])
});

/// File extension (no dot) for a declared media type; `bin` when unknown.
pub fn extension_for_media_type(media_type: &str) -> String {
    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if let Some(ext) = PREFERRED_EXTENSIONS.get(essence.as_str()) {
        return (*ext).to_string();
    }
    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first())
        .map(|ext| (*ext).to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Input and output roots of a run.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
}

impl OutputLayout {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }

    /// `input` re-rooted under the output root.
    pub fn mirrored(&self, input: &Path) -> PathBuf {
        let relative = input
            .strip_prefix(&self.input_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| input.file_name().map(PathBuf::from).unwrap_or_default());
        self.output_root.join(relative)
    }

    fn stem_of(input: &Path) -> String {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `<out>/<rel dir>/<stem>_<operation>[_NNNNN].<ext>`
    pub fn output_file_path(
        &self,
        input: &Path,
        operation: &str,
        sequence: Option<usize>,
        media_type: &str,
    ) -> PathBuf {
        let mirrored = self.mirrored(input);
        let mut name = format!("{}_{}", Self::stem_of(input), operation);
        if let Some(n) = sequence {
            name.push_str(&format!("_{n:0width$}", width = SEQUENCE_SUFFIX_WIDTH));
        }
        name.push('.');
        name.push_str(&extension_for_media_type(media_type));
        mirrored.with_file_name(name)
    }

    /// `<out>/<rel dir>/<stem>_properties.json`
    pub fn properties_file_path(&self, input: &Path) -> PathBuf {
        self.mirrored(input)
            .with_file_name(format!("{}_properties.json", Self::stem_of(input)))
    }
}

/// Write every artifact of `response`, returning the paths in write order.
pub async fn save_output(
    service: &dyn DocumentService,
    layout: &OutputLayout,
    input: &Path,
    response: &JobResponse,
) -> Result<Vec<PathBuf>, FileError> {
    if response.artifacts.is_empty() {
        warn!(
            "{}: {} produced nothing to save",
            input.display(),
            response.operation
        );
    }

    let mut written = Vec::new();
    for artifact in &response.artifacts {
        match artifact {
            OutputArtifact::Properties(metadata) => {
                let dest = layout.properties_file_path(input);
                ensure_parent(&dest).await?;
                let json = serde_json::to_vec(metadata).map_err(|e| FileError::SaveFailed {
                    path: dest.clone(),
                    detail: e.to_string(),
                })?;
                tokio::fs::write(&dest, json)
                    .await
                    .map_err(|e| FileError::SaveFailed {
                        path: dest.clone(),
                        detail: e.to_string(),
                    })?;
                info!("Saved {}", dest.display());
                written.push(dest);
            }
            OutputArtifact::Single(asset) | OutputArtifact::Archive(asset) => {
                let dest = layout.output_file_path(input, &response.operation, None, &asset.media_type);
                download(service, asset, &dest).await?;
                written.push(dest);
            }
            OutputArtifact::AssetList(assets) => {
                for (position, asset) in assets {
                    let dest = layout.output_file_path(
                        input,
                        &response.operation,
                        Some(*position),
                        &asset.media_type,
                    );
                    download(service, asset, &dest).await?;
                    written.push(dest);
                }
            }
        }
    }
    Ok(written)
}

async fn download(
    service: &dyn DocumentService,
    asset: &AssetRef,
    dest: &Path,
) -> Result<(), FileError> {
    ensure_parent(dest).await?;
    let bytes = service.download_to(&asset.download_uri, dest).await?;
    info!("Saved {} ({} bytes)", dest.display(), bytes);
    Ok(())
}

async fn ensure_parent(dest: &Path) -> Result<(), FileError> {
    let Some(parent) = dest.parent() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| FileError::SaveFailed {
            path: dest.to_path_buf(),
            detail: format!("cannot create {}: {e}", parent.display()),
        })
}

/// Move a processed source to the same relative path under the output root.
///
/// Falls back to copy-then-remove when the roots are on different volumes.
pub async fn move_processed(layout: &OutputLayout, input: &Path) -> Result<PathBuf, FileError> {
    let dest = layout.mirrored(input);
    ensure_parent(&dest).await?;

    if tokio::fs::rename(input, &dest).await.is_err() {
        debug!("Rename failed for {}; copying instead", input.display());
        let fail = |e: std::io::Error| FileError::SaveFailed {
            path: dest.clone(),
            detail: e.to_string(),
        };
        tokio::fs::copy(input, &dest).await.map_err(fail)?;
        tokio::fs::remove_file(input).await.map_err(fail)?;
    }
    info!("Moved {} to {}", input.display(), dest.display());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> OutputLayout {
        OutputLayout::new("/data/in", "/data/out")
    }

    #[test]
    fn known_media_types() {
        assert_eq!(extension_for_media_type("application/pdf"), "pdf");
        assert_eq!(extension_for_media_type("image/jpeg"), "jpeg");
        assert_eq!(extension_for_media_type("Application/ZIP"), "zip");
        assert_eq!(extension_for_media_type("text/plain; charset=utf-8"), "txt");
    }

    #[test]
    fn unknown_media_type_is_bin() {
        assert_eq!(extension_for_media_type("application/x-made-up"), "bin");
        assert_eq!(extension_for_media_type(""), "bin");
    }

    #[test]
    fn name_replaces_source_extension() {
        let p = layout().output_file_path(
            Path::new("/data/in/reports/q3.docx"),
            "createpdf",
            None,
            "application/pdf",
        );
        assert_eq!(p, PathBuf::from("/data/out/reports/q3_createpdf.pdf"));
    }

    #[test]
    fn sequence_suffix_is_zero_padded() {
        let p = layout().output_file_path(
            Path::new("/data/in/scan.pdf"),
            "pdftoimages",
            Some(12),
            "image/png",
        );
        assert_eq!(p, PathBuf::from("/data/out/scan_pdftoimages_00012.png"));
    }

    #[test]
    fn properties_path_mirrors_directory() {
        let p = layout().properties_file_path(Path::new("/data/in/a/b/doc.pdf"));
        assert_eq!(p, PathBuf::from("/data/out/a/b/doc_properties.json"));
    }

    #[test]
    fn input_outside_root_lands_at_output_root() {
        let p = layout().mirrored(Path::new("/elsewhere/x.pdf"));
        assert_eq!(p, PathBuf::from("/data/out/x.pdf"));
    }

    #[tokio::test]
    async fn move_processed_mirrors_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let input_root = dir.path().join("in");
        let src = input_root.join("sub/doc.docx");
        std::fs::create_dir_all(src.parent().unwrap()).unwrap();
        std::fs::write(&src, b"docx").unwrap();

        let layout = OutputLayout::new(&input_root, dir.path().join("out"));
        let dest = move_processed(&layout, &src).await.unwrap();

        assert_eq!(dest, dir.path().join("out/sub/doc.docx"));
        assert!(!src.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"docx");
    }
}
