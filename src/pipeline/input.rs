//! Input discovery and admission.
//!
//! Discovery walks the input tree (links are not followed, dotfiles are
//! skipped) and returns a sorted list so every run visits files in the same
//! order. Admission then decides, per file and before anything is uploaded,
//! whether the file may enter the pipeline at all.

use crate::error::{FileError, SequencerError};
use crate::fonts::{self, ServerFonts};
use crate::sequence::Sequence;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Collect every non-hidden file under `root`, sorted.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>, SequencerError> {
    if !root.is_dir() {
        return Err(SequencerError::InputDirMissing {
            path: root.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| SequencerError::InputUnreadable {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf()),
            detail: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        files.push(entry.into_path());
    }

    files.sort();
    info!("Input files: {}", files.len());
    debug!("Input files: {:?}", files);
    Ok(files)
}

/// Media type of a local file, from its extension.
pub fn media_type_of(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Lower-case extension without the dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Input formats accepted for `createpdf`, loaded from JSON.
///
/// ```json
/// { "all": ["docx", "pptx", "xlsx", "txt"], "fontCheck": ["docx"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupportedFormats {
    /// Every extension `createpdf` accepts.
    pub all: Vec<String>,
    /// Extensions whose embedded font table is checked for substitution.
    pub font_check: Vec<String>,
}

impl SupportedFormats {
    /// Load formats from `path`. A missing file yields `None` (no filtering).
    pub fn load(path: &Path) -> Result<Option<Self>, SequencerError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SequencerError::ConfigLoad {
                    path: path.to_path_buf(),
                    detail: e.to_string(),
                })
            }
        };
        let formats: Self = serde_json::from_str(&text).map_err(|e| SequencerError::ConfigLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Ok(Some(formats.normalised()))
    }

    /// Lower-case every entry and strip leading dots.
    pub fn normalised(self) -> Self {
        let norm = |v: Vec<String>| {
            v.into_iter()
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .collect()
        };
        Self {
            all: norm(self.all),
            font_check: norm(self.font_check),
        }
    }

    pub fn admits(&self, extension: &str) -> bool {
        self.all.iter().any(|e| e == extension)
    }

    pub fn needs_font_check(&self, extension: &str) -> bool {
        self.font_check.iter().any(|e| e == extension)
    }
}

/// Per-file gate applied before upload.
#[derive(Debug, Clone, Default)]
pub struct Admission {
    formats: Option<SupportedFormats>,
    server_fonts: Option<Arc<ServerFonts>>,
}

impl Admission {
    /// Admit everything except the redundant PDF-to-PDF case.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// `server_fonts` enables the font-substitution precheck.
    pub fn new(formats: Option<SupportedFormats>, server_fonts: Option<ServerFonts>) -> Self {
        Self {
            formats,
            server_fonts: server_fonts.map(Arc::new),
        }
    }

    /// Keep the format filter but drop the font precheck.
    pub fn without_font_check(mut self) -> Self {
        self.server_fonts = None;
        self
    }

    pub fn checks_fonts(&self) -> bool {
        self.server_fonts.is_some()
    }

    /// Decide whether `path` may enter the pipeline for `sequence`.
    ///
    /// * A sequence that creates a PDF never takes a PDF source.
    /// * When the sequence begins with `createpdf`, the extension must be a
    ///   supported format and, if the precheck is on, its fonts must not be
    ///   substituted. Precheck errors admit the file.
    pub async fn check(&self, path: &Path, sequence: &Sequence) -> Result<(), FileError> {
        if sequence.contains_create_pdf() && media_type_of(path) == PDF_MEDIA_TYPE {
            return Err(FileError::AlreadyPdf);
        }
        if !sequence.starts_with_create_pdf() {
            return Ok(());
        }
        let Some(formats) = &self.formats else {
            return Ok(());
        };

        let extension = extension_of(path);
        if !formats.admits(&extension) {
            return Err(FileError::UnsupportedFormat { extension });
        }

        let Some(server_fonts) = &self.server_fonts else {
            return Ok(());
        };
        if !formats.needs_font_check(&extension) {
            return Ok(());
        }

        let owned_path = path.to_path_buf();
        let fonts = Arc::clone(server_fonts);
        let checked =
            tokio::task::spawn_blocking(move || fonts::will_fonts_substitute(&owned_path, &fonts))
                .await;

        match checked {
            Ok(Ok(None)) => Ok(()),
            Ok(Ok(Some(font))) => Err(FileError::FontSubstitution { font }),
            Ok(Err(e)) => {
                warn!("Font check skipped for {}: {}", path.display(), e);
                Ok(())
            }
            Err(e) => {
                warn!("Font check task failed for {}: {}", path.display(), e);
                Ok(())
            }
        }
    }
}
