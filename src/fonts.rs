//! Font-substitution precheck for OOXML sources.
//!
//! `createpdf` renders word-processing documents with the fonts installed on
//! the service. A font that the document declares but does not embed (no
//! TrueType outlines) is replaced by whatever the service considers closest,
//! which silently changes the layout. This check reads `word/fontTable.xml`,
//! collects the non-embedded fonts and looks each one up in the list of
//! fonts known to be installed on the service.
//!
//! Matching is deliberately loose: a font counts as available when some
//! server font contains every whitespace-separated token of its name.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::ZipArchive;

const FONT_TABLE_ENTRY: &str = "word/fontTable.xml";

/// Errors while inspecting a document's font table. Always non-fatal.
#[derive(Debug, Error)]
pub enum FontCheckError {
    #[error("cannot open '{path}': {detail}")]
    Open { path: String, detail: String },

    #[error("not an OOXML archive: {0}")]
    Archive(String),

    #[error("font table is not valid XML: {0}")]
    Xml(String),
}

/// Whether a declared font can be rendered as-is by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontAvailability {
    OnServer,
    WillSubstitute,
}

/// Font names known to be installed on the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerFonts(Vec<String>);

impl ServerFonts {
    /// Parse a newline-delimited list (LF or CRLF); blank lines are ignored.
    pub fn from_lines(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Load the list from `path`. A missing file yields an empty list, which
    /// makes every non-embedded font a substitution.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let fonts = Self::from_lines(&text);
                debug!("Loaded {} server fonts from {}", fonts.len(), path.display());
                fonts
            }
            Err(e) => {
                warn!("Server font list {} unavailable: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Narrow the server list by each token of `font_name` in turn; the font
    /// is available if any candidate survives every token.
    pub fn availability(&self, font_name: &str) -> FontAvailability {
        let mut candidates: Vec<&str> = self.0.iter().map(String::as_str).collect();
        for token in font_name.split_whitespace() {
            candidates.retain(|server_font| server_font.contains(token));
            if candidates.is_empty() {
                break;
            }
        }
        if candidates.is_empty() {
            FontAvailability::WillSubstitute
        } else {
            FontAvailability::OnServer
        }
    }
}

/// Return the first non-embedded font of `path` that the service lacks.
///
/// `Ok(None)` means every non-embedded font has a server match (or there
/// are none).
pub fn will_fonts_substitute(
    path: &Path,
    server_fonts: &ServerFonts,
) -> Result<Option<String>, FontCheckError> {
    let xml = read_font_table(path)?;
    for font in unembedded_fonts(&xml)? {
        info!(
            "{}: '{}' has no TrueType outlines and was not embedded",
            path.display(),
            font
        );
        match server_fonts.availability(&font) {
            FontAvailability::OnServer => {
                info!("{}: '{}' may be available on the server", path.display(), font);
            }
            FontAvailability::WillSubstitute => {
                warn!("{}: '{}' may be substituted", path.display(), font);
                return Ok(Some(font));
            }
        }
    }
    Ok(None)
}

fn read_font_table(path: &Path) -> Result<String, FontCheckError> {
    let file = File::open(path).map_err(|e| FontCheckError::Open {
        path: path.display().to_string(),
        detail: e.to_string(),
    })?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| FontCheckError::Archive(e.to_string()))?;
    let mut entry = archive
        .by_name(FONT_TABLE_ENTRY)
        .map_err(|e| FontCheckError::Archive(format!("{FONT_TABLE_ENTRY}: {e}")))?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| FontCheckError::Archive(e.to_string()))?;
    Ok(xml)
}

/// Names of every `w:font` that carries a `w:notTrueType` child.
pub fn unembedded_fonts(xml: &str) -> Result<Vec<String>, FontCheckError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut fonts = Vec::new();
    let mut current: Option<String> = None;
    let mut not_true_type = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"w:font" => {
                current = font_name(e, &reader);
                not_true_type = false;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e))
                if e.name().as_ref() == b"w:notTrueType" =>
            {
                not_true_type = current.is_some();
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"w:font" => {
                if let Some(name) = current.take() {
                    if not_true_type {
                        fonts.push(name);
                    }
                }
                not_true_type = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FontCheckError::Xml(format!(
                    "at position {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(fonts)
}

fn font_name(e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"w:name")
        .and_then(|attr| attr.decode_and_unescape_value(reader).ok())
        .map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FONT_TABLE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:fonts xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:font w:name="Calibri"><w:panose1 w:val="020F0502020204030204"/></w:font>
  <w:font w:name="Frutiger LT Std"><w:notTrueType/><w:pitch w:val="variable"/></w:font>
  <w:font w:name="Times New Roman"><w:notTrueType/></w:font>
  <w:font w:name="Symbol"/>
</w:fonts>"#;

    fn server() -> ServerFonts {
        ServerFonts::from_lines("Arial\r\nTimes New Roman\r\nTimes New Roman Bold\r\n\r\nCourier New")
    }

    fn docx_with(xml: &str) -> tempfile::NamedTempFile {
        let tmp = tempfile::Builder::new().suffix(".docx").tempfile().unwrap();
        let mut zip = zip::ZipWriter::new(tmp.reopen().unwrap());
        zip.start_file(FONT_TABLE_ENTRY, zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
        tmp
    }

    #[test]
    fn crlf_list_is_parsed() {
        assert_eq!(server().len(), 4);
    }

    #[test]
    fn full_token_overlap_is_on_server() {
        assert_eq!(server().availability("Times New Roman"), FontAvailability::OnServer);
        assert_eq!(server().availability("Courier"), FontAvailability::OnServer);
    }

    #[test]
    fn no_token_overlap_will_substitute() {
        assert_eq!(
            server().availability("Frutiger LT Std"),
            FontAvailability::WillSubstitute
        );
    }

    #[test]
    fn partial_overlap_will_substitute() {
        // "Times" matches but "Condensed" narrows the candidates to nothing.
        assert_eq!(
            server().availability("Times Condensed"),
            FontAvailability::WillSubstitute
        );
    }

    #[test]
    fn empty_server_list_substitutes_everything() {
        assert_eq!(
            ServerFonts::default().availability("Arial"),
            FontAvailability::WillSubstitute
        );
    }

    #[test]
    fn collects_only_not_true_type_fonts() {
        let fonts = unembedded_fonts(FONT_TABLE).unwrap();
        assert_eq!(fonts, ["Frutiger LT Std", "Times New Roman"]);
    }

    #[test]
    fn document_with_missing_font_substitutes() {
        let doc = docx_with(FONT_TABLE);
        let font = will_fonts_substitute(doc.path(), &server()).unwrap();
        assert_eq!(font.as_deref(), Some("Frutiger LT Std"));
    }

    #[test]
    fn document_with_server_fonts_passes() {
        let doc = docx_with(
            r#"<w:fonts xmlns:w="x"><w:font w:name="Arial"><w:notTrueType/></w:font></w:fonts>"#,
        );
        assert_eq!(will_fonts_substitute(doc.path(), &server()).unwrap(), None);
    }

    #[test]
    fn non_zip_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"plain text").unwrap();
        assert!(matches!(
            will_fonts_substitute(tmp.path(), &server()),
            Err(FontCheckError::Archive(_))
        ));
    }
}
