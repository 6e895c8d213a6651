//! Document formats understood by the engine and MIME type detection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Format tags for the containers the engine fills and the converter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Format {
    /// OOXML workbook (`.xlsx`).
    #[serde(rename = "spreadsheet-container", alias = "xlsx")]
    Spreadsheet,
    /// OOXML word-processing document (`.docx`).
    #[serde(rename = "word-processor-container", alias = "docx")]
    WordProcessor,
    /// OpenDocument drawing (`.odg`).
    #[serde(rename = "vector-graphics-container", alias = "odg")]
    VectorGraphics,
    #[serde(rename = "portable-document", alias = "pdf")]
    Pdf,
}

impl Format {
    pub const ALL: [Format; 4] = [
        Format::Spreadsheet,
        Format::WordProcessor,
        Format::VectorGraphics,
        Format::Pdf,
    ];

    /// Stable tag used at the API boundary.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Spreadsheet => "spreadsheet-container",
            Self::WordProcessor => "word-processor-container",
            Self::VectorGraphics => "vector-graphics-container",
            Self::Pdf => "portable-document",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Spreadsheet => "xlsx",
            Self::WordProcessor => "docx",
            Self::VectorGraphics => "odg",
            Self::Pdf => "pdf",
        }
    }

    /// Get MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Spreadsheet => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            Self::WordProcessor => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::VectorGraphics => "application/vnd.oasis.opendocument.graphics",
            Self::Pdf => "application/pdf",
        }
    }

    /// Whether the format is a zip package holding XML parts that templates can live in.
    pub fn is_container(&self) -> bool {
        !matches!(self, Self::Pdf)
    }

    /// Parse a tag or extension, ignoring case and surrounding whitespace.
    pub fn from_tag(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        let value = value.trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|format| format.tag() == value || format.extension() == value)
    }

    /// Parse from filename.
    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_tag)
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Detect the format family from content magic bytes.
///
/// Zip packages are told apart by the part names they carry, so only the
/// leading signature is checked here; `None` means "not a document we know".
pub fn detect_format_from_bytes(data: &[u8]) -> Option<FormatFamily> {
    if data.len() < 4 {
        return None;
    }

    if data.starts_with(b"%PDF") {
        return Some(FormatFamily::Pdf);
    }

    // PK\x03\x04 local file header
    if data.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
        return Some(FormatFamily::Package);
    }

    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    Package,
    Pdf,
}
