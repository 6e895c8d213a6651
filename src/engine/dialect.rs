//! Where text lives inside each container format.

use crate::error::DocumentError;
use crate::format::Format;

/// Element vocabulary of one markup family, by local name.
#[derive(Debug)]
pub struct Dialect {
    /// Elements whose text is matched as one unit.
    pub paragraphs: &'static [&'static str],
    /// Element holding a run's text; `None` means every text node counts.
    pub text_leaf: Option<&'static str>,
    /// Subtrees that never carry substitutable text.
    pub opaque: &'static [&'static str],
    pub table: &'static str,
    pub row: &'static str,
    /// Row containers that may sit between a table and its rows.
    pub row_groups: &'static [&'static str],
    /// Rewritten leaves need `xml:space="preserve"` to keep edge whitespace.
    pub preserve_space: bool,
}

impl Dialect {
    pub fn is_paragraph(&self, local_name: &str) -> bool {
        self.paragraphs.contains(&local_name)
    }

    pub fn is_opaque(&self, local_name: &str) -> bool {
        self.opaque.contains(&local_name)
    }

    pub fn is_row_group(&self, local_name: &str) -> bool {
        self.row_groups.contains(&local_name)
    }
}

pub static WORDPROCESSING: Dialect = Dialect {
    paragraphs: &["p"],
    text_leaf: Some("t"),
    opaque: &[],
    table: "tbl",
    row: "tr",
    row_groups: &[],
    preserve_space: true,
};

pub static SPREADSHEET: Dialect = Dialect {
    paragraphs: &["si", "is"],
    text_leaf: Some("t"),
    opaque: &["rPh", "phoneticPr"],
    table: "sheetData",
    row: "row",
    row_groups: &[],
    preserve_space: true,
};

pub static OPENDOCUMENT: Dialect = Dialect {
    paragraphs: &["p", "h"],
    text_leaf: None,
    opaque: &["annotation", "tracked-changes"],
    table: "table",
    row: "table-row",
    row_groups: &["table-rows", "table-header-rows", "table-row-group"],
    preserve_space: false,
};

pub fn dialect_for(format: Format) -> Result<&'static Dialect, DocumentError> {
    match format {
        Format::WordProcessor => Ok(&WORDPROCESSING),
        Format::Spreadsheet => Ok(&SPREADSHEET),
        Format::VectorGraphics => Ok(&OPENDOCUMENT),
        Format::Pdf => Err(DocumentError::malformed(
            "portable documents cannot be used as templates",
        )),
    }
}

/// Parts of a package that carry template text.
pub fn is_text_part(format: Format, name: &str) -> bool {
    match format {
        Format::WordProcessor => {
            name == "word/document.xml"
                || name == "word/footnotes.xml"
                || name == "word/endnotes.xml"
                || ((name.starts_with("word/header") || name.starts_with("word/footer"))
                    && name.ends_with(".xml")
                    && !name.contains("/_rels/"))
        }
        Format::Spreadsheet => {
            name == "xl/sharedStrings.xml"
                || (name.starts_with("xl/worksheets/")
                    && name.ends_with(".xml")
                    && !name.contains("/_rels/"))
        }
        Format::VectorGraphics => name == "content.xml" || name == "styles.xml",
        Format::Pdf => false,
    }
}

/// Part that holds the tables row expansion works on (word processing and drawings).
pub fn body_part(format: Format) -> Option<&'static str> {
    match format {
        Format::WordProcessor => Some("word/document.xml"),
        Format::VectorGraphics => Some("content.xml"),
        Format::Spreadsheet | Format::Pdf => None,
    }
}
