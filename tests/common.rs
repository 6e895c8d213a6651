//! Shared fixtures: small but real office packages and a scripted converter.
#![allow(dead_code)]

use async_trait::async_trait;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use pestdocs_server::convert::{ConversionJob, ConverterBackend, ConverterFailure};

pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
pub const S_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Zip the given parts in order. A `mimetype` part is stored uncompressed.
pub fn zip_package(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        let options = if *name == "mimetype" {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
        };
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Text of one part of a package, `None` if absent.
pub fn read_part(package: &[u8], name: &str) -> Option<String> {
    let mut archive = ZipArchive::new(Cursor::new(package)).unwrap();
    let mut file = archive.by_name(name).ok()?;
    let mut out = String::new();
    file.read_to_string(&mut out).unwrap();
    Some(out)
}

pub fn part_names(package: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(package)).unwrap();
    archive.file_names().map(String::from).collect::<Vec<_>>()
}

// ---------------------------------------------------------------------------
// Word processing

/// A paragraph with one run per piece, alternating bold and italic formatting.
pub fn w_paragraph(pieces: &[&str]) -> String {
    let mut out = String::from("<w:p>");
    for (i, piece) in pieces.iter().enumerate() {
        let props = if i % 2 == 0 { "<w:b/>" } else { "<w:i/>" };
        out.push_str(&format!(
            "<w:r><w:rPr>{}</w:rPr><w:t>{}</w:t></w:r>",
            props, piece
        ));
    }
    out.push_str("</w:p>");
    out
}

pub fn w_row(cells: &[&str]) -> String {
    let mut out = String::from("<w:tr><w:trPr><w:trHeight w:val=\"300\"/></w:trPr>");
    for cell in cells {
        out.push_str(&format!("<w:tc>{}</w:tc>", w_paragraph(&[cell])));
    }
    out.push_str("</w:tr>");
    out
}

pub fn w_table(rows: &[&[&str]]) -> String {
    let mut out = String::from("<w:tbl><w:tblPr><w:tblW w:w=\"5000\" w:type=\"pct\"/></w:tblPr>");
    for row in rows {
        out.push_str(&w_row(row));
    }
    out.push_str("</w:tbl>");
    out
}

pub fn docx_with_parts(body: &str, header: Option<&str>) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{}" xmlns:r="{}"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        W_NS, R_NS, body
    );
    let content_types = r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;
    let rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

    let header_xml = header.map(|h| {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:hdr xmlns:w="{}">{}</w:hdr>"#,
            W_NS, h
        )
    });
    let mut parts = vec![
        ("[Content_Types].xml", content_types),
        ("_rels/.rels", rels),
        ("word/document.xml", document.as_str()),
    ];
    if let Some(h) = header_xml.as_deref() {
        parts.push(("word/header1.xml", h));
    }
    zip_package(&parts)
}

pub fn docx(body: &str) -> Vec<u8> {
    docx_with_parts(body, None)
}

// ---------------------------------------------------------------------------
// Drawings

pub fn odg(page_content: &str) -> Vec<u8> {
    let content = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:draw="urn:oasis:names:tc:opendocument:xmlns:drawing:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0"><office:body><office:drawing><draw:page draw:name="page1">{}</draw:page></office:drawing></office:body></office:document-content>"#,
        page_content
    );
    let manifest = r#"<?xml version="1.0" encoding="UTF-8"?><manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0"><manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.graphics"/><manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/></manifest:manifest>"#;
    zip_package(&[
        ("mimetype", "application/vnd.oasis.opendocument.graphics"),
        ("content.xml", &content),
        ("META-INF/manifest.xml", manifest),
    ])
}

/// A text frame holding one paragraph.
pub fn odg_frame(paragraph: &str) -> String {
    format!(
        r#"<draw:frame><draw:text-box><text:p>{}</text:p></draw:text-box></draw:frame>"#,
        paragraph
    )
}

// ---------------------------------------------------------------------------
// Spreadsheets

/// One inline-string cell.
pub fn x_inline(cell_ref: &str, text: &str) -> String {
    format!(r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#, cell_ref, text)
}

/// One shared-string cell.
pub fn x_shared(cell_ref: &str, index: usize) -> String {
    format!(r#"<c r="{}" t="s"><v>{}</v></c>"#, cell_ref, index)
}

pub fn x_row(number: u32, cells: &[String]) -> String {
    format!(r#"<row r="{}" spans="1:4">{}</row>"#, number, cells.concat())
}

pub fn worksheet(rows: &[String], merges: &[&str], last_cell: &str) -> String {
    let merges = if merges.is_empty() {
        String::new()
    } else {
        let cells: String = merges
            .iter()
            .map(|m| format!(r#"<mergeCell ref="{}"/>"#, m))
            .collect();
        format!(r#"<mergeCells count="{}">{}</mergeCells>"#, merges.len(), cells)
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="{}" xmlns:r="{}"><dimension ref="A1:{}"/><sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews><sheetData>{}</sheetData>{}<pageSetup orientation="landscape" r:id="rId1"/></worksheet>"#,
        S_NS,
        R_NS,
        last_cell,
        rows.concat(),
        merges
    )
}

pub fn shared_strings(items: &[&str]) -> String {
    let si: String = items.iter().map(|s| format!("<si><t>{}</t></si>", s)).collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="{}" count="{}" uniqueCount="{}">{}</sst>"#,
        S_NS,
        items.len(),
        items.len(),
        si
    )
}

/// A one-sheet workbook named `Hoja1`, with a print area and printer settings.
pub fn xlsx(sheet: &str, shared: &[&str]) -> Vec<u8> {
    xlsx_package(sheet, shared, None)
}

/// Like [`xlsx`], with a table part `Tabla1` over `table_ref` linked as `rId2`.
/// The sheet should carry `<tableParts count="1"><tablePart r:id="rId2"/></tableParts>`.
pub fn xlsx_with_table(sheet: &str, shared: &[&str], table_ref: &str) -> Vec<u8> {
    xlsx_package(sheet, shared, Some(table_ref))
}

pub fn table_parts() -> &'static str {
    r#"<tableParts count="1"><tablePart r:id="rId2"/></tableParts>"#
}

fn xlsx_package(sheet: &str, shared: &[&str], table_ref: Option<&str>) -> Vec<u8> {
    let table_override = if table_ref.is_some() {
        r#"<Override PartName="/xl/tables/table1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.table+xml"/>"#
    } else {
        ""
    };
    let content_types = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="bin" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.printerSettings"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>{}</Types>"#,
        table_override
    );
    let rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;
    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="{}" xmlns:r="{}"><bookViews><workbookView activeTab="0"/></bookViews><sheets><sheet name="Hoja1" sheetId="1" r:id="rId1"/></sheets><definedNames><definedName name="_xlnm.Print_Area" localSheetId="0">Hoja1!$A$1:$D$20</definedName></definedNames></workbook>"#,
        S_NS, R_NS
    );
    let workbook_rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#;
    let table_rel = if table_ref.is_some() {
        r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/table" Target="../tables/table1.xml"/>"#
    } else {
        ""
    };
    let sheet_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/printerSettings" Target="../printerSettings/printerSettings1.bin"/>{}</Relationships>"#,
        table_rel
    );
    let table = table_ref.map(|range| {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><table xmlns="{}" id="1" name="Tabla1" displayName="Tabla1" ref="{}" totalsRowShown="0"><autoFilter ref="{}"/><tableColumns count="1"><tableColumn id="1" name="Fecha"/></tableColumns></table>"#,
            S_NS, range, range
        )
    });
    let shared = shared_strings(shared);

    let mut parts = vec![
        ("[Content_Types].xml", content_types.as_str()),
        ("_rels/.rels", rels),
        ("xl/workbook.xml", workbook.as_str()),
        ("xl/_rels/workbook.xml.rels", workbook_rels),
        ("xl/worksheets/sheet1.xml", sheet),
        ("xl/worksheets/_rels/sheet1.xml.rels", sheet_rels.as_str()),
        ("xl/printerSettings/printerSettings1.bin", "printer"),
        ("xl/sharedStrings.xml", shared.as_str()),
    ];
    if let Some(table) = table.as_deref() {
        parts.push(("xl/tables/table1.xml", table));
    }
    zip_package(&parts)
}

// ---------------------------------------------------------------------------
// Converter double

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockMode {
    Succeed,
    Unavailable,
    Fail,
    /// Exit cleanly without writing anything.
    NoOutput,
}

/// Records concurrency and scratch directories; writes `%PDF-mock:` + input.
pub struct MockBackend {
    pub delay: Duration,
    pub mode: Mutex<MockMode>,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
    pub work_dirs: Mutex<Vec<PathBuf>>,
    /// Input bytes in the order jobs reached the backend.
    pub inputs: Mutex<Vec<Vec<u8>>>,
}

impl MockBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            mode: Mutex::new(MockMode::Succeed),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            work_dirs: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_mode(delay: Duration, mode: MockMode) -> Self {
        let backend = Self::new(delay);
        *backend.mode.lock().unwrap() = mode;
        backend
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn work_dirs(&self) -> Vec<PathBuf> {
        self.work_dirs.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<Vec<u8>> {
        self.inputs.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConverterBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn convert(&self, job: &ConversionJob) -> Result<(), ConverterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.work_dirs.lock().unwrap().push(job.work_dir.clone());
        if let Ok(input) = std::fs::read(&job.input) {
            self.inputs.lock().unwrap().push(input);
        }
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(&self.current);

        tokio::time::sleep(self.delay).await;

        let mode = *self.mode.lock().unwrap();
        match mode {
            MockMode::Succeed => {
                let input = tokio::fs::read(&job.input)
                    .await
                    .map_err(|e| ConverterFailure::Failed(e.to_string()))?;
                let mut output = b"%PDF-mock:".to_vec();
                output.extend_from_slice(&input);
                tokio::fs::write(job.output_path(), output)
                    .await
                    .map_err(|e| ConverterFailure::Failed(e.to_string()))
            }
            MockMode::Unavailable => Err(ConverterFailure::Unavailable(
                "connection refused".to_string(),
            )),
            MockMode::Fail => Err(ConverterFailure::Failed("source file could not be loaded".to_string())),
            MockMode::NoOutput => Ok(()),
        }
    }
}
