//! Worksheet plumbing: workbook sheet order, shared strings and row expansion.
//!
//! Row copies are renumbered and every row below the anchor moves down by the
//! number of inserted rows. Merged ranges and the sheet dimension follow.
//! Formulas are left as written.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use super::dialect::SPREADSHEET;
use super::package::Package;
use super::placeholder::OPEN;
use super::rows::{render_copies, require_tokens, RowFill, RowSpec};
use super::substitute::substitute_nodes;
use super::xml::{Element, Node, XmlDocument};
use crate::error::DocumentError;

pub(crate) const WORKBOOK: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
pub(crate) const CONTENT_TYPES: &str = "[Content_Types].xml";
pub(crate) const TABLE_REL: &str = "/relationships/table";

lazy_static! {
    static ref CELL_REF: Regex = Regex::new(r"^\$?([A-Z]+)\$?(\d+)$").unwrap();
}

/// A `<sheet>` entry of the workbook joined with its part name.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetEntry {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    pub part: String,
}

/// Sheets in workbook (tab) order.
pub(crate) fn workbook_sheets(package: &mut Package<'_>) -> Result<Vec<SheetEntry>, DocumentError> {
    let workbook = read_required(package, WORKBOOK)?;
    let rels = read_required(package, WORKBOOK_RELS)?;
    let workbook = XmlDocument::parse(&workbook)?;
    let rels = XmlDocument::parse(&rels)?;

    let targets: Vec<(String, String)> = rels
        .find("Relationships")
        .map(|root| {
            root.child_elements("Relationship")
                .filter_map(|rel| Some((rel.attr("Id")?, rel.attr("Target")?)))
                .collect()
        })
        .unwrap_or_default();

    let sheets = workbook
        .find("sheets")
        .ok_or_else(|| DocumentError::malformed("workbook has no sheets"))?;

    let mut entries = Vec::new();
    for sheet in sheets.child_elements("sheet") {
        let (Some(name), Some(rel_id)) = (sheet.attr("name"), sheet.attr("r:id")) else {
            return Err(DocumentError::malformed("sheet entry without name or relationship"));
        };
        let sheet_id = sheet
            .attr("sheetId")
            .and_then(|id| id.parse().ok())
            .unwrap_or(0);
        let target = targets
            .iter()
            .find(|(id, _)| *id == rel_id)
            .map(|(_, target)| target.as_str())
            .ok_or_else(|| {
                DocumentError::malformed(format!("sheet {} has no relationship {}", name, rel_id))
            })?;
        entries.push(SheetEntry {
            name,
            sheet_id,
            rel_id,
            part: resolve_target(target),
        });
    }
    Ok(entries)
}

fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target),
    }
}

pub(crate) fn read_required(package: &mut Package<'_>, part: &str) -> Result<String, DocumentError> {
    package
        .read_text(part)?
        .ok_or_else(|| DocumentError::malformed(format!("missing part {}", part)))
}

/// The workbook's shared string table, `<si>` items in index order.
#[derive(Debug, Default)]
pub(crate) struct SharedStrings {
    items: Vec<Element>,
}

impl SharedStrings {
    pub(crate) fn load(package: &mut Package<'_>) -> Result<Self, DocumentError> {
        match package.read_text(SHARED_STRINGS)? {
            Some(xml) => Self::parse(&xml),
            None => Ok(Self::default()),
        }
    }

    pub(crate) fn parse(xml: &str) -> Result<Self, DocumentError> {
        let doc = XmlDocument::parse(xml)?;
        let items = doc
            .find("sst")
            .map(|sst| sst.child_elements("si").cloned().collect())
            .unwrap_or_default();
        Ok(Self { items })
    }

    fn get(&self, index: usize) -> Option<&Element> {
        self.items.get(index)
    }
}

/// Rows inserted at one anchor; `delta` is negative when the anchor is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RowShift {
    pub anchor: u32,
    pub copies: u32,
    pub delta: i64,
}

/// Fill every region of `specs` on its worksheet and return the sheet parts
/// that were filled here, header included.
pub(crate) fn fill_package_rows(
    package: &mut Package<'_>,
    specs: &[RowSpec],
    fill: &RowFill<'_>,
) -> Result<Vec<String>, DocumentError> {
    let sheets = workbook_sheets(package)?;
    let mut by_sheet: BTreeMap<usize, Vec<&RowSpec>> = BTreeMap::new();
    for spec in specs {
        by_sheet.entry(spec.table).or_default().push(spec);
    }

    let shared = SharedStrings::load(package)?;
    let mut handled = Vec::with_capacity(by_sheet.len());
    for (index, regions) in by_sheet {
        let sheet = sheets.get(index).ok_or_else(|| {
            DocumentError::malformed(format!(
                "worksheet {} not found ({} in workbook)",
                index,
                sheets.len()
            ))
        })?;
        let xml = read_required(package, &sheet.part)?;
        let mut doc = XmlDocument::parse(&xml)?;
        let shifts = fill_sheet_rows(&mut doc, &shared, &regions, fill)?;
        shift_sheet_tables(package, &sheet.part, &shifts)?;
        package.write(&sheet.part, doc.to_xml());
        handled.push(sheet.part.clone());
    }
    Ok(handled)
}

/// Row expansion over a parsed worksheet. `spec.anchor_row` is the row number minus one.
///
/// Anchors are set aside while the header is applied, then expanded from the
/// bottom of the sheet up. The shifts are returned in the order applied.
pub(crate) fn fill_sheet_rows(
    doc: &mut XmlDocument,
    shared: &SharedStrings,
    specs: &[&RowSpec],
    fill: &RowFill<'_>,
) -> Result<Vec<RowShift>, DocumentError> {
    let mut ordered: Vec<&RowSpec> = specs.to_vec();
    ordered.sort_by(|a, b| b.anchor_row.cmp(&a.anchor_row));
    if ordered.windows(2).any(|pair| pair[0].anchor_row == pair[1].anchor_row) {
        return Err(DocumentError::malformed(
            "one worksheet row is used by two regions",
        ));
    }

    let sheet_data = doc
        .find_mut("sheetData")
        .ok_or_else(|| DocumentError::malformed("worksheet has no sheetData"))?;
    let mut anchors = Vec::with_capacity(ordered.len());
    for spec in &ordered {
        let number = u32::try_from(spec.anchor_row + 1)
            .map_err(|_| DocumentError::malformed("anchor row out of range"))?;
        let index = sheet_data
            .children
            .iter()
            .position(|node| row_number(node) == Some(number))
            .ok_or_else(|| {
                DocumentError::malformed(format!("row {} not found in worksheet", number))
            })?;
        let mut anchor = std::mem::replace(
            &mut sheet_data.children[index],
            Node::Markup(String::new()),
        );
        if let Some(row) = anchor.as_element_mut() {
            inline_shared_cells(row, shared);
        }
        require_tokens(std::slice::from_ref(&anchor), &SPREADSHEET, spec)?;
        anchors.push((index, number, anchor));
    }

    if let Some(values) = fill.outside_values(ordered.iter().copied()) {
        substitute_nodes(&mut doc.nodes, &SPREADSHEET, &values, fill.policy)?;
    }

    let mut shifts = Vec::with_capacity(ordered.len());
    for (spec, (index, anchor_number, anchor)) in ordered.iter().zip(anchors) {
        let copies = u32::try_from(spec.row_count())
            .map_err(|_| DocumentError::InvalidDomainData("too many rows".to_string()))?;
        let delta = i64::from(copies) - 1;

        let sheet_data = doc
            .find_mut("sheetData")
            .ok_or_else(|| DocumentError::malformed("worksheet has no sheetData"))?;
        for node in sheet_data.children.iter_mut().skip(index + 1) {
            if let Some(row) = node.as_element_mut() {
                if let Some(number) = row_number_of(row).filter(|n| *n > anchor_number) {
                    renumber_row(row, shifted(number, delta));
                }
            }
        }

        let mut rendered = render_copies(&anchor, &SPREADSHEET, spec, fill)?;
        for (offset, copy) in (0u32..).zip(rendered.iter_mut()) {
            if let Some(row) = copy.as_element_mut() {
                renumber_row(row, anchor_number + offset);
            }
        }
        sheet_data.children.splice(index..=index, rendered);

        shift_merges(doc, anchor_number, copies, delta);
        shift_dimension(doc, anchor_number, delta);
        shifts.push(RowShift {
            anchor: anchor_number,
            copies,
            delta,
        });
    }
    Ok(shifts)
}

/// Move the ranges of the sheet's table parts the way its rows moved.
pub(crate) fn shift_sheet_tables(
    package: &mut Package<'_>,
    sheet_part: &str,
    shifts: &[RowShift],
) -> Result<(), DocumentError> {
    if shifts.is_empty() {
        return Ok(());
    }
    let Some(rels) = package.read_text(&sheet_rels_part(sheet_part))? else {
        return Ok(());
    };
    let rels = XmlDocument::parse(&rels)?;
    let tables: Vec<String> = rels
        .find("Relationships")
        .map(|root| {
            root.child_elements("Relationship")
                .filter(|rel| rel.attr("Type").is_some_and(|t| t.ends_with(TABLE_REL)))
                .filter_map(|rel| rel.attr("Target"))
                .map(|target| resolve_relative(sheet_part, &target))
                .collect()
        })
        .unwrap_or_default();

    for part in tables {
        let mut table = XmlDocument::parse(&read_required(package, &part)?)?;
        if let Some(root) = table.find_mut("table") {
            shift_ref(root, shifts);
            for filter in root.child_elements_mut("autoFilter") {
                shift_ref(filter, shifts);
            }
        }
        package.write(&part, table.to_xml());
    }
    Ok(())
}

fn shift_ref(el: &mut Element, shifts: &[RowShift]) {
    let Some(mut range) = el.attr("ref").and_then(|r| CellRange::parse(&r)) else {
        return;
    };
    for shift in shifts {
        range = range.shifted_by(shift.anchor, shift.delta);
    }
    el.set_attr("ref", &range.render());
}

/// `_rels` part holding the relationships of `part`.
pub(crate) fn sheet_rels_part(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target written relative to the directory of `source`.
pub(crate) fn resolve_relative(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };
    for segment in target.split('/') {
        match segment {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Make shared-string cells that hold a token carry their text inline, so each
/// copy of the row can be filled independently.
pub(crate) fn inline_shared_cells(row: &mut Element, shared: &SharedStrings) {
    for cell in row.child_elements_mut("c") {
        if cell.attr("t").as_deref() != Some("s") {
            continue;
        }
        let Some(index) = cell
            .child_elements("v")
            .next()
            .and_then(|v| v.text().trim().parse::<usize>().ok())
        else {
            continue;
        };
        let Some(item) = shared.get(index) else {
            continue;
        };
        if !item.text().contains(OPEN) {
            continue;
        }

        let inline = Element::new(&format!("{}is", cell.prefix()), &[], item.children.clone());
        cell.set_attr("t", "inlineStr");
        if cell.end.is_none() {
            let open = format!("{}>", cell.start.trim_end_matches("/>").trim_end());
            cell.start = open;
            cell.end = Some(format!("</{}>", cell.name));
        }
        cell.children = vec![Node::Element(inline)];
    }
}

/// Inline every token-bearing shared-string cell of a worksheet.
pub(crate) fn inline_sheet_cells(doc: &mut XmlDocument, shared: &SharedStrings) {
    if let Some(sheet_data) = doc.find_mut("sheetData") {
        for row in sheet_data.child_elements_mut("row") {
            inline_shared_cells(row, shared);
        }
    }
}

fn row_number(node: &Node) -> Option<u32> {
    match node {
        Node::Element(el) if el.local_name() == "row" => row_number_of(el),
        _ => None,
    }
}

fn row_number_of(row: &Element) -> Option<u32> {
    row.attr("r")?.parse().ok()
}

fn shifted(row: u32, delta: i64) -> u32 {
    u32::try_from((i64::from(row) + delta).max(1)).unwrap_or(u32::MAX)
}

fn renumber_row(row: &mut Element, number: u32) {
    row.set_attr("r", &number.to_string());
    for cell in row.child_elements_mut("c") {
        let Some(reference) = cell.attr("r") else {
            continue;
        };
        if let Some((column, _)) = split_cell_ref(&reference) {
            cell.set_attr("r", &format!("{}{}", column, number));
        }
    }
}

fn split_cell_ref(reference: &str) -> Option<(String, u32)> {
    let caps = CELL_REF.captures(reference)?;
    Some((caps[1].to_string(), caps[2].parse().ok()?))
}

#[derive(Debug, Clone, PartialEq)]
struct CellRange {
    first_col: String,
    first_row: u32,
    last_col: String,
    last_row: u32,
    single: bool,
}

impl CellRange {
    fn parse(reference: &str) -> Option<Self> {
        match reference.split_once(':') {
            Some((first, last)) => {
                let (first_col, first_row) = split_cell_ref(first)?;
                let (last_col, last_row) = split_cell_ref(last)?;
                Some(Self {
                    first_col,
                    first_row,
                    last_col,
                    last_row,
                    single: false,
                })
            }
            None => {
                let (col, row) = split_cell_ref(reference)?;
                Some(Self {
                    first_col: col.clone(),
                    first_row: row,
                    last_col: col,
                    last_row: row,
                    single: true,
                })
            }
        }
    }

    fn with_rows(&self, first_row: u32, last_row: u32) -> Self {
        Self {
            first_row,
            last_row,
            ..self.clone()
        }
    }

    /// Follow an insertion at `anchor`: ranges below move, ranges over it grow.
    fn shifted_by(&self, anchor: u32, delta: i64) -> Self {
        if self.first_row > anchor {
            self.with_rows(shifted(self.first_row, delta), shifted(self.last_row, delta))
        } else if self.last_row >= anchor {
            self.with_rows(
                self.first_row,
                shifted(self.last_row, delta).max(self.first_row),
            )
        } else {
            self.clone()
        }
    }

    fn render(&self) -> String {
        if self.single {
            format!("{}{}", self.first_col, self.first_row)
        } else {
            format!(
                "{}{}:{}{}",
                self.first_col, self.first_row, self.last_col, self.last_row
            )
        }
    }
}

fn shift_merges(doc: &mut XmlDocument, anchor: u32, copies: u32, delta: i64) {
    let Some(merges) = doc.find_mut("mergeCells") else {
        return;
    };

    let mut rebuilt = Vec::with_capacity(merges.children.len());
    for node in merges.children.drain(..) {
        let Node::Element(merge) = node else {
            rebuilt.push(node);
            continue;
        };
        let Some(range) = merge.attr("ref").and_then(|r| CellRange::parse(&r)) else {
            rebuilt.push(Node::Element(merge));
            continue;
        };

        if range.first_row == anchor && range.last_row == anchor {
            for offset in 0..copies {
                let copy = range.with_rows(anchor + offset, anchor + offset);
                rebuilt.push(Node::Element(with_ref(merge.clone(), &copy)));
            }
        } else if range.last_row >= anchor {
            let moved = range.shifted_by(anchor, delta);
            rebuilt.push(Node::Element(with_ref(merge, &moved)));
        } else {
            rebuilt.push(Node::Element(merge));
        }
    }

    let count = rebuilt.iter().filter(|node| node.as_element().is_some()).count();
    merges.children = rebuilt;
    merges.set_attr("count", &count.to_string());

    if count == 0 {
        // An empty mergeCells element is rejected by spreadsheet applications.
        if let Some(root) = doc.find_mut("worksheet") {
            root.children.retain(|node| {
                node.as_element()
                    .map_or(true, |el| el.local_name() != "mergeCells")
            });
        }
    }
}

fn with_ref(mut merge: Element, range: &CellRange) -> Element {
    merge.set_attr("ref", &range.render());
    merge
}

fn shift_dimension(doc: &mut XmlDocument, anchor: u32, delta: i64) {
    let Some(dimension) = doc.find_mut("dimension") else {
        return;
    };
    let Some(range) = dimension.attr("ref").and_then(|r| CellRange::parse(&r)) else {
        return;
    };
    if range.last_row < anchor {
        return;
    }
    let last = shifted(range.last_row, delta).max(range.first_row);
    let mut updated = range.with_rows(range.first_row, last);
    updated.single = updated.first_row == updated.last_row && range.first_col == range.last_col;
    dimension.set_attr("ref", &updated.render());
}
