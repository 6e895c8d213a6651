//! Repeated-row expansion.
//!
//! The anchor row of a template table is replaced, in place, by
//! `max(rows, minimum)` copies of itself. Copies past the supplied data are
//! padding: every row token becomes an empty string.
//!
//! [`fill_rows`] does the expansion and the document-level substitution in a
//! single pass, so text that came from a value is never matched again.

use std::collections::HashSet;

use super::dialect::{body_part, dialect_for, Dialect};
use super::package::Package;
use super::placeholder::{PlaceholderMap, Token, UnresolvedTokens};
use super::sheet;
use super::substitute::{paragraph_texts, substitute_nodes, substitute_package};
use super::xml::{children_at_mut, Node, XmlDocument};
use crate::error::DocumentError;
use crate::format::Format;

/// One repeatable table region.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSpec {
    /// Table index in document order, or worksheet index in workbook order.
    pub table: usize,
    /// 0-based row index within the table (worksheet: row number minus one).
    pub anchor_row: usize,
    /// Tokens the anchor row must contain.
    pub tokens: Vec<Token>,
    pub rows: Vec<PlaceholderMap>,
    pub minimum: usize,
}

impl RowSpec {
    pub fn new<S: AsRef<str>>(
        table: usize,
        anchor_row: usize,
        tokens: &[S],
    ) -> Result<Self, DocumentError> {
        let mut parsed = Vec::with_capacity(tokens.len());
        let mut seen = HashSet::new();
        for raw in tokens {
            let token = Token::new(raw.as_ref())?;
            if seen.insert(token.clone()) {
                parsed.push(token);
            }
        }
        Ok(Self {
            table,
            anchor_row,
            tokens: parsed,
            rows: Vec::new(),
            minimum: 0,
        })
    }

    pub fn with_rows(mut self, rows: Vec<PlaceholderMap>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_minimum(mut self, minimum: usize) -> Self {
        self.minimum = minimum;
        self
    }

    /// Final number of rows in the region.
    pub fn row_count(&self) -> usize {
        self.rows.len().max(self.minimum)
    }

    /// Values for the `index`-th copy; padding copies blank every row token.
    pub fn row_values(&self, index: usize) -> PlaceholderMap {
        let mut values = self.rows.get(index).cloned().unwrap_or_default();
        values.extend_missing(&PlaceholderMap::blank(&self.tokens));
        values
    }
}

/// How the copies of a row region, and the text around them, are filled.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RowFill<'a> {
    /// Document-level values. `None` leaves text outside the copies alone.
    pub header: Option<&'a PlaceholderMap>,
    pub policy: UnresolvedTokens,
}

impl<'a> RowFill<'a> {
    pub(crate) fn rows_only(policy: UnresolvedTokens) -> Self {
        Self {
            header: None,
            policy,
        }
    }

    pub(crate) fn with_header(header: &'a PlaceholderMap, policy: UnresolvedTokens) -> Self {
        Self {
            header: Some(header),
            policy,
        }
    }

    /// Row values first, then the header.
    fn copy_values(&self, spec: &RowSpec, index: usize) -> PlaceholderMap {
        let mut values = spec.row_values(index);
        if let Some(header) = self.header {
            values.extend_missing(header);
        }
        values
    }

    /// Values for text outside every region: the header, with row tokens blanked.
    pub(crate) fn outside_values<'s, I>(&self, specs: I) -> Option<PlaceholderMap>
    where
        I: IntoIterator<Item = &'s RowSpec>,
    {
        let mut values = self.header?.clone();
        for spec in specs {
            values.extend_missing(&PlaceholderMap::blank(&spec.tokens));
        }
        Some(values)
    }
}

/// Expand the region described by `spec` and return the new container.
///
/// Tokens in the copies that the row data does not cover stay as written.
pub fn expand_rows(
    container: &[u8],
    format: Format,
    spec: &RowSpec,
) -> Result<Vec<u8>, DocumentError> {
    expand_rows_with(container, format, spec, UnresolvedTokens::Keep)
}

/// Like [`expand_rows`], with `policy` deciding the fate of tokens in the
/// copies that the row data does not cover. Text outside the region is untouched.
pub fn expand_rows_with(
    container: &[u8],
    format: Format,
    spec: &RowSpec,
    policy: UnresolvedTokens,
) -> Result<Vec<u8>, DocumentError> {
    let dialect = dialect_for(format)?;
    let mut package = Package::open(container)?;
    fill_region_parts(
        &mut package,
        format,
        dialect,
        std::slice::from_ref(spec),
        &RowFill::rows_only(policy),
    )?;

    log::debug!(
        "expanded table {} row {} into {} rows ({} with data)",
        spec.table,
        spec.anchor_row,
        spec.row_count(),
        spec.rows.len()
    );
    package.finish()
}

/// Fill a template with document values and any number of row regions.
///
/// Every piece of template text is matched exactly once. Copies of an anchor
/// row take their row's values and fall back to `header`; all other text takes
/// `header`, with row tokens blanked. Inserted values are never matched again,
/// so a value that looks like a token stays literal.
pub fn fill_rows(
    container: &[u8],
    format: Format,
    header: &PlaceholderMap,
    specs: &[RowSpec],
    policy: UnresolvedTokens,
) -> Result<Vec<u8>, DocumentError> {
    let dialect = dialect_for(format)?;
    let mut package = Package::open(container)?;
    let fill = RowFill::with_header(header, policy);

    let handled = fill_region_parts(&mut package, format, dialect, specs, &fill)?;
    if let Some(rest) = fill.outside_values(specs) {
        substitute_package(&mut package, format, dialect, &rest, policy, &handled)?;
    }

    log::debug!(
        "filled {} row region(s) and {} header value(s)",
        specs.len(),
        header.len()
    );
    package.finish()
}

/// Expand every region and return the parts that were filled here.
fn fill_region_parts(
    package: &mut Package<'_>,
    format: Format,
    dialect: &Dialect,
    specs: &[RowSpec],
    fill: &RowFill<'_>,
) -> Result<Vec<String>, DocumentError> {
    match body_part(format) {
        Some(part) => {
            let xml = package
                .read_text(part)?
                .ok_or_else(|| DocumentError::malformed(format!("missing part {}", part)))?;
            let mut doc = XmlDocument::parse(&xml)
                .map_err(|e| DocumentError::malformed(format!("{}: {}", part, e)))?;
            fill_table_rows(&mut doc, dialect, specs, fill)?;
            package.write(part, doc.to_xml());
            Ok(vec![part.to_string()])
        }
        None => sheet::fill_package_rows(package, specs, fill),
    }
}

/// Row expansion over a parsed word-processing or OpenDocument part.
///
/// Anchors are set aside while the header is applied, then replaced by their
/// copies from the bottom of the document up so earlier paths stay valid.
pub(crate) fn fill_table_rows(
    doc: &mut XmlDocument,
    dialect: &Dialect,
    specs: &[RowSpec],
    fill: &RowFill<'_>,
) -> Result<(), DocumentError> {
    let mut regions: Vec<(Vec<usize>, &RowSpec)> = Vec::with_capacity(specs.len());
    for spec in specs {
        let path = anchor_path(&mut doc.nodes, dialect, spec)?;
        if regions.iter().any(|(other, _)| *other == path) {
            return Err(DocumentError::malformed(format!(
                "row {} of table {} is used by two regions",
                spec.anchor_row, spec.table
            )));
        }
        regions.push((path, spec));
    }

    let mut anchors = Vec::with_capacity(regions.len());
    for (path, spec) in &regions {
        let slot = node_at_mut(&mut doc.nodes, path)?;
        let anchor = std::mem::replace(slot, Node::Markup(String::new()));
        require_tokens(std::slice::from_ref(&anchor), dialect, spec)?;
        anchors.push(anchor);
    }

    if let Some(values) = fill.outside_values(specs) {
        substitute_nodes(&mut doc.nodes, dialect, &values, fill.policy)?;
    }

    let mut order: Vec<usize> = (0..regions.len()).collect();
    order.sort_by(|a, b| regions[*b].0.cmp(&regions[*a].0));
    for i in order {
        let (path, spec) = &regions[i];
        let copies = render_copies(&anchors[i], dialect, spec, fill)?;
        let Some((&index, parent_path)) = path.split_last() else {
            return Err(DocumentError::malformed("empty row path"));
        };
        let parent = children_at_mut(&mut doc.nodes, parent_path)
            .ok_or_else(|| DocumentError::malformed("row path is stale"))?;
        parent.splice(index..=index, copies);
    }
    Ok(())
}

/// Absolute child-index path of a region's anchor row.
fn anchor_path(
    nodes: &mut Vec<Node>,
    dialect: &Dialect,
    spec: &RowSpec,
) -> Result<Vec<usize>, DocumentError> {
    let mut table_path = Vec::new();
    let mut remaining = spec.table;
    if !nth_table_path(nodes, dialect, &mut remaining, &mut table_path) {
        return Err(DocumentError::malformed(format!(
            "table {} not found",
            spec.table
        )));
    }

    let table_children = children_at_mut(nodes, &table_path)
        .ok_or_else(|| DocumentError::malformed("table path is stale"))?;
    let mut row_path = Vec::new();
    let mut remaining = spec.anchor_row;
    if !nth_row_path(table_children, dialect, &mut remaining, &mut row_path) {
        return Err(DocumentError::malformed(format!(
            "row {} not found in table {}",
            spec.anchor_row, spec.table
        )));
    }

    table_path.extend(row_path);
    Ok(table_path)
}

fn node_at_mut<'a>(
    nodes: &'a mut Vec<Node>,
    path: &[usize],
) -> Result<&'a mut Node, DocumentError> {
    let Some((&index, parent_path)) = path.split_last() else {
        return Err(DocumentError::malformed("empty row path"));
    };
    children_at_mut(nodes, parent_path)
        .and_then(|children| children.get_mut(index))
        .ok_or_else(|| DocumentError::malformed("row path is stale"))
}

/// One filled copy of `anchor` per row; padding copies blank the row tokens.
pub(crate) fn render_copies(
    anchor: &Node,
    dialect: &Dialect,
    spec: &RowSpec,
    fill: &RowFill<'_>,
) -> Result<Vec<Node>, DocumentError> {
    let mut copies = Vec::with_capacity(spec.row_count());
    for i in 0..spec.row_count() {
        let mut copy = anchor.clone();
        substitute_nodes(
            std::slice::from_mut(&mut copy),
            dialect,
            &fill.copy_values(spec, i),
            fill.policy,
        )?;
        copies.push(copy);
    }
    Ok(copies)
}

/// Every token of the region must appear in the anchor row's text.
pub(crate) fn require_tokens(
    anchor: &[Node],
    dialect: &Dialect,
    spec: &RowSpec,
) -> Result<(), DocumentError> {
    let text = paragraph_texts(anchor, dialect).join("\n");
    let missing: Vec<&str> = spec
        .tokens
        .iter()
        .map(Token::as_str)
        .filter(|token| !text.contains(token))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DocumentError::malformed(format!(
            "anchor row {} lacks tokens {}",
            spec.anchor_row,
            missing.join(", ")
        )))
    }
}

/// Depth-first search for the n-th table; fills `path` with child indexes.
fn nth_table_path(
    nodes: &[Node],
    dialect: &Dialect,
    remaining: &mut usize,
    path: &mut Vec<usize>,
) -> bool {
    for (i, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        path.push(i);
        if el.local_name() == dialect.table {
            if *remaining == 0 {
                return true;
            }
            *remaining -= 1;
        }
        if nth_table_path(&el.children, dialect, remaining, path) {
            return true;
        }
        path.pop();
    }
    false
}

/// Rows of one table, looking through row groups but never into nested tables.
fn nth_row_path(
    nodes: &[Node],
    dialect: &Dialect,
    remaining: &mut usize,
    path: &mut Vec<usize>,
) -> bool {
    for (i, node) in nodes.iter().enumerate() {
        let Node::Element(el) = node else {
            continue;
        };
        let local = el.local_name();
        if local == dialect.row {
            if *remaining == 0 {
                path.push(i);
                return true;
            }
            *remaining -= 1;
        } else if dialect.is_row_group(local) {
            path.push(i);
            if nth_row_path(&el.children, dialect, remaining, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}
