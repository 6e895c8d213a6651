//! Placeholder substitution inside container text.
//!
//! Authoring tools often split a token over several runs (`{nom` + `bre}`),
//! each with its own formatting. Matching therefore works on the concatenated
//! text of a paragraph; a matched token is merged into the first run it
//! touches and its remaining characters are cut from the following runs.

use quick_xml::escape::{escape, unescape};

use super::dialect::{dialect_for, is_text_part, Dialect};
use super::package::Package;
use super::placeholder::{plan_edits, PlaceholderMap, UnresolvedTokens, OPEN};
use super::xml::{Element, Node, XmlDocument};
use crate::error::DocumentError;
use crate::format::Format;

/// Replace tokens in every text-bearing part, leaving unknown tokens as literal text.
pub fn substitute(
    container: &[u8],
    format: Format,
    placeholders: &PlaceholderMap,
) -> Result<Vec<u8>, DocumentError> {
    substitute_with(container, format, placeholders, UnresolvedTokens::Keep)
}

pub fn substitute_with(
    container: &[u8],
    format: Format,
    placeholders: &PlaceholderMap,
    policy: UnresolvedTokens,
) -> Result<Vec<u8>, DocumentError> {
    let dialect = dialect_for(format)?;
    let mut package = Package::open(container)?;
    substitute_package(&mut package, format, dialect, placeholders, policy, &[])?;
    package.finish()
}

pub(crate) fn substitute_package(
    package: &mut Package<'_>,
    format: Format,
    dialect: &Dialect,
    placeholders: &PlaceholderMap,
    policy: UnresolvedTokens,
    skip: &[String],
) -> Result<(), DocumentError> {
    let parts: Vec<String> = package
        .part_names()
        .into_iter()
        .filter(|name| is_text_part(format, name) && !skip.contains(name))
        .collect();

    for name in parts {
        let Some(xml) = package.read_text(&name)? else {
            continue;
        };
        if !xml.contains(OPEN) {
            continue;
        }
        let mut doc = XmlDocument::parse(&xml)
            .map_err(|e| DocumentError::malformed(format!("{}: {}", name, e)))?;
        if substitute_nodes(&mut doc.nodes, dialect, placeholders, policy)? {
            log::debug!("substituted placeholders in {}", name);
            package.write(&name, doc.to_xml());
        }
    }
    Ok(())
}

/// Substitute inside a node list. Returns whether anything changed.
pub(crate) fn substitute_nodes(
    nodes: &mut [Node],
    dialect: &Dialect,
    placeholders: &PlaceholderMap,
    policy: UnresolvedTokens,
) -> Result<bool, DocumentError> {
    let mut changed = false;
    for node in nodes.iter_mut() {
        let Node::Element(el) = node else {
            continue;
        };
        let local = el.local_name();
        if dialect.is_opaque(local) {
            continue;
        }
        if dialect.is_paragraph(local) {
            let mut slots = Vec::new();
            collect_slots(&mut el.children, dialect, &mut slots);
            changed |= rewrite_paragraph(slots, dialect, placeholders, policy)?;
        }
        changed |= substitute_nodes(&mut el.children, dialect, placeholders, policy)?;
    }
    Ok(changed)
}

/// One piece of a paragraph's text and, for leaf dialects, the tag that wraps it.
struct Slot<'a> {
    text: &'a mut String,
    tag: Option<&'a mut String>,
}

fn collect_slots<'a>(nodes: &'a mut [Node], dialect: &Dialect, out: &mut Vec<Slot<'a>>) {
    for node in nodes.iter_mut() {
        match node {
            Node::Element(el) => {
                let local = el.local_name();
                // nested paragraphs (text boxes, notes) are matched on their own
                if dialect.is_paragraph(local) || dialect.is_opaque(local) {
                    continue;
                }
                if dialect.text_leaf == Some(local) {
                    let Element {
                        start, children, ..
                    } = el;
                    let mut tag = Some(start);
                    for child in children.iter_mut() {
                        if let Node::Text(text) = child {
                            out.push(Slot {
                                text,
                                tag: tag.take(),
                            });
                        }
                    }
                } else {
                    collect_slots(&mut el.children, dialect, out);
                }
            }
            Node::Text(text) if dialect.text_leaf.is_none() => {
                out.push(Slot { text, tag: None });
            }
            _ => {}
        }
    }
}

fn rewrite_paragraph(
    mut slots: Vec<Slot<'_>>,
    dialect: &Dialect,
    placeholders: &PlaceholderMap,
    policy: UnresolvedTokens,
) -> Result<bool, DocumentError> {
    if slots.is_empty() {
        return Ok(false);
    }

    let mut pieces = Vec::with_capacity(slots.len());
    for slot in &slots {
        let text = unescape(slot.text.as_str())
            .map_err(|e| DocumentError::malformed(format!("bad character reference: {}", e)))?;
        pieces.push(text.into_owned());
    }
    let joined: String = pieces.concat();
    if !joined.contains(OPEN) {
        return Ok(false);
    }

    let edits = plan_edits(&joined, placeholders, policy)?;
    if edits.is_empty() {
        return Ok(false);
    }

    let mut offset = 0;
    for (slot, piece) in slots.iter_mut().zip(&pieces) {
        let start = offset;
        let end = offset + piece.len();
        offset = end;

        let mut rebuilt = String::new();
        let mut pos = start;
        let mut touched = false;
        for edit in &edits {
            if edit.end <= start || edit.start >= end {
                continue;
            }
            touched = true;
            let cut_from = edit.start.max(start);
            rebuilt.push_str(&joined[pos..cut_from]);
            // the run where the token begins receives the whole value
            if edit.start >= start {
                rebuilt.push_str(&edit.value);
            }
            pos = edit.end.min(end);
        }
        if !touched {
            continue;
        }
        rebuilt.push_str(&joined[pos..end]);

        *slot.text = escape(rebuilt.as_str()).into_owned();
        if dialect.preserve_space && has_edge_whitespace(&rebuilt) {
            if let Some(tag) = slot.tag.as_deref_mut() {
                preserve_space(tag);
            }
        }
    }

    Ok(true)
}

fn has_edge_whitespace(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

fn preserve_space(tag: &mut String) {
    if !tag.contains("xml:space") {
        super::xml::set_attr_value(tag, "xml:space", "preserve");
    }
}

/// Paragraph texts of a node list, in document order.
pub(crate) fn paragraph_texts(nodes: &[Node], dialect: &Dialect) -> Vec<String> {
    let mut out = Vec::new();
    gather_paragraphs(nodes, dialect, &mut out);
    out
}

fn gather_paragraphs(nodes: &[Node], dialect: &Dialect, out: &mut Vec<String>) {
    for node in nodes {
        let Node::Element(el) = node else {
            continue;
        };
        let local = el.local_name();
        if dialect.is_opaque(local) {
            continue;
        }
        if dialect.is_paragraph(local) {
            let mut text = String::new();
            paragraph_text(&el.children, dialect, &mut text);
            out.push(text);
        }
        gather_paragraphs(&el.children, dialect, out);
    }
}

fn paragraph_text(nodes: &[Node], dialect: &Dialect, out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => {
                let local = el.local_name();
                if dialect.is_paragraph(local) || dialect.is_opaque(local) {
                    continue;
                }
                if dialect.text_leaf == Some(local) {
                    out.push_str(&el.text());
                } else {
                    paragraph_text(&el.children, dialect, out);
                }
            }
            Node::Text(raw) if dialect.text_leaf.is_none() => match unescape(raw) {
                Ok(text) => out.push_str(&text),
                Err(_) => out.push_str(raw),
            },
            _ => {}
        }
    }
}

/// Text of every paragraph in the container's text-bearing parts.
pub fn extract_text(container: &[u8], format: Format) -> Result<Vec<String>, DocumentError> {
    let dialect = dialect_for(format)?;
    let mut package = Package::open(container)?;
    let mut out = Vec::new();
    for name in package.part_names() {
        if !is_text_part(format, &name) {
            continue;
        }
        if let Some(xml) = package.read_text(&name)? {
            let doc = XmlDocument::parse(&xml)?;
            out.extend(paragraph_texts(&doc.nodes, dialect));
        }
    }
    Ok(out)
}
