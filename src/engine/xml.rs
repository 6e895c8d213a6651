//! Minimal lossless XML tree.
//!
//! Every node keeps the raw markup it was parsed from, so serializing an
//! untouched tree reproduces the input byte for byte. Only the pieces the
//! engine rewrites (text, a handful of attributes) change on output.

use quick_xml::escape::{escape, unescape};
use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;

use crate::error::DocumentError;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Character data exactly as written in the source, entities still escaped.
    Text(String),
    /// Comments, CDATA, declarations and processing instructions, verbatim.
    Markup(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Qualified name, e.g. `w:tr`.
    pub name: String,
    /// Raw start tag including angle brackets (`<w:tr w:rsidR="00AB">` or `<row r="3"/>`).
    pub start: String,
    pub children: Vec<Node>,
    /// Raw end tag; `None` for self-closing elements.
    pub end: Option<String>,
}

impl Element {
    /// Build an element from a qualified name and attribute list.
    pub fn new(name: &str, attributes: &[(&str, &str)], children: Vec<Node>) -> Self {
        let mut start = format!("<{}", name);
        for (key, value) in attributes {
            start.push_str(&format!(" {}=\"{}\"", key, escape(*value)));
        }
        start.push('>');
        Self {
            name: name.to_string(),
            start,
            children,
            end: Some(format!("</{}>", name)),
        }
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    /// Namespace prefix including the colon, or an empty string.
    pub fn prefix(&self) -> &str {
        match self.name.rfind(':') {
            Some(i) => &self.name[..=i],
            None => "",
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        attr_value(&self.start, name)
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        set_attr_value(&mut self.start, name, value);
    }

    pub fn remove_attr(&mut self, name: &str) {
        if let Some(range) = attr_span(&self.start, name) {
            self.start.replace_range(range, "");
        }
    }

    /// Direct child elements with the given local name.
    pub fn child_elements<'a>(&'a self, local_name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter_map(move |node| match node {
            Node::Element(el) if el.local_name() == local_name => Some(el),
            _ => None,
        })
    }

    pub fn child_elements_mut<'a>(
        &'a mut self,
        local_name: &'a str,
    ) -> impl Iterator<Item = &'a mut Element> {
        self.children.iter_mut().filter_map(move |node| match node {
            Node::Element(el) if el.local_name() == local_name => Some(el),
            _ => None,
        })
    }

    /// Unescaped text of every descendant text node, in document order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    fn write(&self, out: &mut String) {
        out.push_str(&self.start);
        for child in &self.children {
            child.write(out);
        }
        if let Some(end) = &self.end {
            out.push_str(end);
        }
    }
}

impl Node {
    /// Text node holding `value` escaped for use as character data.
    pub fn text(value: &str) -> Self {
        Node::Text(escape(value).into_owned())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }

    fn write(&self, out: &mut String) {
        match self {
            Node::Element(el) => el.write(out),
            Node::Text(raw) | Node::Markup(raw) => out.push_str(raw),
        }
    }
}

/// A parsed XML part.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub nodes: Vec<Node>,
}

impl XmlDocument {
    pub fn parse(xml: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut nodes: Vec<Node> = Vec::new();

        loop {
            let node = match reader.read_event()? {
                Event::Start(e) => {
                    let name = utf8(e.name().as_ref())?;
                    stack.push(Element {
                        name,
                        start: format!("<{}>", utf8(&e)?),
                        children: Vec::new(),
                        end: None,
                    });
                    continue;
                }
                Event::End(e) => {
                    let mut element = stack.pop().ok_or_else(|| {
                        DocumentError::malformed("closing tag without matching opening tag")
                    })?;
                    element.end = Some(format!("</{}>", utf8(&e)?));
                    Node::Element(element)
                }
                Event::Empty(e) => Node::Element(Element {
                    name: utf8(e.name().as_ref())?,
                    start: format!("<{}/>", utf8(&e)?),
                    children: Vec::new(),
                    end: None,
                }),
                Event::Text(e) => Node::Text(utf8(&e)?),
                Event::CData(e) => Node::Markup(format!("<![CDATA[{}]]>", utf8(&e)?)),
                Event::Comment(e) => Node::Markup(format!("<!--{}-->", utf8(&e)?)),
                Event::Decl(e) => Node::Markup(format!("<?{}?>", utf8(&e)?)),
                Event::PI(e) => Node::Markup(format!("<?{}?>", utf8(&e)?)),
                Event::DocType(e) => Node::Markup(format!("<!DOCTYPE{}>", utf8(&e)?)),
                Event::Eof => break,
            };

            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => nodes.push(node),
            }
        }

        if let Some(open) = stack.last() {
            return Err(DocumentError::malformed(format!(
                "element <{}> is never closed",
                open.name
            )));
        }

        Ok(Self { nodes })
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            node.write(&mut out);
        }
        out
    }

    /// First element with the given local name, searching depth first.
    pub fn find(&self, local_name: &str) -> Option<&Element> {
        find_in(&self.nodes, local_name)
    }

    pub fn find_mut(&mut self, local_name: &str) -> Option<&mut Element> {
        find_in_mut(&mut self.nodes, local_name)
    }
}

fn find_in<'a>(nodes: &'a [Node], local_name: &str) -> Option<&'a Element> {
    for node in nodes {
        if let Node::Element(el) = node {
            if el.local_name() == local_name {
                return Some(el);
            }
            if let Some(found) = find_in(&el.children, local_name) {
                return Some(found);
            }
        }
    }
    None
}

fn find_in_mut<'a>(nodes: &'a mut [Node], local_name: &str) -> Option<&'a mut Element> {
    for node in nodes.iter_mut() {
        if let Node::Element(el) = node {
            if el.local_name() == local_name {
                return Some(el);
            }
            if let Some(found) = find_in_mut(&mut el.children, local_name) {
                return Some(found);
            }
        }
    }
    None
}

/// Follow a path of child indexes and return the children list it ends in.
pub fn children_at_mut<'a>(mut nodes: &'a mut Vec<Node>, path: &[usize]) -> Option<&'a mut Vec<Node>> {
    for &index in path {
        nodes = match nodes.get_mut(index) {
            Some(Node::Element(el)) => &mut el.children,
            _ => return None,
        };
    }
    Some(nodes)
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(el) => collect_text(&el.children, out),
            Node::Text(raw) => match unescape(raw) {
                Ok(text) => out.push_str(&text),
                Err(_) => out.push_str(raw),
            },
            Node::Markup(_) => {}
        }
    }
}

pub fn local(name: &str) -> &str {
    match name.rfind(':') {
        Some(i) => &name[i + 1..],
        None => name,
    }
}

fn utf8(bytes: &[u8]) -> Result<String, DocumentError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| DocumentError::malformed(format!("part is not valid UTF-8: {}", e)))
}

fn attr_regex(name: &str) -> Regex {
    // Both quote styles; the value sits in group 1 or 2.
    Regex::new(&format!(
        r#"\s{}\s*=\s*(?:"([^"]*)"|'([^']*)')"#,
        regex::escape(name)
    ))
    .expect("attribute pattern is built from an escaped literal")
}

fn attr_span(tag: &str, name: &str) -> Option<std::ops::Range<usize>> {
    attr_regex(name).find(tag).map(|m| m.range())
}

/// Unescaped value of an attribute inside a raw start tag.
pub fn attr_value(tag: &str, name: &str) -> Option<String> {
    let caps = attr_regex(name).captures(tag)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str();
    Some(
        unescape(raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

/// Replace or append an attribute inside a raw start tag.
pub fn set_attr_value(tag: &mut String, name: &str, value: &str) {
    let rendered = format!(" {}=\"{}\"", name, escape(value));
    if let Some(range) = attr_span(tag, name) {
        tag.replace_range(range, &rendered);
        return;
    }
    let insert_at = if tag.ends_with("/>") {
        tag.len() - 2
    } else {
        tag.len() - 1
    };
    tag.insert_str(insert_at, &rendered);
}
