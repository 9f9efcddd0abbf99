//! XML helpers shared by the readers and writers.
//!
//! Parts are read into a small element tree that remembers the byte span of
//! every element, so anything the model does not interpret can be copied
//! back out verbatim.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use slidemaker_core::{Error, Result};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::ops::Range;

/// Declaration written at the top of every generated part.
pub(crate) const XML_DECLARATION: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

/// An element with its attributes, children, direct text and source span.
#[derive(Debug, Clone, Default)]
pub(crate) struct XmlNode {
    /// Qualified name as written (`p:sp`).
    pub name: String,
    /// Attributes in document order, values unescaped.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Concatenated direct text content, unescaped.
    pub text: String,
    /// Bytes of the whole element, start tag to end tag.
    pub span: Range<usize>,
    /// End of the start tag.
    pub open_end: usize,
}

impl XmlNode {
    fn open(e: &BytesStart<'_>, start: usize, end: usize) -> Result<Self> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| Error::XmlError(format!("bad attribute: {}", e)))?;
            let value = attr
                .unescape_value()
                .map_err(|e| Error::XmlError(format!("bad attribute value: {}", e)))?;
            attrs.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(Self {
            name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            attrs,
            children: Vec::new(),
            text: String::new(),
            span: start..end,
            open_end: end,
        })
    }

    /// Name without its namespace prefix.
    pub fn local(&self) -> &str {
        local_name(&self.name)
    }

    /// Attribute by qualified or local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .or_else(|| self.attrs.iter().find(|(k, _)| local_name(k) == name))
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given local name.
    pub fn child(&self, local: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.local() == local)
    }

    /// Children with the given local name.
    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlNode> + 'a {
        self.children.iter().filter(move |c| c.local() == local)
    }

    /// First descendant (depth-first, self excluded) with the given local name.
    pub fn descendant(&self, local: &str) -> Option<&XmlNode> {
        self.children.iter().find_map(|c| {
            if c.local() == local {
                Some(c)
            } else {
                c.descendant(local)
            }
        })
    }

    /// Walk a path of local names.
    pub fn path(&self, locals: &[&str]) -> Option<&XmlNode> {
        locals.iter().try_fold(self, |node, local| node.child(local))
    }

    /// Direct text of every descendant with the given local name, in order.
    pub fn texts_of(&self, local: &str) -> String {
        let mut out = String::new();
        self.collect_texts(local, &mut out);
        out
    }

    fn collect_texts(&self, local: &str, out: &mut String) {
        for child in &self.children {
            if child.local() == local {
                out.push_str(&child.text);
            } else {
                child.collect_texts(local, out);
            }
        }
    }

    /// The element as it appears in the source.
    pub fn raw<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.span.clone()]
    }

    /// The start tag as it appears in the source.
    pub fn raw_open<'a>(&self, xml: &'a str) -> &'a str {
        &xml[self.span.start..self.open_end]
    }
}

/// Parse a document and return its root element.
pub(crate) fn parse(xml: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let start = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                stack.push(XmlNode::open(e, start, reader.buffer_position())?);
            }
            Ok(Event::Empty(ref e)) => {
                let node = XmlNode::open(e, start, reader.buffer_position())?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::End(_)) => {
                let mut node = stack
                    .pop()
                    .ok_or_else(|| Error::XmlError(format!("unbalanced end tag at byte {}", start)))?;
                node.span.end = reader.buffer_position();
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::Text(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| Error::XmlError(format!("bad text at byte {}: {}", start, e)))?;
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(ref t)) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(t));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(Error::XmlError("unexpected end of document".into()));
    }
    root.ok_or_else(|| Error::XmlError("document has no root element".into()))
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

/// Extract the local name from a potentially namespaced XML name.
pub(crate) fn local_name(name: &str) -> &str {
    match name.find(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Escape text or attribute content.
pub(crate) fn escape(s: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(s)
}

/// Append ` key="value"` pairs.
pub(crate) fn push_attrs(out: &mut String, attrs: &[(String, String)]) {
    for (key, value) in attrs {
        let _ = write!(out, " {}=\"{}\"", key, escape(value));
    }
}

/// `<tag attrs/>` or `<tag attrs>inner</tag>`.
pub(crate) fn push_element(out: &mut String, tag: &str, attrs: &str, inner: &str) {
    if inner.is_empty() {
        let _ = write!(out, "<{}{}/>", tag, attrs);
    } else {
        let _ = write!(out, "<{}{}>{}</{}>", tag, attrs, inner, tag);
    }
}
