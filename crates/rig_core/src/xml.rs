//! Generic XML tree reader.
//!
//! Parses a whole document into an owned tree of [`XmlNode`]s. The tree is a
//! thin navigation layer: no schema validation is done, unknown tags and
//! attributes are kept, and typed interpretation is left to the callers that
//! know what a value is supposed to be.
//!
//! Parsing is driven by the `xml-rs` event reader with whitespace trimmed,
//! comments dropped and CDATA folded into text.

use std::io::Read;
use std::str::FromStr;

use thiserror::Error;
use xml::common::Position;
use xml::reader::{ParserConfig, XmlEvent};

/// Errors that can occur while reading an XML document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("Malformed XML at line {line}, column {column}: {message}")]
    Malformed {
        line: u64,
        column: u64,
        message: String,
    },

    #[error("Document has no root element")]
    Empty,
}

/// Result type for XML reading.
pub type XmlResult<T> = Result<T, XmlError>;

/// An attribute value that could not be converted to the requested type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Attribute {attribute}=\"{value}\" on <{tag}> is not a valid {expected}")]
pub struct AttributeError {
    pub tag: String,
    pub attribute: String,
    pub value: String,
    pub expected: &'static str,
}

/// One element of a parsed document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct XmlNode {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlNode>,
    text: Option<String>,
}

impl XmlNode {
    /// Create a node with no attributes, children or text.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Tag name (local part, namespace prefix stripped).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// All attributes in document order.
    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    /// Parse an attribute into `T`.
    ///
    /// `Ok(None)` means the attribute is absent; a present but unparsable
    /// value (including an empty one) is an error.
    pub fn parse_attribute<T: FromStr>(&self, name: &str) -> Result<Option<T>, AttributeError> {
        let Some(value) = self.attribute(name) else {
            return Ok(None);
        };
        value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AttributeError {
                tag: self.name.clone(),
                attribute: name.to_string(),
                value: value.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// First child with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    /// All children with the given tag name, in document order.
    pub fn children<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a XmlNode> + 'n
    where
        'a: 'n,
    {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Every child element regardless of tag.
    pub fn all_children(&self) -> &[XmlNode] {
        &self.children
    }

    /// First child with the given tag whose attribute matches `value`.
    pub fn child_with_attribute(&self, name: &str, attribute: &str, value: &str) -> Option<&XmlNode> {
        self.children
            .iter()
            .find(|child| child.name == name && child.attribute(attribute) == Some(value))
    }

    /// Follow a path of tag names, taking the first match at each step.
    pub fn find(&self, path: &[&str]) -> Option<&XmlNode> {
        path.iter()
            .try_fold(self, |node, name| node.child(name))
    }

    /// Pre-order iterator over all descendants (not including `self`).
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Text content, or an empty string when the element has none.
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Text content, distinguishing "no text" from "empty text".
    pub fn text_opt(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Builder helper, mostly useful in tests.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Builder helper, mostly useful in tests.
    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Builder helper, mostly useful in tests.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    fn append_text(&mut self, text: &str) {
        match &mut self.text {
            Some(existing) => {
                // Character runs split by comments or CDATA still belong
                // to the same value list.
                existing.push(' ');
                existing.push_str(text);
            }
            None => self.text = Some(text.to_string()),
        }
    }
}

/// Pre-order traversal returned by [`XmlNode::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a XmlNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a XmlNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Parse a complete document and return its root element.
pub fn parse<R: Read>(reader: R) -> XmlResult<XmlNode> {
    let mut events = ParserConfig::new()
        .trim_whitespace(true)
        .whitespace_to_characters(false)
        .cdata_to_characters(true)
        .ignore_comments(true)
        .create_reader(reader);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = events.next().map_err(|err| {
            let position = err.position();
            XmlError::Malformed {
                line: position.row + 1,
                column: position.column + 1,
                message: err.to_string(),
            }
        })?;

        match event {
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                let node = XmlNode {
                    name: name.local_name,
                    attributes: attributes
                        .into_iter()
                        .map(|attr| (attr.name.local_name, attr.value))
                        .collect(),
                    children: Vec::new(),
                    text: None,
                };
                stack.push(node);
            }
            XmlEvent::EndElement { .. } => {
                // The reader rejects mismatched end tags, so the stack top is
                // always the element being closed.
                let Some(node) = stack.pop() else {
                    continue;
                };
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => root = Some(node),
                }
            }
            XmlEvent::Characters(text) => {
                if let Some(node) = stack.last_mut() {
                    node.append_text(&text);
                }
            }
            XmlEvent::EndDocument => break,
            _ => {}
        }
    }

    root.ok_or(XmlError::Empty)
}

/// Parse a document held in memory.
pub fn parse_bytes(bytes: &[u8]) -> XmlResult<XmlNode> {
    parse(bytes)
}
