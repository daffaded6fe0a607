//! Minimal element tree used for import documents and embedded SKU data.
//!
//! Serialization and parsing go through `quick-xml`; the tree itself only
//! knows names, attributes (in insertion order), text and child elements.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use std::path::Path;

use crate::types::{Result, SyncError};

/// Child content of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A named element with attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Element with a single text child.
    pub fn text_element(name: impl Into<String>, text: impl ToString) -> Self {
        Self::new(name).with_text(text)
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    pub fn with_text(mut self, text: impl ToString) -> Self {
        let text = text.to_string();
        if !text.is_empty() {
            self.children.push(Node::Text(text));
        }
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|c| match c {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Concatenated direct text content.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                Node::Text(t) => Some(t.as_str()),
                Node::Element(_) => None,
            })
            .collect()
    }

    /// Serialize as an indented document with an XML declaration.
    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| SyncError::Xml(e.to_string()))?;
        self.write(&mut writer)?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| SyncError::Xml(e.to_string()))
    }

    /// Serialize to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml_string()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::staging(parent, e))?;
        }
        std::fs::write(path, xml).map_err(|e| SyncError::staging(path, e))
    }

    fn write<W: std::io::Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.children.is_empty() {
            return writer
                .write_event(Event::Empty(start))
                .map_err(|e| SyncError::Xml(e.to_string()));
        }

        writer
            .write_event(Event::Start(start))
            .map_err(|e| SyncError::Xml(e.to_string()))?;
        for child in &self.children {
            match child {
                Node::Element(e) => e.write(writer)?,
                Node::Text(t) => writer
                    .write_event(Event::Text(BytesText::new(t)))
                    .map_err(|e| SyncError::Xml(e.to_string()))?,
            }
        }
        writer
            .write_event(Event::End(BytesEnd::new(self.name.as_str())))
            .map_err(|e| SyncError::Xml(e.to_string()))
    }

    /// Parse a document into its root element.
    pub fn parse(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => stack.push(start_element(&e)?),
                Ok(Event::Empty(e)) => {
                    let element = start_element(&e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::End(_)) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| SyncError::Xml("unbalanced end tag".to_string()))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Ok(Event::Text(t)) => {
                    let text = t.unescape().map_err(|e| SyncError::Xml(e.to_string()))?;
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Node::Text(text.into_owned()));
                    }
                }
                Ok(Event::CData(t)) => {
                    let text = String::from_utf8_lossy(&t.into_inner()).into_owned();
                    if let Some(top) = stack.last_mut() {
                        top.children.push(Node::Text(text));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(SyncError::Xml(e.to_string())),
            }
        }

        if !stack.is_empty() {
            return Err(SyncError::Xml("unexpected end of document".to_string()));
        }
        root.ok_or_else(|| SyncError::Xml("document has no root element".to_string()))
    }
}

fn start_element(e: &BytesStart<'_>) -> Result<Element> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut element = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|e| SyncError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| SyncError::Xml(e.to_string()))?;
        element.attributes.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(SyncError::Xml("multiple root elements".to_string())),
    }
}
