//! Document tree
//!
//! An owned tree built from XML/XHTML with `quick_xml`. Unlike a reader
//! tuned for metadata, this tree keeps everything needed to write the
//! document back: whitespace-exact text, attributes in source order with
//! their raw (still escaped) values, comments, processing instructions,
//! CDATA sections and the document type declaration.
//!
//! Only [Node::Text] carries character data that a visitor may rewrite;
//! everything else in a [Node::Markup] is written back verbatim.

use std::{
    borrow::Cow,
    io::{Cursor, Write},
};

use quick_xml::{
    Reader, Writer,
    escape::{partial_escape, resolve_html5_entity, unescape},
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};

use crate::{error::BionicError, utils::DecodeBytes};

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// A node of the document tree
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// An element with its attributes and children
    Element(XmlElement),

    /// Character data, with entity and character references already resolved
    Text(String),

    /// Markup passed through untouched: comments, processing instructions,
    /// CDATA sections, the doctype and unresolvable entity references
    Markup(String),
}

/// Represents an element node in an XML document
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    /// The local name of the element(excluding namespace prefix)
    pub name: String,

    /// The namespace prefix of the element
    pub prefix: Option<String>,

    /// The attributes of the element, in source order
    ///
    /// Keys are qualified names, values are kept escaped as they were written.
    pub attributes: Vec<(String, String)>,

    /// The children of the element
    pub children: Vec<Node>,

    /// Whether the element was written as `<tag/>`
    pub self_closing: bool,
}

impl XmlElement {
    /// Create a new element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            attributes: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    /// Get the full tag name of the element
    ///
    /// If the element has a namespace prefix, return "prefix:name" format;
    /// otherwise, return only the element name.
    pub fn tag_name(&self) -> String {
        if let Some(prefix) = &self.prefix {
            format!("{}:{}", prefix, self.name)
        } else {
            self.name.clone()
        }
    }

    /// Returns the unescaped value of the specified attribute
    pub fn get_attr(&self, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| match unescape(value) {
                Ok(value) => value.into_owned(),
                Err(_) => value.clone(),
            })
    }

    /// Find all elements with the specified local name, this element included,
    /// in document order
    pub fn find_elements_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        SearchElementsByNameIter::new(self, name)
    }

    /// Find all elements with the specified name among the child elements of the current element
    pub fn find_children_by_name(&self, name: &str) -> impl Iterator<Item = &XmlElement> {
        self.children().filter(move |child| child.name == name)
    }

    /// Get children elements
    pub fn children(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Collects the text of this element and all its descendants, untrimmed
    pub fn visible_text(&self) -> String {
        let mut result = String::new();
        Self::collect_text(&self.children, &mut result);
        result
    }

    fn collect_text(nodes: &[Node], collection: &mut String) {
        for node in nodes {
            match node {
                Node::Text(text) => collection.push_str(text),
                Node::Element(element) => Self::collect_text(&element.children, collection),
                Node::Markup(_) => {}
            }
        }
    }
}

struct SearchElementsByNameIter<'a> {
    elements: Vec<&'a XmlElement>,
    current_index: usize,
    target_name: String,
}

impl<'a> SearchElementsByNameIter<'a> {
    fn new(root: &'a XmlElement, name: &str) -> Self {
        let mut elements = Vec::new();
        Self::collect_elements(root, &mut elements);
        Self {
            elements,
            current_index: 0,
            target_name: name.to_string(),
        }
    }

    fn collect_elements(element: &'a XmlElement, collection: &mut Vec<&'a XmlElement>) {
        collection.push(element);
        for child in element.children() {
            Self::collect_elements(child, collection);
        }
    }
}

impl<'a> Iterator for SearchElementsByNameIter<'a> {
    type Item = &'a XmlElement;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_index < self.elements.len() {
            let element = self.elements[self.current_index];
            self.current_index += 1;
            if element.name == self.target_name {
                return Some(element);
            }
        }
        None
    }
}

/// A parsed document: the prolog, the root element and anything after it
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    /// Top-level nodes in document order; exactly one of them is an element
    pub nodes: Vec<Node>,
}

impl XmlDocument {
    /// Returns the root element
    pub fn root(&self) -> Option<&XmlElement> {
        self.nodes.iter().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Returns the root element mutably
    pub fn root_mut(&mut self) -> Option<&mut XmlElement> {
        self.nodes.iter_mut().find_map(|node| match node {
            Node::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Serializes the document as UTF-8 markup
    ///
    /// Text is escaped minimally (`<`, `>` and `&`); attribute values and
    /// markup nodes are written exactly as they were read.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BionicError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        for node in &self.nodes {
            Self::write_node(&mut writer, node)?;
        }

        Ok(writer.into_inner().into_inner())
    }

    fn write_node(writer: &mut XmlWriter, node: &Node) -> Result<(), BionicError> {
        match node {
            Node::Text(text) => {
                writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
            }

            Node::Markup(raw) => writer.get_mut().write_all(raw.as_bytes())?,

            Node::Element(element) => {
                let tag = element.tag_name();
                let mut start = BytesStart::new(tag.as_str());
                for (key, value) in &element.attributes {
                    // values are already escaped, only the delimiter may clash
                    let value = if value.contains('"') {
                        Cow::Owned(value.replace('"', "&quot;"))
                    } else {
                        Cow::Borrowed(value.as_str())
                    };
                    start.push_attribute((key.as_bytes(), value.as_bytes()));
                }

                if element.self_closing && element.children.is_empty() {
                    writer.write_event(Event::Empty(start))?;
                } else {
                    writer.write_event(Event::Start(start))?;
                    for child in &element.children {
                        Self::write_node(writer, child)?;
                    }
                    writer.write_event(Event::End(BytesEnd::new(tag.as_str())))?;
                }
            }
        }

        Ok(())
    }
}

/// XML parser used to parse XML content and build an [XmlDocument]
pub struct XmlReader {}

impl XmlReader {
    /// Parses an XML from string and builds the document tree
    ///
    /// This function takes an XML string, parses its content using the `quick_xml` library,
    /// and builds an `XmlDocument` holding the whole structure of the document.
    ///
    /// ## Parameters
    /// - `content`: The XML string to be parsed
    ///
    /// ## Return
    /// - `Ok(XmlDocument)`: The document tree
    /// - `Err(BionicError)`: The content is empty, ill-formed, has unclosed
    ///   elements or has no root element
    pub fn parse(content: &str) -> Result<XmlDocument, BionicError> {
        if content.is_empty() {
            return Err(BionicError::EmptyDataError);
        }

        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(false);

        let mut stack = Vec::<XmlElement>::new();
        let mut nodes = Vec::<Node>::new();

        loop {
            match reader.read_event()? {
                Event::Eof => break,

                Event::Start(e) => stack.push(Self::make_element(&e, false)?),

                Event::End(_) => {
                    // The reader checks that end names match,
                    // so the stack can only be empty on a stray end tag.
                    let element = stack.pop().ok_or(BionicError::MissingRootElement)?;
                    Self::append(&mut stack, &mut nodes, Node::Element(element));
                }

                Event::Empty(e) => {
                    let element = Self::make_element(&e, true)?;
                    Self::append(&mut stack, &mut nodes, Node::Element(element));
                }

                Event::Text(e) => {
                    let text = reader
                        .decoder()
                        .decode(e.as_ref())
                        .map_err(quick_xml::Error::from)?;
                    Self::append_text(&mut stack, &mut nodes, &text);
                }

                Event::GeneralRef(e) => {
                    let name = e.decode().map_err(quick_xml::Error::from)?;
                    match Self::resolve_reference(&name) {
                        Some(resolved) => Self::append_text(&mut stack, &mut nodes, &resolved),
                        None => {
                            let entity = format!("&{};", name);
                            Self::append(&mut stack, &mut nodes, Node::Markup(entity));
                        }
                    }
                }

                Event::CData(e) => {
                    let raw = format!("<![CDATA[{}]]>", String::from_utf8_lossy(e.as_ref()));
                    Self::append(&mut stack, &mut nodes, Node::Markup(raw));
                }

                Event::Comment(e) => {
                    let raw = format!("<!--{}-->", String::from_utf8_lossy(e.as_ref()));
                    Self::append(&mut stack, &mut nodes, Node::Markup(raw));
                }

                Event::PI(e) => {
                    let raw = format!("<?{}?>", String::from_utf8_lossy(e.as_ref()));
                    Self::append(&mut stack, &mut nodes, Node::Markup(raw));
                }

                Event::DocType(e) => {
                    let raw = format!("<!DOCTYPE {}>", String::from_utf8_lossy(e.as_ref()));
                    Self::append(&mut stack, &mut nodes, Node::Markup(raw));
                }

                Event::Decl(e) => {
                    let raw = Self::declaration(&e)?;
                    Self::append(&mut stack, &mut nodes, Node::Markup(raw));
                }
            }
        }

        if let Some(element) = stack.last() {
            return Err(BionicError::UnclosedElement {
                tag: element.tag_name(),
            });
        }

        let document = XmlDocument { nodes };
        if document.root().is_none() {
            return Err(BionicError::MissingRootElement);
        }

        Ok(document)
    }

    /// Parse XML from bytes, detecting UTF-8 and UTF-16 by their BOM
    pub fn parse_bytes(bytes: &[u8]) -> Result<XmlDocument, BionicError> {
        let content = bytes.decode()?;
        Self::parse(&content)
    }

    fn make_element(start: &BytesStart, self_closing: bool) -> Result<XmlElement, BionicError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
        let mut element = XmlElement::new(name);
        element.self_closing = self_closing;

        if let Some(prefix) = start.name().prefix() {
            element.prefix = Some(String::from_utf8_lossy(prefix.as_ref()).to_string());
        }

        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let attr_key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let attr_value = String::from_utf8_lossy(&attr.value).to_string();
            element.attributes.push((attr_key, attr_value));
        }

        Ok(element)
    }

    /// Resolves a general reference by name
    ///
    /// Covers the XML predefined entities, character references and the
    /// HTML5 named entities (`&rsquo;`, `&eacute;`, `&nbsp;`) that EPUB 2
    /// content declares through the XHTML DTD.
    fn resolve_reference(name: &str) -> Option<String> {
        match unescape(&format!("&{};", name)) {
            Ok(resolved) => Some(resolved.into_owned()),
            Err(_) => resolve_html5_entity(name).map(str::to_string),
        }
    }

    /// Rebuilds the XML declaration; the output is always UTF-8,
    /// so a declared encoding is rewritten to say so.
    fn declaration(decl: &BytesDecl) -> Result<String, BionicError> {
        let version = decl.version()?;
        let mut raw = format!("<?xml version=\"{}\"", String::from_utf8_lossy(&version));

        if decl.encoding().is_some() {
            raw.push_str(" encoding=\"utf-8\"");
        }
        if let Some(standalone) = decl.standalone() {
            let standalone = standalone.map_err(quick_xml::Error::from)?;
            raw.push_str(&format!(
                " standalone=\"{}\"",
                String::from_utf8_lossy(&standalone)
            ));
        }

        raw.push_str("?>");
        Ok(raw)
    }

    fn append(stack: &mut [XmlElement], nodes: &mut Vec<Node>, node: Node) {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => nodes.push(node),
        }
    }

    /// Appends character data, merging it into a preceding text node so
    /// that text split around references stays one node.
    fn append_text(stack: &mut [XmlElement], nodes: &mut Vec<Node>, text: &str) {
        if text.is_empty() {
            return;
        }

        let siblings = match stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => nodes,
        };
        match siblings.last_mut() {
            Some(Node::Text(previous)) => previous.push_str(text),
            _ => siblings.push(Node::Text(text.to_string())),
        }
    }
}
