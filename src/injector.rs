//! Markup Injector
//!
//! Walks a content document and wraps the leading part of every word in a
//! `<b>` element. Each text node under `<body>` is rewritten on its own, in
//! place among its siblings, so existing inline elements (emphasis, links,
//! spans) keep their structure and only gain bold children.
//!
//! ## Usage
//!
//! ```rust
//! # fn main() -> Result<(), bionic_epub::error::BionicError> {
//! use bionic_epub::{injector::MarkupInjector, splitter::SplitPolicy};
//!
//! let injector = MarkupInjector::new(SplitPolicy::Half);
//! let (output, words) = injector.transform(
//!     "<html><body><p>hi  <i>there</i></p></body></html>",
//! )?;
//!
//! assert_eq!(words, 2);
//! assert_eq!(
//!     String::from_utf8(output).unwrap(),
//!     "<html><body><p><b>h</b>i  <i><b>the</b>re</i></p></body></html>",
//! );
//! # Ok(())
//! # }
//! ```

use log::trace;

use crate::{
    dom::{Node, XmlDocument, XmlElement, XmlReader},
    error::BionicError,
    splitter::{Segment, SplitPolicy, segments},
};

/// Local name of the injected element
const BOLD_TAG: &str = "b";

/// Elements whose text is never rewritten
///
/// Script and style content is not visible text, `svg` and `math` hold
/// foreign markup where an XHTML element is not allowed, and text that is
/// already bold gains nothing.
const SKIPPED_ELEMENTS: &[&str] = &[
    "head", "title", "script", "style", "svg", "math", "b", "strong",
];

/// Rewrites text nodes of a document tree into bolded fragments
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupInjector {
    policy: SplitPolicy,
}

impl MarkupInjector {
    /// Creates an injector splitting words with the given policy
    pub fn new(policy: SplitPolicy) -> Self {
        Self { policy }
    }

    /// The split policy in use
    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    /// Parses `content`, bolds every word under its body and serializes it back
    ///
    /// ## Return
    /// - `Ok((Vec<u8>, usize))`: The rewritten document and the number of bolded words
    /// - `Err(BionicError)`: The content could not be parsed into a tree
    pub fn transform(&self, content: &str) -> Result<(Vec<u8>, usize), BionicError> {
        let mut document = XmlReader::parse(content)?;
        let words = self.inject(&mut document);

        Ok((document.to_bytes()?, words))
    }

    /// Bolds every word reachable under the `body` element of the document
    ///
    /// A document without a body is left unchanged.
    ///
    /// ## Return
    /// The number of words that received a bold prefix
    pub fn inject(&self, document: &mut XmlDocument) -> usize {
        match document.root_mut() {
            Some(root) => self.visit(root),
            None => 0,
        }
    }

    /// Converts a text run into plain and bold nodes
    ///
    /// Whitespace is kept exactly; the plain suffix of a word and the
    /// whitespace after it share one text node. `bold_prefix` is the
    /// namespace prefix given to the injected elements.
    ///
    /// ## Return
    /// The replacement nodes and the number of bolded words
    pub fn bolden(&self, text: &str, bold_prefix: Option<&str>) -> (Vec<Node>, usize) {
        let mut nodes = Vec::new();
        let mut plain = String::new();
        let mut words = 0;

        for segment in segments(text, self.policy) {
            match segment {
                Segment::Space(space) => plain.push_str(space),
                Segment::Word(word) => {
                    if !word.prefix().is_empty() {
                        if !plain.is_empty() {
                            nodes.push(Node::Text(std::mem::take(&mut plain)));
                        }

                        let mut bold = XmlElement::new(BOLD_TAG);
                        bold.prefix = bold_prefix.map(str::to_string);
                        bold.children.push(Node::Text(word.prefix().to_string()));
                        nodes.push(Node::Element(bold));
                        words += 1;
                    }
                    plain.push_str(word.suffix());
                }
            }
        }

        if !plain.is_empty() {
            nodes.push(Node::Text(plain));
        }

        (nodes, words)
    }

    fn visit(&self, element: &mut XmlElement) -> usize {
        if is_skipped(element) {
            return 0;
        }

        if element.name.eq_ignore_ascii_case("body") {
            let prefix = element.prefix.clone();
            let words = self.rewrite(&mut element.children, prefix.as_deref());
            trace!("Bolded {} words under <{}>", words, element.tag_name());
            return words;
        }

        element
            .children
            .iter_mut()
            .map(|child| match child {
                Node::Element(child) => self.visit(child),
                _ => 0,
            })
            .sum()
    }

    fn rewrite(&self, children: &mut Vec<Node>, bold_prefix: Option<&str>) -> usize {
        let mut words = 0;
        let mut rewritten = Vec::with_capacity(children.len());

        for child in std::mem::take(children) {
            match child {
                Node::Text(text) => {
                    let (nodes, count) = self.bolden(&text, bold_prefix);
                    rewritten.extend(nodes);
                    words += count;
                }
                Node::Element(mut element) => {
                    if !is_skipped(&element) {
                        words += self.rewrite(&mut element.children, bold_prefix);
                    }
                    rewritten.push(Node::Element(element));
                }
                markup => rewritten.push(markup),
            }
        }

        *children = rewritten;
        words
    }
}

fn is_skipped(element: &XmlElement) -> bool {
    SKIPPED_ELEMENTS
        .iter()
        .any(|name| element.name.eq_ignore_ascii_case(name))
}
