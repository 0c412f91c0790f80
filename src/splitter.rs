//! Word Splitter
//!
//! Decides how much of each word is rendered in bold. A text run is cut into
//! whitespace-delimited tokens ([Segment::Word]) and the whitespace between
//! them ([Segment::Space]); concatenating the segments in order always gives
//! back the input exactly.
//!
//! ## Usage
//!
//! ```rust
//! use bionic_epub::splitter::{Segment, SplitPolicy, segments};
//!
//! let words = segments("hi  there", SplitPolicy::Half)
//!     .filter_map(|segment| match segment {
//!         Segment::Word(word) => Some((word.prefix(), word.suffix())),
//!         Segment::Space(_) => None,
//!     })
//!     .collect::<Vec<_>>();
//!
//! assert_eq!(words, vec![("h", "i"), ("the", "re")]);
//! ```

use std::{fmt::Display, str::FromStr};

/// The rule deciding the split point of a word
///
/// Lengths are counted in Unicode scalar values, not bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SplitPolicy {
    /// Bold the first half of the word, rounded up
    ///
    /// Words of one character are bolded entirely.
    #[default]
    Half,

    /// Bold `ceil(log2(length))` characters of words longer than three
    /// characters, and only the first character of shorter words
    Logarithmic,
}

impl SplitPolicy {
    /// Returns the number of leading characters to bold in a word of `length` characters
    ///
    /// The result is always within `0..=length`.
    pub fn split_point(&self, length: usize) -> usize {
        match self {
            SplitPolicy::Half if length <= 1 => length,
            SplitPolicy::Half => length.div_ceil(2),

            SplitPolicy::Logarithmic => match length {
                0 => 0,
                1..=3 => 1,
                _ => (usize::BITS - (length - 1).leading_zeros()) as usize,
            },
        }
    }
}

impl FromStr for SplitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "half" => Ok(SplitPolicy::Half),
            "log" | "logarithmic" => Ok(SplitPolicy::Logarithmic),
            other => Err(format!(
                "unknown split policy \"{other}\", expected \"half\" or \"log\""
            )),
        }
    }
}

impl Display for SplitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SplitPolicy::Half => write!(f, "half"),
            SplitPolicy::Logarithmic => write!(f, "log"),
        }
    }
}

/// A maximal run of non-whitespace characters together with its split point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Word<'a> {
    text: &'a str,

    /// Byte offset of the split inside `text`
    split_byte: usize,

    /// Split point counted in characters
    split: usize,
}

impl<'a> Word<'a> {
    /// Creates a word and computes its split point with the given policy
    pub fn new(text: &'a str, policy: SplitPolicy) -> Self {
        let split = policy.split_point(text.chars().count());
        let split_byte = text
            .char_indices()
            .nth(split)
            .map(|(index, _)| index)
            .unwrap_or(text.len());

        Self {
            text,
            split_byte,
            split,
        }
    }

    /// The full text of the word
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The split point, in characters
    pub fn split_point(&self) -> usize {
        self.split
    }

    /// The part of the word to render in bold
    pub fn prefix(&self) -> &'a str {
        &self.text[..self.split_byte]
    }

    /// The part of the word left as plain text
    pub fn suffix(&self) -> &'a str {
        &self.text[self.split_byte..]
    }
}

/// A piece of a text run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// A run of whitespace, kept verbatim
    Space(&'a str),

    /// A word
    Word(Word<'a>),
}

/// Iterator over the segments of a text run, see [segments]
pub struct Segments<'a> {
    rest: &'a str,
    policy: SplitPolicy,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let is_space = first.is_whitespace();

        let end = self
            .rest
            .find(|c: char| c.is_whitespace() != is_space)
            .unwrap_or(self.rest.len());
        let (current, rest) = self.rest.split_at(end);
        self.rest = rest;

        if is_space {
            Some(Segment::Space(current))
        } else {
            Some(Segment::Word(Word::new(current, self.policy)))
        }
    }
}

/// Cuts a text run into alternating words and whitespace runs
pub fn segments(text: &str, policy: SplitPolicy) -> Segments<'_> {
    Segments { rest: text, policy }
}
