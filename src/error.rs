//! Error Type Definition Module
//!
//! This module defines the errors that may be encountered while rewriting
//! an EPUB file. All errors are uniformly wrapped in the [BionicError]
//! enumeration, and [BionicError::kind] sorts them into the coarse
//! [ErrorKind] categories reported per file by the batch driver.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [BionicError]
///
/// The batch driver records one of these against every failed input, so
/// callers can tell a broken container apart from a broken chapter or a
/// filesystem problem without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source is not a readable EPUB container
    Archive,

    /// A content document could not be parsed into a tree
    Parse,

    /// Reading or writing on disk failed
    Filesystem,

    /// The batch was cancelled before this input was started
    Cancelled,
}

/// Types of errors that can occur while rewriting an EPUB file
#[derive(Debug, Error)]
pub enum BionicError {
    /// ZIP archive related errors
    ///
    /// Errors occur when the source is not a zip file at all,
    /// or when its central directory is corrupted.
    #[error("Archive error: {source}")]
    ArchiveError { source: zip::result::ZipError },

    /// The batch was cancelled before this input was processed.
    #[error("Cancelled: processing stopped before this file was started.")]
    Cancelled,

    /// Data Decoding Error - Null data
    ///
    /// This error occurs when trying to decode an empty stream.
    #[error("Decode error: The data is empty.")]
    EmptyDataError,

    /// The destination directory of a batch does not exist or is not a directory.
    #[error("Invalid destination: \"{}\" is not an existing directory.", path.display())]
    InvalidDestination { path: PathBuf },

    /// The `mimetype` entry does not hold `application/epub+zip`.
    #[error("Invalid mimetype: expected \"application/epub+zip\", found \"{found}\".")]
    InvalidMimetype { found: String },

    #[error("IO error: {source}")]
    IOError { source: std::io::Error },

    /// The container or package document could not be read as XML.
    #[error("Malformed package file: \"{file}\" could not be parsed: {reason}")]
    MalformedPackageFile { file: String, reason: String },

    /// A document has text but no root element.
    #[error("Malformed markup: the document has no root element.")]
    MissingRootElement,

    /// Missing required attribute error
    ///
    /// Triggered when an element of the container or package document lacks
    /// an attribute the EPUB specification requires.
    #[error(
        "Missing required attribute: The \"{attribute}\" attribute is a must attribute for the \"{tag}\" element."
    )]
    MissingRequiredAttribute { tag: String, attribute: String },

    /// Non-canonical EPUB structure error
    ///
    /// This error occurs when an EPUB file lacks some files
    /// that are required in EPUB specification.
    #[error("Non-canonical epub: The \"{expected_file}\" file was not found.")]
    NonCanonicalEpub { expected_file: String },

    /// Non-canonical file structure error
    ///
    /// This error is triggered when the required XML elements are missing
    /// from the container or package document.
    #[error("Non-canonical file: The \"{tag}\" elements was not found.")]
    NonCanonicalFile { tag: String },

    /// The output file already exists and overwriting is disabled.
    #[error("Output exists: \"{}\" already exists.", path.display())]
    OutputExists { path: PathBuf },

    /// A content document of the EPUB could not be parsed
    ///
    /// The whole input is skipped when any of its documents fails.
    #[error("Parse error: \"{document}\" could not be parsed: {reason}")]
    ParseError { document: String, reason: String },

    /// QuickXml error
    ///
    /// This error occurs when parsing or writing XML data using the QuickXml library.
    #[error("QuickXml error: {source}")]
    QuickXmlError { source: quick_xml::Error },

    /// Relative link leak error
    ///
    /// This error occurs when a manifest path points outside the EPUB container.
    #[error("Relative link leakage: Path \"{path}\" is out of container range.")]
    RelativeLinkLeakage { path: String },

    /// An element was opened but never closed before the end of the document.
    #[error("Malformed markup: the \"{tag}\" element is never closed.")]
    UnclosedElement { tag: String },

    /// Unusable compression method error
    ///
    /// This error occurs when an EPUB file uses a compression method
    /// other than Stored or Deflated.
    #[error(
        "Unusable compression method: The \"{file}\" file uses the unsupported \"{method}\" compression method."
    )]
    UnusableCompressionMethod { file: String, method: String },

    /// UTF-8 decoding error
    #[error("Decode error: {source}")]
    Utf8DecodeError { source: std::string::FromUtf8Error },

    /// UTF-16 decoding error
    #[error("Decode error: {source}")]
    Utf16DecodeError { source: std::string::FromUtf16Error },
}

impl BionicError {
    /// Returns the coarse category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArchiveError { .. }
            | Self::InvalidMimetype { .. }
            | Self::MalformedPackageFile { .. }
            | Self::MissingRequiredAttribute { .. }
            | Self::NonCanonicalEpub { .. }
            | Self::NonCanonicalFile { .. }
            | Self::RelativeLinkLeakage { .. }
            | Self::UnusableCompressionMethod { .. } => ErrorKind::Archive,

            Self::EmptyDataError
            | Self::MissingRootElement
            | Self::ParseError { .. }
            | Self::QuickXmlError { .. }
            | Self::UnclosedElement { .. }
            | Self::Utf8DecodeError { .. }
            | Self::Utf16DecodeError { .. } => ErrorKind::Parse,

            Self::InvalidDestination { .. } | Self::IOError { .. } | Self::OutputExists { .. } => {
                ErrorKind::Filesystem
            }

            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<zip::result::ZipError> for BionicError {
    fn from(value: zip::result::ZipError) -> Self {
        match value {
            zip::result::ZipError::Io(source) => BionicError::IOError { source },
            source => BionicError::ArchiveError { source },
        }
    }
}

impl From<quick_xml::Error> for BionicError {
    fn from(value: quick_xml::Error) -> Self {
        BionicError::QuickXmlError { source: value }
    }
}

impl From<std::io::Error> for BionicError {
    fn from(value: std::io::Error) -> Self {
        BionicError::IOError { source: value }
    }
}

impl From<std::string::FromUtf8Error> for BionicError {
    fn from(value: std::string::FromUtf8Error) -> Self {
        BionicError::Utf8DecodeError { source: value }
    }
}

impl From<std::string::FromUtf16Error> for BionicError {
    fn from(value: std::string::FromUtf16Error) -> Self {
        BionicError::Utf16DecodeError { source: value }
    }
}

#[cfg(test)]
impl PartialEq for BionicError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::MissingRequiredAttribute {
                    tag: l_tag,
                    attribute: l_attribute,
                },
                Self::MissingRequiredAttribute {
                    tag: r_tag,
                    attribute: r_attribute,
                },
            ) => l_tag == r_tag && l_attribute == r_attribute,
            (
                Self::NonCanonicalEpub {
                    expected_file: l_expected_file,
                },
                Self::NonCanonicalEpub {
                    expected_file: r_expected_file,
                },
            ) => l_expected_file == r_expected_file,
            (Self::NonCanonicalFile { tag: l_tag }, Self::NonCanonicalFile { tag: r_tag }) => {
                l_tag == r_tag
            }
            (
                Self::RelativeLinkLeakage { path: l_path },
                Self::RelativeLinkLeakage { path: r_path },
            ) => l_path == r_path,
            (Self::UnclosedElement { tag: l_tag }, Self::UnclosedElement { tag: r_tag }) => {
                l_tag == r_tag
            }
            (
                Self::InvalidMimetype { found: l_found },
                Self::InvalidMimetype { found: r_found },
            ) => l_found == r_found,
            (
                Self::InvalidDestination { path: l_path },
                Self::InvalidDestination { path: r_path },
            ) => l_path == r_path,
            (Self::OutputExists { path: l_path }, Self::OutputExists { path: r_path }) => {
                l_path == r_path
            }
            (
                Self::Utf8DecodeError { source: l_source },
                Self::Utf8DecodeError { source: r_source },
            ) => l_source == r_source,

            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::error::{BionicError, ErrorKind};

    #[test]
    fn test_kind_classification() {
        let err = BionicError::NonCanonicalEpub {
            expected_file: "META-INF/container.xml".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Archive);

        let err = BionicError::ParseError {
            document: "OEBPS/ch1.xhtml".to_string(),
            reason: "boom".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Parse);

        let err = BionicError::InvalidDestination {
            path: PathBuf::from("/nowhere"),
        };
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert_eq!(BionicError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_zip_io_error_is_filesystem() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = BionicError::from(zip::result::ZipError::Io(io));
        assert_eq!(err.kind(), ErrorKind::Filesystem);

        let err = BionicError::from(zip::result::ZipError::FileNotFound);
        assert_eq!(err.kind(), ErrorKind::Archive);
    }

    #[test]
    fn test_error_messages() {
        let err = BionicError::InvalidMimetype {
            found: "text/plain".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid mimetype: expected \"application/epub+zip\", found \"text/plain\"."
        );
    }
}
