use std::path::PathBuf;

use crate::splitter::SplitPolicy;

/// Media types whose manifest items are rewritten
pub const CONTENT_MEDIA_TYPES: &[&str] = &["application/xhtml+xml", "text/html"];

/// Represents a resource item declared in the EPUB manifest
///
/// The `ManifestItem` structure represents a single resource file declared in the EPUB
/// publication's manifest. Only the attributes needed to locate and classify a resource
/// are kept; fallback chains and other rendering hints have no effect on rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    /// The unique identifier for this resource item
    pub id: String,

    /// The name of the archive entry holding this resource
    ///
    /// The `href` of the manifest is resolved against the directory of the package
    /// document and percent-decoded, so this is the exact entry name in the zip file.
    pub path: String,

    /// The media type of this resource
    pub mime: String,

    /// Optional properties associated with this resource
    pub properties: Option<String>,
}

impl ManifestItem {
    /// Whether this item is an XHTML or HTML content document
    pub fn is_content_document(&self) -> bool {
        let mime = self.mime.trim();
        CONTENT_MEDIA_TYPES
            .iter()
            .any(|media_type| mime.eq_ignore_ascii_case(media_type))
    }
}

/// Represents an item in the EPUB spine, defining the reading order of the publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    /// The ID reference to a manifest item
    pub idref: String,

    /// Whether this item is part of the linear reading order
    ///
    /// Non-linear items are still content documents and are rewritten as well.
    pub linear: bool,
}

/// Represents encryption information for EPUB resources
///
/// As declared in the `META-INF/encryption.xml` file. Resources listed here are
/// copied into the output without being decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionData {
    /// The encryption algorithm URI
    pub method: String,

    /// The entry name of the encrypted resource, relative to the container root
    pub data: String,
}

/// Outcome of one successfully rewritten EPUB file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepackSummary {
    /// The EPUB that was read
    pub source: PathBuf,

    /// The EPUB that was written
    pub output: PathBuf,

    /// Number of content documents that received bold markup
    pub documents_rewritten: usize,

    /// Number of content documents copied unchanged because they are encrypted
    pub documents_untouched: usize,

    /// Number of words that received a bold prefix, over all documents
    pub words_bolded: usize,
}

/// Options shared by every file of a batch
///
/// ## Example
///
/// ```rust
/// use bionic_epub::{splitter::SplitPolicy, types::BionicOptions};
///
/// let mut options = BionicOptions::new();
/// options
///     .set_policy(SplitPolicy::Logarithmic)
///     .set_file_prefix("b_")
///     .set_overwrite(true);
///
/// assert_eq!(options.file_prefix.as_deref(), Some("b_"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BionicOptions {
    /// How much of each word is bolded
    pub policy: SplitPolicy,

    /// Prepended to the file name of every output, none by default
    pub file_prefix: Option<String>,

    /// Whether an existing output file is replaced
    pub overwrite: bool,
}

impl BionicOptions {
    /// Create options with the default split policy, no file prefix and no overwriting
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the split policy
    pub fn set_policy(&mut self, policy: SplitPolicy) -> &mut Self {
        self.policy = policy;

        self
    }

    /// Set the output file-name prefix
    ///
    /// An empty prefix is the same as no prefix.
    pub fn set_file_prefix(&mut self, prefix: &str) -> &mut Self {
        self.file_prefix = if prefix.is_empty() {
            None
        } else {
            Some(prefix.to_string())
        };

        self
    }

    /// Set whether existing outputs are replaced
    pub fn set_overwrite(&mut self, overwrite: bool) -> &mut Self {
        self.overwrite = overwrite;

        self
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        splitter::SplitPolicy,
        types::{BionicOptions, ManifestItem},
    };

    fn item(mime: &str) -> ManifestItem {
        ManifestItem {
            id: "ch1".to_string(),
            path: "OEBPS/ch1.xhtml".to_string(),
            mime: mime.to_string(),
            properties: None,
        }
    }

    #[test]
    fn test_content_document_media_types() {
        assert!(item("application/xhtml+xml").is_content_document());
        assert!(item("text/html").is_content_document());
        assert!(item(" Application/XHTML+XML ").is_content_document());
        assert!(!item("text/css").is_content_document());
        assert!(!item("application/x-dtbncx+xml").is_content_document());
    }

    #[test]
    fn test_options_defaults_and_setters() {
        let options = BionicOptions::new();
        assert_eq!(options.policy, SplitPolicy::Half);
        assert_eq!(options.file_prefix, None);
        assert!(!options.overwrite);

        let mut options = BionicOptions::new();
        options.set_file_prefix("b_").set_overwrite(true);
        assert_eq!(options.file_prefix.as_deref(), Some("b_"));
        assert!(options.overwrite);

        options.set_file_prefix("");
        assert_eq!(options.file_prefix, None);
    }
}
