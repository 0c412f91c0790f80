//! EPUB package reader
//!
//! Reads the parts of an EPUB container needed to find its content documents:
//! the `mimetype` entry, `META-INF/container.xml`, the package document (OPF)
//! it points at and, when present, `META-INF/encryption.xml`.
//!
//! The archive is borrowed rather than owned, so the repackager can go on
//! reading raw entries from the same [ZipArchive] afterwards.

use std::io::{Read, Seek};

use indexmap::IndexMap;
use log::{debug, warn};
use zip::ZipArchive;

use crate::{
    dom::{XmlDocument, XmlElement, XmlReader},
    error::BionicError,
    types::{EncryptionData, ManifestItem, SpineItem},
    utils::{compression_method_check, get_file_in_zip_archive, parent_dir, resolve_href},
};

pub const MIMETYPE_ENTRY: &str = "mimetype";
pub const EPUB_MIMETYPE: &str = "application/epub+zip";
pub const CONTAINER_ENTRY: &str = "META-INF/container.xml";
pub const ENCRYPTION_ENTRY: &str = "META-INF/encryption.xml";

/// The package information of one EPUB file
///
/// Holds the manifest, the spine and the encryption declarations of the
/// publication. Metadata, navigation and fallback chains are not read since
/// they play no part in rewriting content documents.
#[derive(Debug, Clone)]
pub struct EpubPackage {
    /// The entry name of the package document
    pub package_path: String,

    /// The directory holding the package document, `""` for the container root
    pub base_path: String,

    /// Manifest items keyed by id, in declaration order
    pub manifest: IndexMap<String, ManifestItem>,

    /// Reading order of the publication
    pub spine: Vec<SpineItem>,

    /// Resources declared in `META-INF/encryption.xml`
    pub encryption: Vec<EncryptionData>,
}

impl EpubPackage {
    /// Reads the package information from an opened archive
    ///
    /// ## Parameters
    /// - `archive`: The EPUB container
    ///
    /// ## Return
    /// - `Ok(EpubPackage)`: The parsed package information
    /// - `Err(BionicError)`: An archive-kind error when the container does not
    ///   follow the OCF rules or its package files cannot be read
    pub fn from_archive<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Self, BionicError> {
        // 1. Only Stored and Deflated entries are allowed in an EPUB
        // 2. The `mimetype` entry identifies the container
        // 3. `META-INF/container.xml` gives the location of the OPF file
        // 4. The OPF file gives the manifest and the spine
        // 5. `META-INF/encryption.xml` lists the resources that cannot be read

        compression_method_check(archive)?;
        Self::check_mimetype(archive)?;

        let container = Self::read_package_file(archive, CONTAINER_ENTRY)?;
        let package_path = Self::parse_container(&container)?;
        let base_path = parent_dir(&package_path).to_string();

        let package = Self::read_package_file(archive, &package_path)?;
        let root = Self::root_of(&package, &package_path)?;

        let manifest_element = root.find_elements_by_name("manifest").next().ok_or_else(|| {
            BionicError::NonCanonicalFile {
                tag: "manifest".to_string(),
            }
        })?;
        let spine_element = root.find_elements_by_name("spine").next().ok_or_else(|| {
            BionicError::NonCanonicalFile {
                tag: "spine".to_string(),
            }
        })?;

        let manifest = Self::parse_manifest(manifest_element, &base_path)?;
        let spine = Self::parse_spine(spine_element)?;

        let encryption = if archive.index_for_name(ENCRYPTION_ENTRY).is_some() {
            let document = Self::read_package_file(archive, ENCRYPTION_ENTRY)?;
            Self::parse_encryption(Self::root_of(&document, ENCRYPTION_ENTRY)?)?
        } else {
            Vec::new()
        };

        debug!(
            "Package \"{}\": {} manifest items, {} spine items, {} encrypted resources",
            package_path,
            manifest.len(),
            spine.len(),
            encryption.len()
        );

        Ok(Self {
            package_path,
            base_path,
            manifest,
            spine,
            encryption,
        })
    }

    /// Returns the content documents of the publication
    ///
    /// Spine items come first, in reading order; content documents that are
    /// declared in the manifest but not referenced by the spine follow in
    /// declaration order. Each archive entry appears once, even when several
    /// manifest items point at it.
    pub fn content_documents(&self) -> Vec<&ManifestItem> {
        let mut documents = Vec::<&ManifestItem>::new();

        for item in &self.spine {
            match self.manifest.get(&item.idref) {
                Some(resource) if resource.is_content_document() => {
                    if !documents.iter().any(|doc| doc.path == resource.path) {
                        documents.push(resource);
                    }
                }
                Some(_) => {}
                None => warn!(
                    "Spine item \"{}\" does not reference a manifest item",
                    item.idref
                ),
            }
        }

        for resource in self.manifest.values() {
            if resource.is_content_document()
                && !documents.iter().any(|doc| doc.path == resource.path)
            {
                documents.push(resource);
            }
        }

        documents
    }

    /// Whether the entry is declared as encrypted
    pub fn is_encrypted(&self, path: &str) -> bool {
        self.encryption.iter().any(|data| data.data == path)
    }

    fn check_mimetype<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<(), BionicError> {
        let mimetype = get_file_in_zip_archive(archive, MIMETYPE_ENTRY)?;
        let found = String::from_utf8_lossy(&mimetype);
        let found = found.trim_matches(|c: char| c.is_ascii_whitespace());

        if found != EPUB_MIMETYPE {
            return Err(BionicError::InvalidMimetype {
                found: found.to_string(),
            });
        }

        Ok(())
    }

    /// Reads and parses one of the package files
    ///
    /// Decoding and tree-building failures are reported as
    /// [BionicError::MalformedPackageFile] so that they count as archive errors.
    fn read_package_file<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        file_name: &str,
    ) -> Result<XmlDocument, BionicError> {
        let bytes = get_file_in_zip_archive(archive, file_name)?;

        XmlReader::parse_bytes(&bytes).map_err(|err| BionicError::MalformedPackageFile {
            file: file_name.to_string(),
            reason: err.to_string(),
        })
    }

    fn root_of<'a>(
        document: &'a XmlDocument,
        file_name: &str,
    ) -> Result<&'a XmlElement, BionicError> {
        document
            .root()
            .ok_or_else(|| BionicError::MalformedPackageFile {
                file: file_name.to_string(),
                reason: BionicError::MissingRootElement.to_string(),
            })
    }

    /// Parse the EPUB container file (META-INF/container.xml)
    ///
    /// According to the EPUB specification the container must hold at least
    /// one `rootfile` element pointing to the OPF file. When multiple
    /// `rootfile` elements exist, the first one is used.
    ///
    /// ## Return
    /// - `Ok(String)`: The entry name of the OPF file
    /// - `Err(BionicError)`: No `rootfile` element, or one without `full-path`
    fn parse_container(container: &XmlDocument) -> Result<String, BionicError> {
        let root = Self::root_of(container, CONTAINER_ENTRY)?;
        let rootfile = root
            .find_elements_by_name("rootfile")
            .next()
            .ok_or_else(|| BionicError::NonCanonicalFile {
                tag: "rootfile".to_string(),
            })?;

        let full_path =
            rootfile
                .get_attr("full-path")
                .ok_or_else(|| BionicError::MissingRequiredAttribute {
                    tag: "rootfile".to_string(),
                    attribute: "full-path".to_string(),
                })?;

        resolve_href("", &full_path)
    }

    /// Parse the `<manifest>` element of the OPF file
    ///
    /// Hrefs are resolved against `base_path`; an href that leaves the container
    /// fails the whole package with [BionicError::RelativeLinkLeakage].
    fn parse_manifest(
        manifest_element: &XmlElement,
        base_path: &str,
    ) -> Result<IndexMap<String, ManifestItem>, BionicError> {
        let estimated_items = manifest_element.children().count();
        let mut resources = IndexMap::with_capacity(estimated_items);

        for element in manifest_element.find_children_by_name("item") {
            let id = Self::required_attr(element, "id")?;
            let href = Self::required_attr(element, "href")?;
            let mime = Self::required_attr(element, "media-type")?;
            let properties = element.get_attr("properties");

            if resources.contains_key(&id) {
                warn!("Duplicate manifest id \"{}\", keeping the first item", id);
                continue;
            }

            resources.insert(
                id.clone(),
                ManifestItem {
                    id,
                    path: resolve_href(base_path, &href)?,
                    mime,
                    properties,
                },
            );
        }

        Ok(resources)
    }

    /// Parse the `<spine>` element of the OPF file
    fn parse_spine(spine_element: &XmlElement) -> Result<Vec<SpineItem>, BionicError> {
        let mut spine = Vec::new();
        for element in spine_element.find_children_by_name("itemref") {
            let idref = Self::required_attr(element, "idref")?;
            let linear = element
                .get_attr("linear")
                .map(|linear| linear != "no")
                .unwrap_or(true);

            spine.push(SpineItem { idref, linear });
        }

        Ok(spine)
    }

    /// Parse the EPUB encryption file (META-INF/encryption.xml)
    ///
    /// Only the algorithm and the `CipherReference` URI of each
    /// `EncryptedData` element are read; keys are never needed since
    /// encrypted resources are copied as they are.
    fn parse_encryption(root: &XmlElement) -> Result<Vec<EncryptionData>, BionicError> {
        let mut encryption_data = Vec::new();
        for data in root.find_children_by_name("EncryptedData") {
            let method = data
                .find_elements_by_name("EncryptionMethod")
                .next()
                .and_then(|method| method.get_attr("Algorithm"))
                .unwrap_or_default();
            let reference = data
                .find_elements_by_name("CipherReference")
                .next()
                .ok_or_else(|| BionicError::NonCanonicalFile {
                    tag: "CipherReference".to_string(),
                })?;
            let uri = Self::required_attr(reference, "URI")?;

            encryption_data.push(EncryptionData {
                method,
                data: resolve_href("", &uri)?,
            });
        }

        Ok(encryption_data)
    }

    fn required_attr(element: &XmlElement, attribute: &str) -> Result<String, BionicError> {
        element
            .get_attr(attribute)
            .ok_or_else(|| BionicError::MissingRequiredAttribute {
                tag: element.tag_name(),
                attribute: attribute.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zip::{CompressionMethod, ZipArchive};

    use crate::{
        error::{BionicError, ErrorKind},
        package::EpubPackage,
        utils::fixtures::{EpubFixture, container_xml},
    };

    fn open(bytes: Vec<u8>) -> Result<EpubPackage, BionicError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        EpubPackage::from_archive(&mut archive)
    }

    const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:1</dc:identifier>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="css" href="style/main.css" media-type="text/css"/>
    <item id="ch2" href="text/ch%202.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="old" href="legacy.html" media-type="text/html"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2" linear="no"/>
    <itemref idref="ch1"/>
    <itemref idref="missing"/>
  </spine>
</package>"#;

    #[test]
    fn test_parse_package() {
        let bytes = EpubFixture::new("OEBPS/content.opf", OPF).build();
        let package = open(bytes).unwrap();

        assert_eq!(package.package_path, "OEBPS/content.opf");
        assert_eq!(package.base_path, "OEBPS");
        assert_eq!(package.manifest.len(), 5);
        assert_eq!(package.manifest["ch2"].path, "OEBPS/text/ch 2.xhtml");
        assert_eq!(package.manifest["nav"].properties.as_deref(), Some("nav"));
        assert_eq!(package.spine.len(), 4);
        assert!(!package.spine[1].linear);
        assert!(package.encryption.is_empty());
    }

    #[test]
    fn test_content_documents_order() {
        let bytes = EpubFixture::new("OEBPS/content.opf", OPF).build();
        let package = open(bytes).unwrap();

        let ids = package
            .content_documents()
            .iter()
            .map(|item| item.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["ch1", "ch2", "nav", "old"]);
    }

    #[test]
    fn test_content_documents_unique_by_path() {
        let opf = r#"<package><manifest><item id="a" href="text/a.xhtml" media-type="application/xhtml+xml"/><item id="alias" href="text/./a.xhtml" media-type="application/xhtml+xml"/></manifest><spine><itemref idref="alias"/><itemref idref="a"/></spine></package>"#;
        let package = open(EpubFixture::new("content.opf", opf).build()).unwrap();

        let documents = package.content_documents();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].id, "alias");
        assert_eq!(documents[0].path, "text/a.xhtml");
    }

    #[test]
    fn test_package_at_container_root() {
        let opf = r#"<package><manifest><item id="a" href="a.xhtml" media-type="application/xhtml+xml"/></manifest><spine><itemref idref="a"/></spine></package>"#;
        let package = open(EpubFixture::new("content.opf", opf).build()).unwrap();
        assert_eq!(package.base_path, "");
        assert_eq!(package.manifest["a"].path, "a.xhtml");
    }

    #[test]
    fn test_missing_mimetype() {
        let bytes = EpubFixture::new("content.opf", OPF).without_mimetype().build();
        let err = open(bytes).unwrap_err();
        assert_eq!(
            err,
            BionicError::NonCanonicalEpub {
                expected_file: "mimetype".to_string()
            }
        );
        assert_eq!(err.kind(), ErrorKind::Archive);
    }

    #[test]
    fn test_invalid_mimetype() {
        let bytes = EpubFixture::new("content.opf", OPF)
            .mimetype("application/zip")
            .build();
        assert_eq!(
            open(bytes).unwrap_err(),
            BionicError::InvalidMimetype {
                found: "application/zip".to_string()
            }
        );

        let bytes = EpubFixture::new("content.opf", OPF)
            .mimetype("application/epub+zip\n")
            .build();
        assert!(open(bytes).is_ok());
    }

    #[test]
    fn test_missing_container_and_package() {
        let bytes = EpubFixture::new("content.opf", OPF)
            .without_container()
            .build();
        assert_eq!(
            open(bytes).unwrap_err(),
            BionicError::NonCanonicalEpub {
                expected_file: "META-INF/container.xml".to_string()
            }
        );

        let bytes = EpubFixture::new("content.opf", OPF)
            .container(&container_xml("OEBPS/other.opf"))
            .build();
        assert_eq!(
            open(bytes).unwrap_err(),
            BionicError::NonCanonicalEpub {
                expected_file: "OEBPS/other.opf".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_container() {
        let bytes = EpubFixture::new("content.opf", OPF)
            .container("<container><rootfiles>")
            .build();
        let err = open(bytes).unwrap_err();
        assert!(matches!(
            err,
            BionicError::MalformedPackageFile { ref file, .. } if file == "META-INF/container.xml"
        ));
        assert_eq!(err.kind(), ErrorKind::Archive);

        let bytes = EpubFixture::new("content.opf", OPF)
            .container("<container><rootfiles><rootfile/></rootfiles></container>")
            .build();
        assert_eq!(
            open(bytes).unwrap_err(),
            BionicError::MissingRequiredAttribute {
                tag: "rootfile".to_string(),
                attribute: "full-path".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_package_document() {
        let bytes = EpubFixture::new("content.opf", "<package><manifest></package>").build();
        let err = open(bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Archive);

        let bytes = EpubFixture::new("content.opf", "<package><spine/></package>").build();
        assert_eq!(
            open(bytes).unwrap_err(),
            BionicError::NonCanonicalFile {
                tag: "manifest".to_string()
            }
        );
    }

    #[test]
    fn test_href_leaving_container() {
        let opf = r#"<package><manifest><item id="a" href="../../a.xhtml" media-type="application/xhtml+xml"/></manifest><spine/></package>"#;
        let err = open(EpubFixture::new("OEBPS/content.opf", opf).build()).unwrap_err();
        assert_eq!(
            err,
            BionicError::RelativeLinkLeakage {
                path: "../../a.xhtml".to_string()
            }
        );
        assert_eq!(err.kind(), ErrorKind::Archive);
    }

    #[test]
    fn test_parse_encryption() {
        let encryption = r#"<?xml version="1.0"?>
<encryption xmlns="urn:oasis:names:tc:opendocument:xmlns:container" xmlns:enc="http://www.w3.org/2001/04/xmlenc#">
  <enc:EncryptedData>
    <enc:EncryptionMethod Algorithm="http://www.idpf.org/2008/embedding"/>
    <enc:CipherData><enc:CipherReference URI="OEBPS/text/ch1.xhtml"/></enc:CipherData>
  </enc:EncryptedData>
</encryption>"#;
        let bytes = EpubFixture::new("OEBPS/content.opf", OPF)
            .entry(
                "META-INF/encryption.xml",
                encryption.as_bytes(),
                CompressionMethod::Deflated,
            )
            .build();
        let package = open(bytes).unwrap();

        assert_eq!(package.encryption.len(), 1);
        assert_eq!(
            package.encryption[0].method,
            "http://www.idpf.org/2008/embedding"
        );
        assert!(package.is_encrypted("OEBPS/text/ch1.xhtml"));
        assert!(!package.is_encrypted("OEBPS/text/ch 2.xhtml"));
    }
}
