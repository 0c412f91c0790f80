use std::io::{Read, Seek};

use percent_encoding::percent_decode_str;
use zip::{CompressionMethod, ZipArchive};

use crate::error::BionicError;

/// Extracts the contents of a specified file from a ZIP archive
///
/// This function reads the raw byte data of a specified file from an EPUB file (which
/// is essentially a ZIP archive). It is used for the container file, the package
/// document, the encryption declaration and every content document.
///
/// ## Parameters
/// - `zip_file`: A mutable reference to a ZIP archive object
/// - `file_name`: The path to the file to extract (relative to the ZIP archive root directory)
///
/// ## Return
/// - `Ok(Vec<u8>)`: Returns a byte vector containing the file data
/// - `Err(BionicError)`: The file does not exist or its data could not be read back;
///   both are archive errors
///
/// ## Notes
/// - The returned data is raw bytes; for text files, further decoding using
///   the `DecodeBytes` trait is usually required.
pub fn get_file_in_zip_archive<R: Read + Seek>(
    zip_file: &mut ZipArchive<R>,
    file_name: &str,
) -> Result<Vec<u8>, BionicError> {
    let mut buffer = Vec::<u8>::new();
    match zip_file.by_name(file_name) {
        Ok(mut file) => {
            // corrupt deflate data and CRC mismatches surface as io errors
            let _ = file
                .read_to_end(&mut buffer)
                .map_err(|err| BionicError::ArchiveError {
                    source: zip::result::ZipError::Io(err),
                })?;
            Ok(buffer)
        }
        Err(zip::result::ZipError::FileNotFound) => Err(BionicError::NonCanonicalEpub {
            expected_file: file_name.to_string(),
        }),
        Err(err) => Err(BionicError::from(err)),
    }
}

/// Checks if the compression method of all entries in the EPUB file
/// conforms to the specification requirements.
///
/// According to the OCF (Open Container Format) specification, EPUB files
/// can only use either Stored (uncompressed) or Deflated (deflate compression).
/// If any other compression method is found, an error will be returned.
///
/// ## Parameters
/// - `zip_archive`: The ZIP archive to check.
///
/// ## Return
/// - `Ok(())`: All files use the supported compression method
/// - `Err(BionicError)`: Unsupported compression method found
pub fn compression_method_check<R: Read + Seek>(
    zip_archive: &mut ZipArchive<R>,
) -> Result<(), BionicError> {
    for index in 0..zip_archive.len() {
        let file = zip_archive.by_index_raw(index)?;

        match file.compression() {
            CompressionMethod::Stored | CompressionMethod::Deflated => continue,
            _ => {
                return Err(BionicError::UnusableCompressionMethod {
                    file: file.name().to_string(),
                    method: file.compression().to_string(),
                });
            }
        };
    }

    Ok(())
}

/// Resolves a manifest href against the directory of the package document
///
/// Hrefs in the package document are URLs relative to the OPF file. This
/// function percent-decodes the href, drops any fragment, and folds `.` and
/// `..` segments so that the result is the name of an entry in the archive.
///
/// ## Parameters
/// - `base_dir`: The directory holding the package document, `""` for the root
/// - `href`: The href as written in the manifest
///
/// ## Return
/// - `Ok(String)`: The normalized entry name, always `/`-separated
/// - `Err(BionicError)`: The href climbs above the container root
pub fn resolve_href(base_dir: &str, href: &str) -> Result<String, BionicError> {
    let href = href.split('#').next().unwrap_or_default();
    let decoded = percent_decode_str(href).decode_utf8_lossy();

    let (mut segments, relative) = match decoded.strip_prefix('/') {
        Some(absolute) => (Vec::new(), absolute),
        None => (
            base_dir
                .split('/')
                .filter(|segment| !segment.is_empty())
                .collect::<Vec<_>>(),
            &*decoded,
        ),
    };

    for segment in relative.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                // failed to navigate up,
                // which means we're trying to escape the root directory
                if segments.pop().is_none() {
                    return Err(BionicError::RelativeLinkLeakage {
                        path: href.to_string(),
                    });
                }
            }
            segment => segments.push(segment),
        }
    }

    Ok(segments.join("/"))
}

/// Returns the directory part of an entry name, `""` for top-level entries
pub fn parent_dir(entry: &str) -> &str {
    entry.rsplit_once('/').map(|(dir, _)| dir).unwrap_or_default()
}

/// Provides functionality for decoding byte data into strings
///
/// This trait is primarily used to decode raw byte data (such as
/// text files read from EPUB files) into a suitable string representation.
/// It supports automatic detection and decoding of multiple encoding formats,
/// including UTF-8 (with or without BOM), UTF-16 BE, and UTF-16 LE.
///
/// ## Notes
/// - When attempting to parse a byte stream lacking a BOM (Byte Order Mark), the parsing
///   results may be unreadable; caution should be exercised when using such streams.
pub trait DecodeBytes {
    fn decode(&self) -> Result<String, BionicError>;
}

impl DecodeBytes for Vec<u8> {
    fn decode(&self) -> Result<String, BionicError> {
        self.as_slice().decode()
    }
}

impl DecodeBytes for [u8] {
    fn decode(&self) -> Result<String, BionicError> {
        if self.is_empty() || self.len() < 4 {
            return Err(BionicError::EmptyDataError);
        }

        match self[0..3] {
            // Check UTF-8 BOM (0xEF, 0xBB, 0xBF)
            [0xEF, 0xBB, 0xBF, ..] => {
                String::from_utf8(self[3..].to_vec()).map_err(BionicError::from)
            }

            // Check UTF-16 BE BOM (0xFE, 0xFF)
            [0xFE, 0xFF, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_be_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(BionicError::from)
            }

            // Check UTF-16 LE BOM (0xFF, 0xFE)
            [0xFF, 0xFE, ..] => {
                let utf16_units: Vec<u16> = self[2..]
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect();

                String::from_utf16(&utf16_units).map_err(BionicError::from)
            }

            // Content documents without a BOM are UTF-8 by the EPUB rules
            _ => String::from_utf8(self.to_vec()).map_err(BionicError::from),
        }
    }
}
