//! EPUB Repackager
//!
//! Reads one EPUB, runs the [MarkupInjector] over each of its content
//! documents and writes a new EPUB into a destination directory.
//!
//! The new archive follows the OCF layout rules: a fresh, uncompressed
//! `mimetype` entry comes first, then every other entry of the source in its
//! original order. Entries that are not rewritten are copied as raw
//! compressed data, so their bytes and compression method are unchanged.
//!
//! ## Usage
//!
//! ```rust, ignore
//! # use bionic_epub::{repackager::Repackager, types::BionicOptions};
//! # fn main() -> Result<(), bionic_epub::error::BionicError> {
//! let repackager = Repackager::new(BionicOptions::new());
//! let summary = repackager.repackage("books/novel.epub", "out")?;
//!
//! println!("{} words bolded", summary.words_bolded);
//! # Ok(())
//! # }
//! ```

use std::{
    collections::HashMap,
    ffi::OsString,
    fs::{self, File},
    io::{self, BufReader, Read, Seek, Write},
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use tempfile::{Builder, NamedTempFile};
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::{
    error::BionicError,
    injector::MarkupInjector,
    package::{EPUB_MIMETYPE, EpubPackage, MIMETYPE_ENTRY},
    types::{BionicOptions, RepackSummary},
    utils::{DecodeBytes, get_file_in_zip_archive},
};

/// Content documents rewritten in memory, keyed by entry name
struct RewrittenDocuments {
    documents: HashMap<String, Vec<u8>>,
    untouched: usize,
    words: usize,
}

/// Rewrites EPUB files one at a time
#[derive(Debug, Clone)]
pub struct Repackager {
    options: BionicOptions,
    injector: MarkupInjector,
}

impl Repackager {
    pub fn new(options: BionicOptions) -> Self {
        let injector = MarkupInjector::new(options.policy);
        Self { options, injector }
    }

    pub fn options(&self) -> &BionicOptions {
        &self.options
    }

    /// Returns where the output for `source` is written inside `dest_dir`
    ///
    /// The output keeps the file name of the source, with the configured
    /// prefix in front of it.
    ///
    /// ## Return
    /// - `Ok(PathBuf)`: The output path
    /// - `Err(BionicError)`: The source path has no file name
    pub fn output_path<P: AsRef<Path>, D: AsRef<Path>>(
        &self,
        source: P,
        dest_dir: D,
    ) -> Result<PathBuf, BionicError> {
        let file_name = source.as_ref().file_name().ok_or_else(|| {
            BionicError::from(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("\"{}\" has no file name", source.as_ref().display()),
            ))
        })?;

        let mut name = OsString::from(self.options.file_prefix.as_deref().unwrap_or_default());
        name.push(file_name);

        Ok(dest_dir.as_ref().join(name))
    }

    /// Writes the rewritten copy of `source` into `dest_dir`
    ///
    /// Every content document is parsed and rewritten before anything is
    /// written, so a document that fails to parse fails the whole file and
    /// no output is produced. The archive is assembled in a temporary file
    /// in `dest_dir` and moved onto the final name once it is complete.
    ///
    /// ## Parameters
    /// - `source`: The EPUB to read, never modified
    /// - `dest_dir`: An existing directory receiving the output
    ///
    /// ## Return
    /// - `Ok(RepackSummary)`: The file was written
    /// - `Err(BionicError)`: An archive, parse or filesystem error; see [BionicError::kind]
    pub fn repackage<P: AsRef<Path>, D: AsRef<Path>>(
        &self,
        source: P,
        dest_dir: D,
    ) -> Result<RepackSummary, BionicError> {
        let source = source.as_ref();
        let dest_dir = dest_dir.as_ref();
        let output = self.output_path(source, dest_dir)?;

        if output.exists() && (!self.options.overwrite || is_same_file(source, &output)) {
            return Err(BionicError::OutputExists { path: output });
        }

        let file = File::open(source)?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|err| BionicError::ArchiveError { source: err })?;
        let package = EpubPackage::from_archive(&mut archive)?;

        let rewritten = self.rewrite_documents(&mut archive, &package)?;
        let documents_rewritten = rewritten.documents.len();

        let temp = Builder::new()
            .prefix(".bionic-")
            .suffix(".part")
            .tempfile_in(dest_dir)?;
        let temp = Self::write_archive(&mut archive, rewritten.documents, temp)?;
        self.persist(temp, &output)?;

        info!(
            "Wrote \"{}\": {} documents rewritten, {} untouched, {} words",
            output.display(),
            documents_rewritten,
            rewritten.untouched,
            rewritten.words
        );

        Ok(RepackSummary {
            source: source.to_path_buf(),
            output,
            documents_rewritten,
            documents_untouched: rewritten.untouched,
            words_bolded: rewritten.words,
        })
    }

    fn rewrite_documents<R: Read + Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        package: &EpubPackage,
    ) -> Result<RewrittenDocuments, BionicError> {
        let mut rewritten = RewrittenDocuments {
            documents: HashMap::new(),
            untouched: 0,
            words: 0,
        };

        for item in package.content_documents() {
            if archive.index_for_name(&item.path).is_none() {
                warn!(
                    "Manifest item \"{}\" points at missing entry \"{}\", skipping",
                    item.id, item.path
                );
                continue;
            }

            if package.is_encrypted(&item.path) {
                warn!("\"{}\" is encrypted, copying it unchanged", item.path);
                rewritten.untouched += 1;
                continue;
            }

            let bytes = get_file_in_zip_archive(archive, &item.path)?;
            let (content, words) = bytes
                .decode()
                .and_then(|content| self.injector.transform(&content))
                .map_err(|err| BionicError::ParseError {
                    document: item.path.clone(),
                    reason: err.to_string(),
                })?;

            debug!("Rewrote \"{}\": {} words", item.path, words);
            rewritten.words += words;
            rewritten.documents.insert(item.path.clone(), content);
        }

        Ok(rewritten)
    }

    /// Assembles the new archive into `temp`
    ///
    /// On failure `temp` is dropped, which removes it from disk.
    fn write_archive<R: Read + Seek>(
        archive: &mut ZipArchive<R>,
        mut documents: HashMap<String, Vec<u8>>,
        temp: NamedTempFile,
    ) -> Result<NamedTempFile, BionicError> {
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut zip = ZipWriter::new(temp);

        // mimetype must be first and uncompressed
        zip.start_file(MIMETYPE_ENTRY, stored)?;
        zip.write_all(EPUB_MIMETYPE.as_bytes())?;

        for index in 0..archive.len() {
            let entry = archive.by_index_raw(index)?;
            if entry.name() == MIMETYPE_ENTRY {
                continue;
            }

            match documents.remove(entry.name()) {
                Some(content) => {
                    zip.start_file(entry.name(), deflated)?;
                    zip.write_all(&content)?;
                }
                None => zip.raw_copy_file(entry)?,
            }
        }

        Ok(zip.finish()?)
    }

    fn persist(&self, temp: NamedTempFile, output: &Path) -> Result<(), BionicError> {
        let result = if self.options.overwrite {
            temp.persist(output)
        } else {
            temp.persist_noclobber(output)
        };

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let kind = err.error.kind();
                if let Err(cleanup) = err.file.close() {
                    warn!("Failed to remove temporary file: {}", cleanup);
                }

                if kind == io::ErrorKind::AlreadyExists {
                    Err(BionicError::OutputExists {
                        path: output.to_path_buf(),
                    })
                } else {
                    Err(BionicError::from(err.error))
                }
            }
        }
    }
}

fn is_same_file(source: &Path, output: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(output)) {
        (Ok(source), Ok(output)) => source == output,
        _ => false,
    }
}
