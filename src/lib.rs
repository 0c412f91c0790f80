//! Bionic EPUB
//!
//! A Rust library for rewriting EPUB eBook files for bionic reading.
//!
//! Bionic reading renders the leading part of every word in bold, so the eye
//! can anchor on it. This library reads an EPUB, wraps the leading part of
//! every word in its content documents in a `<b>` element and writes a new
//! EPUB next to the untouched resources of the original.
//!
//! ## Features
//!
//! - Whitespace-exact rewriting of XHTML text; markup, attributes, comments
//!   and foreign content are kept as they were.
//! - OCF-conforming output: `mimetype` first and uncompressed, every other
//!   entry copied byte for byte unless it is rewritten.
//! - Batch processing with per-file results, cancellation and progress hooks.
//! - Optional command-line tool via the `cli` feature.
//!
//! ## Quick Start
//!
//! ```rust, ignore
//! # use bionic_epub::{batch::process_batch, types::BionicOptions};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut options = BionicOptions::new();
//! options.set_file_prefix("b_");
//!
//! let inputs = vec!["path/to/book.epub".into()];
//! for report in process_batch(&inputs, "path/to/output", &options)? {
//!     println!("{}: {:?}", report.input.display(), report.outcome);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! - `cli` (default): Builds the `bionic-epub` binary. Library users can turn it
//!   off with `default-features = false` to skip the command-line dependencies.

pub(crate) mod utils;

pub mod batch;
pub mod dom;
pub mod error;
pub mod injector;
pub mod package;
pub mod repackager;
pub mod splitter;
pub mod types;

pub use batch::{BatchDriver, BatchObserver, CancellationToken, FileReport, process_batch};
pub use error::{BionicError, ErrorKind};
pub use repackager::Repackager;
pub use splitter::SplitPolicy;
pub use types::{BionicOptions, RepackSummary};
pub use utils::DecodeBytes;
