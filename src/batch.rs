//! Batch driver
//!
//! Runs the [Repackager] over a list of EPUB files, one after the other, and
//! returns one [FileReport] per input in input order. A failing file never
//! stops the batch; only an unusable destination directory does, and it is
//! checked before any file is touched.
//!
//! ## Usage
//!
//! ```rust, ignore
//! # use bionic_epub::{batch::process_batch, types::BionicOptions};
//! # fn main() -> Result<(), bionic_epub::error::BionicError> {
//! let inputs = vec!["a.epub".into(), "b.epub".into()];
//! for report in process_batch(&inputs, "out", &BionicOptions::new())? {
//!     match report.outcome {
//!         Ok(summary) => println!("ok {}", summary.output.display()),
//!         Err(err) => println!("FAILED {}: {}", report.input.display(), err),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{info, warn};

use crate::{
    error::BionicError,
    repackager::Repackager,
    types::{BionicOptions, RepackSummary},
};

/// A shared flag asking a running batch to stop
///
/// Clones share the same flag, so one clone can be handed to a signal
/// handler or another thread while the driver holds the other.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The result of one input of a batch
#[derive(Debug)]
pub struct FileReport {
    /// The input path, as given to the driver
    pub input: PathBuf,

    /// The summary of the written file, or why no file was written
    pub outcome: Result<RepackSummary, BionicError>,
}

impl FileReport {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Progress hooks called by [BatchDriver::run_with_observer]
///
/// `index` is the position of the input in the batch, `total` the number of
/// inputs. Both hooks do nothing by default.
pub trait BatchObserver {
    fn file_started(&mut self, _index: usize, _total: usize, _input: &Path) {}

    fn file_finished(&mut self, _index: usize, _total: usize, _report: &FileReport) {}
}

/// Observer that ignores every event
struct SilentObserver;

impl BatchObserver for SilentObserver {}

/// Processes a list of EPUB files with the same options
#[derive(Debug, Clone)]
pub struct BatchDriver {
    repackager: Repackager,
    cancellation: CancellationToken,
}

impl BatchDriver {
    pub fn new(options: BionicOptions) -> Self {
        Self {
            repackager: Repackager::new(options),
            cancellation: CancellationToken::new(),
        }
    }

    /// Use `token` to stop the batch from outside
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// A clone of the token this driver checks before each file
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Processes every input, see [BatchDriver::run_with_observer]
    pub fn run<D: AsRef<Path>>(
        &self,
        inputs: &[PathBuf],
        dest_dir: D,
    ) -> Result<Vec<FileReport>, BionicError> {
        self.run_with_observer(inputs, dest_dir, &mut SilentObserver)
    }

    /// Processes every input in order, reporting progress to `observer`
    ///
    /// Once the cancellation token is set, no further file is started and every
    /// remaining input is reported as [BionicError::Cancelled].
    ///
    /// ## Return
    /// - `Ok(Vec<FileReport>)`: Exactly one report per input, in input order
    /// - `Err(BionicError)`: `dest_dir` is not an existing directory; nothing was processed
    pub fn run_with_observer<D: AsRef<Path>>(
        &self,
        inputs: &[PathBuf],
        dest_dir: D,
        observer: &mut dyn BatchObserver,
    ) -> Result<Vec<FileReport>, BionicError> {
        let dest_dir = dest_dir.as_ref();
        if !dest_dir.is_dir() {
            return Err(BionicError::InvalidDestination {
                path: dest_dir.to_path_buf(),
            });
        }

        let total = inputs.len();
        info!(
            "Processing {} files into \"{}\" with the {} policy",
            total,
            dest_dir.display(),
            self.repackager.options().policy
        );

        let mut reports = Vec::with_capacity(total);
        for (index, input) in inputs.iter().enumerate() {
            if self.cancellation.is_cancelled() {
                reports.push(FileReport {
                    input: input.clone(),
                    outcome: Err(BionicError::Cancelled),
                });
                continue;
            }

            observer.file_started(index, total, input);
            info!("[{}/{}] {}", index + 1, total, input.display());

            let outcome = self.repackager.repackage(input, dest_dir);
            if let Err(err) = &outcome {
                warn!("Failed to process \"{}\": {}", input.display(), err);
            }

            let report = FileReport {
                input: input.clone(),
                outcome,
            };
            observer.file_finished(index, total, &report);
            reports.push(report);
        }

        if self.cancellation.is_cancelled() {
            info!("Batch cancelled");
        }

        Ok(reports)
    }
}

/// Processes `inputs` into `dest_dir` with `options`
///
/// A shorthand for [BatchDriver::run] without cancellation or progress hooks.
pub fn process_batch<D: AsRef<Path>>(
    inputs: &[PathBuf],
    dest_dir: D,
    options: &BionicOptions,
) -> Result<Vec<FileReport>, BionicError> {
    BatchDriver::new(options.clone()).run(inputs, dest_dir)
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::{Path, PathBuf},
    };

    use tempfile::TempDir;
    use zip::CompressionMethod;

    use crate::{
        batch::{BatchDriver, BatchObserver, CancellationToken, FileReport, process_batch},
        error::{BionicError, ErrorKind},
        types::BionicOptions,
        utils::fixtures::EpubFixture,
    };

    const OPF: &str = r#"<package><manifest><item id="c" href="c.xhtml" media-type="application/xhtml+xml"/></manifest><spine><itemref idref="c"/></spine></package>"#;

    fn write_epub(dir: &TempDir, name: &str) -> PathBuf {
        let bytes = EpubFixture::new("content.opf", OPF)
            .entry(
                "c.xhtml",
                b"<html><body><p>hi  there</p></body></html>",
                CompressionMethod::Deflated,
            )
            .build();
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    fn write_text(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "this is not an archive").unwrap();
        path
    }

    #[derive(Default)]
    struct Recorder {
        started: Vec<usize>,
        finished: Vec<(usize, bool)>,
        cancel_after_first: Option<CancellationToken>,
    }

    impl BatchObserver for Recorder {
        fn file_started(&mut self, index: usize, total: usize, _input: &Path) {
            assert!(index < total);
            self.started.push(index);
        }

        fn file_finished(&mut self, index: usize, _total: usize, report: &FileReport) {
            self.finished.push((index, report.is_ok()));
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
        }
    }

    #[test]
    fn test_reports_follow_input_order() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let inputs = vec![
            write_epub(&src, "one.epub"),
            write_text(&src, "notes.epub"),
            src.path().join("missing.epub"),
            write_epub(&src, "two.epub"),
        ];

        let reports = process_batch(&inputs, dest.path(), &BionicOptions::new()).unwrap();

        assert_eq!(reports.len(), 4);
        for (report, input) in reports.iter().zip(&inputs) {
            assert_eq!(&report.input, input);
        }

        assert!(reports[0].is_ok());
        assert_eq!(
            reports[1].outcome.as_ref().unwrap_err().kind(),
            ErrorKind::Archive
        );
        assert_eq!(
            reports[2].outcome.as_ref().unwrap_err().kind(),
            ErrorKind::Filesystem
        );
        assert!(reports[3].is_ok());

        assert!(dest.path().join("one.epub").is_file());
        assert!(dest.path().join("two.epub").is_file());
        assert!(!dest.path().join("notes.epub").exists());

        let summary = reports[3].outcome.as_ref().unwrap();
        assert_eq!(summary.words_bolded, 2);
    }

    #[test]
    fn test_invalid_destination_fails_fast() {
        let src = TempDir::new().unwrap();
        let inputs = vec![write_epub(&src, "one.epub")];
        let dest = src.path().join("does-not-exist");

        let err = process_batch(&inputs, &dest, &BionicOptions::new()).unwrap_err();
        assert_eq!(err, BionicError::InvalidDestination { path: dest.clone() });
        assert!(!dest.exists());

        let err = process_batch(&inputs, &inputs[0], &BionicOptions::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn test_empty_batch() {
        let dest = TempDir::new().unwrap();
        let reports = process_batch(&[], dest.path(), &BionicOptions::new()).unwrap();
        assert!(reports.is_empty());
    }

    #[test]
    fn test_cancelled_before_start() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let inputs = vec![write_epub(&src, "one.epub"), write_epub(&src, "two.epub")];

        let token = CancellationToken::new();
        let driver = BatchDriver::new(BionicOptions::new()).with_cancellation(token.clone());
        token.cancel();
        assert!(driver.cancellation_token().is_cancelled());

        let reports = driver.run(&inputs, dest.path()).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(
            reports
                .iter()
                .all(|report| matches!(report.outcome, Err(BionicError::Cancelled)))
        );
        assert!(fs::read_dir(dest.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_cancel_while_running() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let inputs = vec![
            write_epub(&src, "one.epub"),
            write_epub(&src, "two.epub"),
            write_epub(&src, "three.epub"),
        ];

        let driver = BatchDriver::new(BionicOptions::new());
        let mut recorder = Recorder {
            cancel_after_first: Some(driver.cancellation_token()),
            ..Default::default()
        };

        let reports = driver
            .run_with_observer(&inputs, dest.path(), &mut recorder)
            .unwrap();

        assert_eq!(reports.len(), 3);
        assert!(reports[0].is_ok());
        assert_eq!(
            reports[1].outcome.as_ref().unwrap_err().kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(
            reports[2].outcome.as_ref().unwrap_err().kind(),
            ErrorKind::Cancelled
        );
        assert_eq!(recorder.started, vec![0]);
        assert_eq!(recorder.finished, vec![(0, true)]);
    }

    #[test]
    fn test_observer_sees_every_file() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let inputs = vec![write_epub(&src, "one.epub"), write_text(&src, "bad.epub")];

        let mut recorder = Recorder::default();
        BatchDriver::new(BionicOptions::new())
            .run_with_observer(&inputs, dest.path(), &mut recorder)
            .unwrap();

        assert_eq!(recorder.started, vec![0, 1]);
        assert_eq!(recorder.finished, vec![(0, true), (1, false)]);
    }
}
