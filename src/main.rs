//! bionic-epub - bold the leading part of every word in EPUB files

use std::{collections::HashSet, fs, path::PathBuf, process::ExitCode};

use bionic_epub::{
    batch::{BatchDriver, BatchObserver, FileReport},
    error::BionicError,
    splitter::SplitPolicy,
    types::BionicOptions,
};
use clap::{ArgAction, Parser};
use log::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "bionic-epub")]
#[command(version, about = "Rewrite EPUB files for bionic reading", long_about = None)]
#[command(after_help = "EXAMPLES:
    bionic-epub -d out book.epub             Rewrite one book into out/
    bionic-epub -d out --prefix b_ library/  Rewrite every EPUB under library/")]
struct Cli {
    /// Directory receiving the rewritten files, created if missing
    #[arg(short, long, value_name = "DIR")]
    dest: PathBuf,

    /// EPUB files, or directories searched recursively for EPUB files
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// How much of each word is bolded: "half" or "log"
    #[arg(long, default_value_t = SplitPolicy::Half)]
    policy: SplitPolicy,

    /// Prefix added to the file name of every output
    #[arg(long, value_name = "TEXT")]
    prefix: Option<String>,

    /// Replace output files that already exist
    #[arg(long)]
    overwrite: bool,

    /// Only print failures
    #[arg(short, long)]
    quiet: bool,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Prints one line per finished file
struct ConsoleReporter {
    quiet: bool,
}

impl BatchObserver for ConsoleReporter {
    fn file_finished(&mut self, index: usize, total: usize, report: &FileReport) {
        match &report.outcome {
            Ok(summary) if !self.quiet => println!(
                "[{}/{}] ok      {} -> {} ({} words)",
                index + 1,
                total,
                report.input.display(),
                summary.output.display(),
                summary.words_bolded
            ),
            Ok(_) => {}
            Err(err) => eprintln!(
                "[{}/{}] FAILED  {}: {}",
                index + 1,
                total,
                report.input.display(),
                err
            ),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let inputs = collect_inputs(&cli.inputs);
    if inputs.is_empty() {
        eprintln!("error: no EPUB files found in the given inputs");
        return ExitCode::from(2);
    }

    if let Err(err) = fs::create_dir_all(&cli.dest) {
        eprintln!(
            "error: cannot create destination \"{}\": {err}",
            cli.dest.display()
        );
        return ExitCode::from(2);
    }

    let mut options = BionicOptions::new();
    options
        .set_policy(cli.policy)
        .set_file_prefix(cli.prefix.as_deref().unwrap_or_default())
        .set_overwrite(cli.overwrite);

    let driver = BatchDriver::new(options);
    let token = driver.cancellation_token();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("Received Ctrl+C; finishing the current file");
        token.cancel();
    }) {
        warn!("Failed to install Ctrl+C signal handler: {err}");
    }

    let mut reporter = ConsoleReporter { quiet: cli.quiet };
    let reports = match driver.run_with_observer(&inputs, &cli.dest, &mut reporter) {
        Ok(reports) => reports,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    // cancelled inputs were never started, so the reporter has not seen them
    for report in &reports {
        if let Err(err @ BionicError::Cancelled) = &report.outcome {
            eprintln!("FAILED  {}: {}", report.input.display(), err);
        }
    }

    let failed = reports.iter().filter(|report| !report.is_ok()).count();
    if !cli.quiet {
        println!(
            "{} of {} files rewritten into {}",
            reports.len() - failed,
            reports.len(),
            cli.dest.display()
        );
    }

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Expands directories into the EPUB files they contain
///
/// Files found in a directory are sorted by path; a path given twice is
/// kept only at its first position.
fn collect_inputs(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut collected = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).sort_by_file_name() {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!("Skipping unreadable path: {err}");
                        continue;
                    }
                };

                let is_epub = entry
                    .path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"));
                if entry.file_type().is_file() && is_epub && seen.insert(entry.path().to_path_buf())
                {
                    collected.push(entry.into_path());
                }
            }
        } else if seen.insert(input.clone()) {
            collected.push(input.clone());
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use clap::{CommandFactory, Parser};
    use tempfile::TempDir;

    use bionic_epub::splitter::SplitPolicy;

    use crate::{Cli, collect_inputs};

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse() {
        let cli = Cli::try_parse_from([
            "bionic-epub",
            "-d",
            "out",
            "--policy",
            "log",
            "--prefix",
            "b_",
            "-vv",
            "a.epub",
            "b.epub",
        ])
        .unwrap();

        assert_eq!(cli.dest, PathBuf::from("out"));
        assert_eq!(cli.inputs.len(), 2);
        assert_eq!(cli.policy, SplitPolicy::Logarithmic);
        assert_eq!(cli.prefix.as_deref(), Some("b_"));
        assert_eq!(cli.verbose, 2);
        assert!(!cli.overwrite);

        assert!(Cli::try_parse_from(["bionic-epub", "a.epub"]).is_err());
        assert!(Cli::try_parse_from(["bionic-epub", "-d", "out"]).is_err());
        assert!(
            Cli::try_parse_from(["bionic-epub", "-d", "out", "--policy", "third", "a.epub"])
                .is_err()
        );
    }

    #[test]
    fn test_collect_inputs_walks_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        for name in ["b.epub", "a.EPUB", "notes.txt", "nested/c.epub"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let single = dir.path().join("b.epub");
        let collected = collect_inputs(&[single.clone(), dir.path().to_path_buf()]);

        assert_eq!(
            collected,
            vec![
                single,
                dir.path().join("a.EPUB"),
                dir.path().join("nested/c.epub"),
            ]
        );
    }

    #[test]
    fn test_collect_inputs_keeps_missing_files() {
        let missing = PathBuf::from("/definitely/missing.epub");
        let collected = collect_inputs(&[missing.clone(), missing.clone()]);
        assert_eq!(collected, vec![missing]);
    }
}
