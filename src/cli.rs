//! Command-line surfaces of `flipcfg` and `supervised_flip_daemon`.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use flipmask_config::ConfigManager;
use flipmask_core::{
    MaskSpec, TransformEngine, TransformJob, TransformOptions, TransformReport, exit_codes,
};

use crate::logging;

pub const SAFETY_WARNING: &str =
    "WARNING: operate only on files you own. A backup will be created: <infile>.bak";

/// XOR every byte of a file with a mask, keeping the original as `<infile>.bak`.
#[derive(Debug, Clone, Parser)]
#[command(name = "flipcfg", version, about, long_about = None)]
pub struct FlipArgs {
    /// File to transform in place
    pub infile: PathBuf,

    /// `mask` (numeric literal, e.g. 0x0F) or `bits` (comma-separated bit indices 0-7)
    pub mode: String,

    /// Mask literal or bit list
    #[arg(allow_hyphen_values = true)]
    pub param: String,

    /// Scan and count only; the file is left unchanged
    #[arg(long)]
    pub dry: bool,

    /// Configuration file (defaults to ./.flipmask.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Watch a sandbox for `<target>.approve` markers and apply them.
#[derive(Debug, Clone, Parser)]
#[command(name = "supervised_flip_daemon", version, about, long_about = None)]
pub struct DaemonArgs {
    /// Directory to watch; every transformed file must live inside it
    pub sandbox: PathBuf,

    /// Force every approval to run as a dry run
    #[arg(long)]
    pub dry: bool,

    /// Configuration file (defaults to <sandbox>/.flipmask.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Parse the process arguments. Help and version requests exit 0, any other
/// argument error exits 1.
pub fn parse_or_exit<T: Parser>() -> Result<T, ExitCode> {
    T::try_parse().map_err(|err| match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{err}");
            ExitCode::SUCCESS
        }
        _ => {
            eprint!("{err}");
            ExitCode::from(exit_codes::USAGE)
        }
    })
}

/// Run `flipcfg`. The returned code is the process exit status; `Err` is
/// reserved for configuration and setup problems.
pub fn handle_flip_command(args: &FlipArgs) -> Result<ExitCode> {
    eprintln!("{SAFETY_WARNING}");

    let mask = match MaskSpec::parse(&args.mode, &args.param) {
        Ok(mask) => mask,
        Err(err) => {
            eprintln!("{err}");
            return Ok(ExitCode::from(exit_codes::BAD_PARAM));
        }
    };

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let manager = ConfigManager::load(args.config.as_deref(), &cwd)?;
    logging::init_env_tracing()?;

    let transform = &manager.config().transform;
    let engine = TransformEngine::new(TransformOptions {
        chunk_size: transform.chunk_size,
        sync_output: transform.sync_output,
    });

    match engine.run(&TransformJob::new(&args.infile, mask, args.dry)) {
        Ok(report) => {
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::from(err.exit_code()))
        }
    }
}

fn print_report(report: &TransformReport) {
    if report.dry_run {
        println!("DRY RUN: bytes scanned: {}", report.scanned);
        println!("DRY RUN: bytes that would change: {}", report.changed);
        if let Some(reason) = &report.restore_failure {
            eprintln!("Warning: failed to restore original file name from backup: {reason}");
        }
    } else {
        println!("Completed. Backup saved as: {}", report.backup.display());
        println!(
            "Bytes processed: {}; Bytes changed: {}",
            report.scanned, report.changed
        );
    }
}
