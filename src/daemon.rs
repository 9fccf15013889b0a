//! Event loop of `supervised_flip_daemon`.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use flipmask_config::{ConfigManager, FlipConfig};
use flipmask_core::{ApprovalGate, GateOptions, GateOutcome, TransformOptions, exit_codes};
use tracing::{debug, error, info, trace, warn};

use crate::approval_watcher::ApprovalWatcher;
use crate::cli::DaemonArgs;
use crate::logging;

/// Exit status when the acknowledgement is invalid at startup or the
/// sandbox cannot be watched.
pub const EXIT_REFUSED: u8 = 2;

pub async fn run(args: DaemonArgs) -> Result<ExitCode> {
    let sandbox = match fs::canonicalize(&args.sandbox) {
        Ok(path) if path.is_dir() => path,
        Ok(path) => {
            eprintln!("Invalid sandbox path: {} is not a directory", path.display());
            return Ok(ExitCode::from(exit_codes::USAGE));
        }
        Err(err) => {
            eprintln!("Invalid sandbox path: {}: {err}", args.sandbox.display());
            return Ok(ExitCode::from(exit_codes::USAGE));
        }
    };

    let config = match ConfigManager::load(args.config.as_deref(), &sandbox) {
        Ok(manager) => manager.into_config(),
        Err(err) => {
            eprintln!("Error: {err:#}");
            return Ok(ExitCode::from(exit_codes::USAGE));
        }
    };
    logging::init_tracing(&config.debug)?;

    let gate = ApprovalGate::new(&sandbox, config.approval.token.clone(), gate_options(&config, args.dry))?;

    if let Err(err) = gate.acknowledgement().verify() {
        error!(error = %err, "acknowledgement check failed at startup");
        eprintln!(
            "[FATAL] acknowledgement missing/invalid in sandbox '{}'.\n\
             Place a file named '{}' whose contents (trimmed) are exactly:\n    {}",
            gate.sandbox().display(),
            config.approval.ack_file,
            gate.acknowledgement().token()
        );
        return Ok(ExitCode::from(EXIT_REFUSED));
    }

    info!(
        sandbox = %gate.sandbox().display(),
        global_dry = gate.global_dry_run(),
        "supervised_flip_daemon starting"
    );

    // Watch before scanning so a marker dropped during the scan is not lost.
    let mut watcher = match ApprovalWatcher::start(gate.sandbox()) {
        Ok(watcher) => watcher,
        Err(err) => {
            error!(error = %format!("{err:#}"), "cannot watch sandbox");
            return Ok(ExitCode::from(EXIT_REFUSED));
        }
    };

    let gate = Arc::new(gate);
    startup_scan(&gate).await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            batch = watcher.next_batch() => {
                let Some(batch) = batch else {
                    error!("file watcher stopped unexpectedly");
                    return Ok(ExitCode::from(EXIT_REFUSED));
                };
                for path in batch {
                    process_marker(&gate, path).await;
                }
            }
            _ = &mut shutdown => {
                info!("shutdown requested; exiting");
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn gate_options(config: &FlipConfig, cli_dry: bool) -> GateOptions {
    GateOptions {
        ack_file: config.approval.ack_file.clone(),
        marker_suffix: config.approval.marker_suffix.clone(),
        global_dry_run: cli_dry || config.approval.dry_run,
        transform: TransformOptions {
            chunk_size: config.transform.chunk_size,
            sync_output: config.transform.sync_output,
        },
    }
}

async fn startup_scan(gate: &Arc<ApprovalGate>) {
    let markers = match gate.scan_existing() {
        Ok(markers) => markers,
        Err(err) => {
            warn!(error = %err, "startup scan of sandbox failed");
            return;
        }
    };
    if !markers.is_empty() {
        info!(count = markers.len(), "processing approvals found at startup");
    }
    for marker in markers {
        process_marker(gate, marker).await;
    }
}

/// Run one marker through the gate on a blocking thread and wait for it.
async fn process_marker(gate: &Arc<ApprovalGate>, path: PathBuf) {
    let worker = Arc::clone(gate);
    match tokio::task::spawn_blocking(move || worker.process(&path)).await {
        Ok(outcome) => log_outcome(&outcome),
        Err(err) => error!(error = %err, "approval worker panicked"),
    }
}

fn log_outcome(outcome: &GateOutcome) {
    match outcome {
        GateOutcome::Completed {
            marker,
            marker_removed: false,
            ..
        } => warn!(marker = %marker.display(), "approval applied but marker is still present"),
        GateOutcome::Completed { .. } => {}
        GateOutcome::Ignored { path, reason } => {
            trace!(path = %path.display(), ?reason, "event ignored");
        }
        GateOutcome::Rejected { marker, .. }
        | GateOutcome::Failed { marker, .. }
        | GateOutcome::Busy { marker, .. } => {
            debug!(marker = %marker.display(), "approval left in place");
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!(error = %err, "cannot listen for SIGTERM; only Ctrl-C stops the daemon");
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(error = %err, "cannot listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
