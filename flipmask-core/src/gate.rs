//! Approval gate.
//!
//! Each marker `<target><suffix>` inside the sandbox moves through
//! acknowledgement check, parse, containment check and execution. Only a
//! successful transform removes the marker; every rejection or failure
//! leaves it in place for the operator.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flipmask_commons::{SandboxError, canonicalize_root, resolve_prospective_within, resolve_within};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::ack::{AckError, Acknowledgement};
use crate::approval::{ApprovalError, ApprovalRequest};
use crate::engine::{
    TransformEngine, TransformJob, TransformOptions, TransformReport, backup_path_for,
};
use crate::error::TransformError;

pub const DEFAULT_ACK_FILE: &str = "acknowledge.txt";
pub const DEFAULT_MARKER_SUFFIX: &str = ".approve";

/// Gate construction options. The acknowledgement token is passed to
/// [`ApprovalGate::new`] separately.
#[derive(Debug, Clone)]
pub struct GateOptions {
    pub ack_file: String,
    pub marker_suffix: String,
    /// OR-ed with each marker's own `dry` line.
    pub global_dry_run: bool,
    pub transform: TransformOptions,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            ack_file: DEFAULT_ACK_FILE.to_string(),
            marker_suffix: DEFAULT_MARKER_SUFFIX.to_string(),
            global_dry_run: false,
            transform: TransformOptions::default(),
        }
    }
}

/// Why an approval was refused before the engine ran.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error(transparent)]
    Unacknowledged(#[from] AckError),

    #[error("invalid approval: {0}")]
    InvalidApproval(#[from] ApprovalError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Why a path was not treated as an approval at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NotAMarker,
    MalformedName,
    Vanished,
    NotRegularFile,
}

#[derive(Debug)]
pub enum GateOutcome {
    Completed {
        marker: PathBuf,
        report: TransformReport,
        marker_removed: bool,
    },
    Rejected {
        marker: PathBuf,
        reason: Rejection,
    },
    Failed {
        marker: PathBuf,
        error: TransformError,
    },
    /// Another approval for the same target is still running.
    Busy { marker: PathBuf, target: PathBuf },
    Ignored { path: PathBuf, reason: IgnoreReason },
}

impl GateOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// How a file name relates to the marker suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerName<'a> {
    /// `<target><suffix>` with a non-empty target.
    Marker(&'a str),
    /// Mentions the suffix but does not end with it.
    Malformed,
    NotAMarker,
}

pub struct ApprovalGate {
    sandbox: PathBuf,
    ack: Acknowledgement,
    marker_suffix: String,
    global_dry_run: bool,
    engine: TransformEngine,
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl ApprovalGate {
    pub fn new(
        sandbox_root: &Path,
        ack_token: impl Into<String>,
        options: GateOptions,
    ) -> Result<Self, SandboxError> {
        let sandbox = canonicalize_root(sandbox_root)?;
        let ack = Acknowledgement::new(sandbox.join(&options.ack_file), ack_token);
        Ok(Self {
            sandbox,
            ack,
            marker_suffix: options.marker_suffix,
            global_dry_run: options.global_dry_run,
            engine: TransformEngine::new(options.transform),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Canonical sandbox root.
    pub fn sandbox(&self) -> &Path {
        &self.sandbox
    }

    pub fn acknowledgement(&self) -> &Acknowledgement {
        &self.ack
    }

    pub fn global_dry_run(&self) -> bool {
        self.global_dry_run
    }

    pub fn classify<'a>(&self, file_name: &'a str) -> MarkerName<'a> {
        match file_name.strip_suffix(self.marker_suffix.as_str()) {
            Some(target) if !target.is_empty() => MarkerName::Marker(target),
            _ if file_name.contains(self.marker_suffix.as_str()) => MarkerName::Malformed,
            _ => MarkerName::NotAMarker,
        }
    }

    /// Markers already present in the sandbox, sorted by name. Only regular
    /// files are returned; symlinks are not followed.
    pub fn scan_existing(&self) -> io::Result<Vec<PathBuf>> {
        let mut markers = Vec::new();
        for entry in fs::read_dir(&self.sandbox)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(name) = name.to_str()
                && matches!(self.classify(name), MarkerName::Marker(_))
            {
                markers.push(entry.path());
            }
        }
        markers.sort();
        Ok(markers)
    }

    /// Drive one marker through the gate. Only the file name of `marker` is
    /// used; it is always re-anchored at the sandbox root.
    pub fn process(&self, marker: &Path) -> GateOutcome {
        let Some(name) = marker.file_name().and_then(|name| name.to_str()) else {
            return GateOutcome::Ignored {
                path: marker.to_path_buf(),
                reason: IgnoreReason::NotAMarker,
            };
        };

        let target_name = match self.classify(name) {
            MarkerName::Marker(target) => target,
            MarkerName::Malformed => {
                warn!(name, "malformed approval filename");
                return GateOutcome::Ignored {
                    path: marker.to_path_buf(),
                    reason: IgnoreReason::MalformedName,
                };
            }
            MarkerName::NotAMarker => {
                return GateOutcome::Ignored {
                    path: marker.to_path_buf(),
                    reason: IgnoreReason::NotAMarker,
                };
            }
        };

        let marker = self.sandbox.join(name);
        match fs::symlink_metadata(&marker) {
            Ok(meta) if meta.file_type().is_file() => {}
            Ok(_) => {
                warn!(marker = %marker.display(), "approval marker is not a regular file");
                return GateOutcome::Ignored {
                    path: marker,
                    reason: IgnoreReason::NotRegularFile,
                };
            }
            Err(err) => {
                debug!(marker = %marker.display(), error = %err, "approval marker no longer present");
                return GateOutcome::Ignored {
                    path: marker,
                    reason: IgnoreReason::Vanished,
                };
            }
        }

        if let Err(err) = self.ack.verify() {
            warn!(
                marker = %marker.display(),
                error = %err,
                "acknowledgement missing/invalid; ignoring approval"
            );
            return GateOutcome::Rejected {
                marker,
                reason: err.into(),
            };
        }

        let request = match ApprovalRequest::read_from(&marker) {
            Ok(request) => request,
            Err(err) => {
                warn!(marker = %marker.display(), error = %err, "invalid approval");
                return GateOutcome::Rejected {
                    marker,
                    reason: err.into(),
                };
            }
        };

        let target = self.sandbox.join(target_name);
        let backup = match backup_path_for(&target) {
            Ok(backup) => backup,
            Err(err) => return GateOutcome::Failed { marker, error: err },
        };
        let resolved = match self.contain(&target, &backup) {
            Ok(resolved) => resolved,
            Err(err) => {
                error!(file = target_name, error = %err, "path escapes sandbox");
                return GateOutcome::Rejected {
                    marker,
                    reason: err.into(),
                };
            }
        };

        let dry_run = self.global_dry_run || request.dry_run;
        info!(
            file = target_name,
            mask = %request.mask,
            dry = dry_run,
            "approval detected"
        );

        let Some(_claim) = self.claim(&resolved) else {
            warn!(file = target_name, "transform already in flight for target; leaving approval");
            return GateOutcome::Busy {
                marker,
                target: resolved,
            };
        };

        match self
            .engine
            .run(&TransformJob::new(&target, request.mask, dry_run))
        {
            Ok(report) => {
                if report.dry_run {
                    info!(
                        file = target_name,
                        total = report.scanned,
                        changed = report.changed,
                        "dry run complete"
                    );
                } else {
                    info!(
                        file = target_name,
                        total = report.scanned,
                        changed = report.changed,
                        backup = %report.backup.display(),
                        "transform complete"
                    );
                }
                let marker_removed = match fs::remove_file(&marker) {
                    Ok(()) => {
                        info!(marker = %marker.display(), "approval file removed");
                        true
                    }
                    Err(err) => {
                        warn!(
                            marker = %marker.display(),
                            error = %err,
                            "could not remove approval file"
                        );
                        false
                    }
                };
                GateOutcome::Completed {
                    marker,
                    report,
                    marker_removed,
                }
            }
            Err(err) => {
                error!(
                    file = target_name,
                    error = %err,
                    untouched = err.is_precondition(),
                    "transform failed"
                );
                GateOutcome::Failed { marker, error: err }
            }
        }
    }

    fn contain(&self, target: &Path, backup: &Path) -> Result<PathBuf, SandboxError> {
        let resolved = resolve_within(&self.sandbox, target)?;
        resolve_prospective_within(&self.sandbox, backup)?;
        Ok(resolved)
    }

    fn claim(&self, target: &Path) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock();
        if !set.insert(target.to_path_buf()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            key: target.to_path_buf(),
        })
    }
}

/// Releases a target from the in-flight set when dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<PathBuf>>,
    key: PathBuf,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}
