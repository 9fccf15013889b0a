use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Watches the sandbox directory (non-recursively) and forwards paths that
/// may be approval markers into an async channel.
///
/// Forwarded events: a file created with content, a file renamed into the
/// directory, and a file closed after writing. A marker created empty is
/// skipped until its writer closes it.
pub struct ApprovalWatcher {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<PathBuf>,
}

impl ApprovalWatcher {
    pub fn start(dir: &Path) -> Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if let Some(path) = approval_candidate(&event)
                        && tx.send(path).is_err()
                    {
                        debug!("approval channel closed; dropping event");
                    }
                }
                Err(err) => warn!(error = %err, "file watch error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch sandbox directory: {}", dir.display()))?;

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Wait for the next event, then drain whatever else is already queued.
    /// Repeated paths within one batch are reported once, in arrival order.
    /// Returns `None` once the watcher has shut down.
    pub async fn next_batch(&mut self) -> Option<Vec<PathBuf>> {
        let first = self.events.recv().await?;
        let mut batch = vec![first];
        while let Ok(path) = self.events.try_recv() {
            if !batch.contains(&path) {
                batch.push(path);
            }
        }
        Some(batch)
    }
}

fn approval_candidate(event: &Event) -> Option<PathBuf> {
    match event.kind {
        EventKind::Create(_) => {
            let path = event.paths.first()?;
            match fs::symlink_metadata(path) {
                Ok(meta) if meta.is_file() && meta.len() == 0 => {
                    debug!(path = %path.display(), "empty file created; waiting for writer to close it");
                    None
                }
                _ => Some(path.clone()),
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both)) => {
            event.paths.last().cloned()
        }
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths.first().cloned(),
        _ => None,
    }
}
