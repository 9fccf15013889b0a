//! Backup-and-transform engine.
//!
//! A run renames `<target>` to `<target>.bak`, streams the backup through the
//! XOR mask and, unless it is a dry run, writes the result into a temporary
//! file next to the target that is renamed onto `<target>` once complete. Any
//! failure after the backup rename triggers one best-effort rename back.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::error::TransformError;
use crate::mask::MaskSpec;

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;
pub const BACKUP_SUFFIX: &str = ".bak";

#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOptions {
    pub chunk_size: usize,
    pub sync_output: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sync_output: true,
        }
    }
}

/// One requested transform. Consumed by a single [`TransformEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformJob {
    pub target: PathBuf,
    pub mask: MaskSpec,
    pub dry_run: bool,
}

impl TransformJob {
    pub fn new(target: impl Into<PathBuf>, mask: MaskSpec, dry_run: bool) -> Self {
        Self {
            target: target.into(),
            mask,
            dry_run,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub target: PathBuf,
    pub backup: PathBuf,
    pub mask: MaskSpec,
    pub dry_run: bool,
    /// Bytes read from the backup.
    pub scanned: u64,
    /// Bytes whose value differs after the XOR; independent of `dry_run`.
    pub changed: u64,
    /// Set when a dry run could not rename the backup back to the target.
    /// The scan itself succeeded, but the operator has to fix the name.
    pub restore_failure: Option<String>,
}

/// Append `.bak` to the full path. The name buffer is reserved up front so an
/// allocation failure is reported instead of aborting.
pub fn backup_path_for(target: &Path) -> Result<PathBuf, TransformError> {
    let raw = target.as_os_str();
    let mut name = OsString::new();
    name.try_reserve_exact(raw.len() + BACKUP_SUFFIX.len())
        .map_err(|source| TransformError::BackupNameAllocation {
            path: target.to_path_buf(),
            source,
        })?;
    name.push(raw);
    name.push(BACKUP_SUFFIX);
    Ok(PathBuf::from(name))
}

#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    options: TransformOptions,
}

impl TransformEngine {
    pub fn new(options: TransformOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> TransformOptions {
        self.options
    }

    /// Run `job` against the filesystem.
    pub fn run(&self, job: &TransformJob) -> Result<TransformReport, TransformError> {
        let target = job.target.as_path();
        let metadata = fs::metadata(target).map_err(|source| TransformError::Stat {
            path: target.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Err(TransformError::NotRegularFile {
                path: target.to_path_buf(),
            });
        }

        let backup = backup_path_for(target)?;
        fs::rename(target, &backup).map_err(|source| TransformError::Backup {
            target: target.to_path_buf(),
            backup: backup.clone(),
            source,
        })?;
        info!(backup = %backup.display(), "created backup");

        let (scanned, changed) = match self.stream(job, &backup) {
            Ok(counts) => counts,
            Err(err) => return Err(restore_after_failure(err, target, &backup)),
        };

        let mut restore_failure = None;
        if job.dry_run {
            if let Err(err) = fs::rename(&backup, target) {
                warn!(
                    backup = %backup.display(),
                    original = %target.display(),
                    error = %err,
                    "failed to restore original after dry run"
                );
                restore_failure = Some(err.to_string());
            }
        }

        Ok(TransformReport {
            target: target.to_path_buf(),
            backup,
            mask: job.mask,
            dry_run: job.dry_run,
            scanned,
            changed,
            restore_failure,
        })
    }

    fn stream(&self, job: &TransformJob, backup: &Path) -> Result<(u64, u64), TransformError> {
        let mut input = File::open(backup).map_err(|source| TransformError::OpenBackup {
            backup: backup.to_path_buf(),
            source,
        })?;

        let mut output = if job.dry_run {
            None
        } else {
            Some(create_output(&job.target)?)
        };

        let chunk_size = self.options.chunk_size.max(1);
        let mut buf = Vec::new();
        buf.try_reserve_exact(chunk_size)
            .map_err(|source| TransformError::BufferAllocation {
                size: chunk_size,
                source,
            })?;
        buf.resize(chunk_size, 0);

        let mut scanned = 0u64;
        let mut changed = 0u64;
        loop {
            let read = match input.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(TransformError::Read {
                        path: backup.to_path_buf(),
                        source,
                    });
                }
            };

            let chunk = &mut buf[..read];
            scanned += read as u64;
            changed += job.mask.apply(chunk);

            if let Some(out) = output.as_mut() {
                out.write_all(chunk)
                    .map_err(|source| TransformError::Write {
                        path: out.path().to_path_buf(),
                        source,
                    })?;
            }
        }

        if let Some(out) = output {
            self.persist(out, &job.target)?;
        }

        debug!(scanned, changed, "stream complete");
        Ok((scanned, changed))
    }

    fn persist(&self, output: NamedTempFile, target: &Path) -> Result<(), TransformError> {
        let write_err = |source| TransformError::Write {
            path: output.path().to_path_buf(),
            source,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            output
                .as_file()
                .set_permissions(fs::Permissions::from_mode(OUTPUT_MODE))
                .map_err(write_err)?;
        }

        if self.options.sync_output {
            output.as_file().sync_all().map_err(write_err)?;
        }

        output
            .persist(target)
            .map_err(|err| TransformError::Write {
                path: target.to_path_buf(),
                source: err.error,
            })?;
        Ok(())
    }
}

/// Temp file in the target's directory, so the final rename stays on one
/// filesystem.
fn create_output(target: &Path) -> Result<NamedTempFile, TransformError> {
    let parent = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let stem = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    tempfile::Builder::new()
        .prefix(&format!(".{stem}."))
        .suffix(".flip")
        .tempfile_in(parent)
        .map_err(|source| TransformError::CreateOutput {
            target: target.to_path_buf(),
            source,
        })
}

/// Rename the backup back over the target after `err`. A failed rename is
/// folded into [`TransformError::Recovery`] and not retried.
pub(crate) fn restore_after_failure(
    err: TransformError,
    target: &Path,
    backup: &Path,
) -> TransformError {
    match fs::rename(backup, target) {
        Ok(()) => {
            warn!(
                original = %target.display(),
                error = %err,
                "transform failed; original restored from backup"
            );
            err
        }
        Err(rollback) => {
            error!(
                original = %target.display(),
                backup = %backup.display(),
                error = %err,
                rollback = %rollback,
                "transform failed and the original could not be restored"
            );
            TransformError::Recovery {
                original: Box::new(err),
                target: target.to_path_buf(),
                backup: backup.to_path_buf(),
                rollback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn engine_with_chunk(chunk_size: usize) -> TransformEngine {
        TransformEngine::new(TransformOptions {
            chunk_size,
            sync_output: false,
        })
    }

    #[test]
    fn backup_name_appends_suffix_to_full_path() {
        assert_eq!(
            backup_path_for(Path::new("dir/data.bin")).unwrap(),
            PathBuf::from("dir/data.bin.bak")
        );
        assert_eq!(
            backup_path_for(Path::new("noext")).unwrap(),
            PathBuf::from("noext.bak")
        );
    }

    #[test]
    fn example_scenario_transforms_and_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("data.bin");
        fs::write(&target, [0x00, 0xFF, 0x0F]).unwrap();

        let report = TransformEngine::default()
            .run(&TransformJob::new(&target, MaskSpec::new(0x0F), false))
            .unwrap();

        assert_eq!(fs::read(&target).unwrap(), vec![0x0F, 0xF0, 0x00]);
        assert_eq!(
            fs::read(dir.path().join("data.bin.bak")).unwrap(),
            vec![0x00, 0xFF, 0x0F]
        );
        assert_eq!(report.scanned, 3);
        let expected_changed = [0x00u8, 0xFF, 0x0F]
            .iter()
            .filter(|byte| *byte ^ 0x0F != **byte)
            .count() as u64;
        assert_eq!(report.changed, expected_changed);
        assert_eq!(report.backup, dir.path().join("data.bin.bak"));
    }

    #[test]
    fn chunk_boundaries_do_not_affect_output() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("blob");
        let original: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(&target, &original).unwrap();

        let report = engine_with_chunk(7)
            .run(&TransformJob::new(&target, MaskSpec::new(0xA5), false))
            .unwrap();

        let expected: Vec<u8> = original.iter().map(|byte| byte ^ 0xA5).collect();
        assert_eq!(fs::read(&target).unwrap(), expected);
        assert_eq!(report.scanned, 1000);
        assert_eq!(report.changed, 1000);
    }

    #[test]
    fn dry_run_leaves_file_untouched_and_reports_counts() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("conf.bin");
        fs::write(&target, b"hello").unwrap();

        let report = TransformEngine::default()
            .run(&TransformJob::new(&target, MaskSpec::new(0x20), true))
            .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.scanned, 5);
        assert_eq!(report.changed, 5);
        assert!(report.restore_failure.is_none());
        assert_eq!(fs::read(&target).unwrap(), b"hello".to_vec());
        assert!(!dir.path().join("conf.bin.bak").exists());
    }

    #[test]
    fn no_temp_files_are_left_behind() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.bin");
        fs::write(&target, b"abc").unwrap();

        TransformEngine::default()
            .run(&TransformJob::new(&target, MaskSpec::new(1), false))
            .unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.bin".to_string(), "a.bin.bak".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn output_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.bin");
        fs::write(&target, b"abc").unwrap();
        TransformEngine::default()
            .run(&TransformJob::new(&target, MaskSpec::new(1), false))
            .unwrap();

        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn empty_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("empty");
        fs::write(&target, b"").unwrap();

        let report = TransformEngine::default()
            .run(&TransformJob::new(&target, MaskSpec::new(0xFF), false))
            .unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.changed, 0);
        assert!(fs::read(&target).unwrap().is_empty());
    }

    #[test]
    fn missing_target_fails_before_any_rename() {
        let dir = TempDir::new().unwrap();
        let err = TransformEngine::default()
            .run(&TransformJob::new(
                dir.path().join("nope"),
                MaskSpec::new(1),
                false,
            ))
            .unwrap_err();
        assert!(matches!(err, TransformError::Stat { .. }));
        assert_eq!(err.exit_code(), 3);
        assert!(!dir.path().join("nope.bak").exists());
    }

    #[test]
    fn directory_target_is_not_a_regular_file() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let err = TransformEngine::default()
            .run(&TransformJob::new(&sub, MaskSpec::new(1), false))
            .unwrap_err();
        assert!(matches!(err, TransformError::NotRegularFile { .. }));
        assert!(sub.is_dir());
    }

    #[test]
    fn restore_after_failure_renames_backup_back() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("t");
        let backup = dir.path().join("t.bak");
        fs::write(&backup, b"orig").unwrap();

        let err = restore_after_failure(
            TransformError::Read {
                path: backup.clone(),
                source: io::Error::other("disk gone"),
            },
            &target,
            &backup,
        );
        assert!(matches!(err, TransformError::Read { .. }));
        assert_eq!(fs::read(&target).unwrap(), b"orig".to_vec());
        assert!(!backup.exists());
    }

    #[test]
    fn failed_restore_is_reported_as_recovery() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("t");
        let backup = dir.path().join("vanished.bak");

        let err = restore_after_failure(
            TransformError::Write {
                path: target.clone(),
                source: io::Error::other("disk full"),
            },
            &target,
            &backup,
        );
        assert!(matches!(err, TransformError::Recovery { .. }));
        assert_eq!(err.exit_code(), 9);
    }
}
