use std::collections::TryReserveError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Process exit codes reported by `flipcfg`, one per failure category.
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const USAGE: u8 = 1;
    pub const BAD_PARAM: u8 = 2;
    pub const NOT_REGULAR_FILE: u8 = 3;
    pub const BACKUP_NAME_OOM: u8 = 4;
    pub const BACKUP_RENAME: u8 = 5;
    pub const OPEN_BACKUP: u8 = 6;
    pub const CREATE_OUTPUT: u8 = 7;
    pub const BUFFER_OOM: u8 = 8;
    pub const WRITE: u8 = 9;
    pub const READ: u8 = 10;
}

/// Errors produced by the backup-and-transform engine.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("stat({}) failed: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is not a regular file", .path.display())]
    NotRegularFile { path: PathBuf },

    #[error("out of memory while building backup name for {}", .path.display())]
    BackupNameAllocation {
        path: PathBuf,
        #[source]
        source: TryReserveError,
    },

    #[error(
        "failed to create backup (rename): {} -> {} : {source}",
        .target.display(),
        .backup.display()
    )]
    Backup {
        target: PathBuf,
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to open backup {}: {source}", .backup.display())]
    OpenBackup {
        backup: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create output for {}: {source}", .target.display())]
    CreateOutput {
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("out of memory allocating a {size}-byte transfer buffer")]
    BufferAllocation {
        size: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("write error on {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read error from {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "{original}; restoring {} from {} also failed: {rollback}",
        .target.display(),
        .backup.display()
    )]
    Recovery {
        original: Box<TransformError>,
        target: PathBuf,
        backup: PathBuf,
        #[source]
        rollback: io::Error,
    },
}

impl TransformError {
    /// Exit code for this failure. A failed restore keeps the code of the
    /// failure that triggered it.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Stat { .. } | Self::NotRegularFile { .. } => exit_codes::NOT_REGULAR_FILE,
            Self::BackupNameAllocation { .. } => exit_codes::BACKUP_NAME_OOM,
            Self::Backup { .. } => exit_codes::BACKUP_RENAME,
            Self::OpenBackup { .. } => exit_codes::OPEN_BACKUP,
            Self::CreateOutput { .. } => exit_codes::CREATE_OUTPUT,
            Self::BufferAllocation { .. } => exit_codes::BUFFER_OOM,
            Self::Write { .. } => exit_codes::WRITE,
            Self::Read { .. } => exit_codes::READ,
            Self::Recovery { original, .. } => original.exit_code(),
        }
    }

    /// True when the failure happened before the original was renamed, so
    /// the filesystem was never touched.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Stat { .. } | Self::NotRegularFile { .. } | Self::BackupNameAllocation { .. }
        )
    }
}
