//! Approval marker contents.
//!
//! A marker is a small text file: the first line is `<mode> <param>` (for
//! example `mask 0xFF` or `bits 0,3,7`), an optional second line `dry`
//! requests a dry run.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::mask::{MaskError, MaskMode, MaskSpec};

/// Markers larger than this are rejected without being parsed.
pub const MAX_APPROVAL_BYTES: u64 = 4096;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("open approval file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("empty approval file")]
    Empty,

    #[error("approval file exceeds {MAX_APPROVAL_BYTES} bytes")]
    TooLarge,

    #[error("approval file is not valid UTF-8")]
    NotUtf8,

    #[error("approval file first line must be: <mode> <param>")]
    MissingParam,

    #[error(transparent)]
    Mask(#[from] MaskError),
}

/// A parsed approval marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub mode: MaskMode,
    pub mask: MaskSpec,
    pub dry_run: bool,
}

impl ApprovalRequest {
    pub fn parse(contents: &str) -> Result<Self, ApprovalError> {
        if contents.is_empty() {
            return Err(ApprovalError::Empty);
        }

        let mut lines = contents.split('\n');
        let first = lines.next().unwrap_or_default();
        let first = first.split('\r').next().unwrap_or_default();

        let first = first.trim_start();
        let (mode, rest) = first
            .split_once(char::is_whitespace)
            .ok_or(ApprovalError::MissingParam)?;
        let param = rest.trim_start();
        if mode.is_empty() || param.is_empty() {
            return Err(ApprovalError::MissingParam);
        }

        let mode = mode.parse::<MaskMode>()?;
        let mask = match mode {
            MaskMode::Mask => MaskSpec::from_mask_literal(param)?,
            MaskMode::Bits => MaskSpec::from_bit_list(param)?,
        };

        let dry_run = lines.next().is_some_and(|line| line.trim() == "dry");

        Ok(Self {
            mode,
            mask,
            dry_run,
        })
    }

    /// Read and parse a marker file, refusing oversized or non-UTF-8 input.
    pub fn read_from(path: &Path) -> Result<Self, ApprovalError> {
        let read_err = |source| ApprovalError::Read {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(read_err)?;
        let mut raw = Vec::new();
        file.take(MAX_APPROVAL_BYTES + 1)
            .read_to_end(&mut raw)
            .map_err(read_err)?;
        if raw.len() as u64 > MAX_APPROVAL_BYTES {
            return Err(ApprovalError::TooLarge);
        }
        let text = String::from_utf8(raw).map_err(|_| ApprovalError::NotUtf8)?;
        Self::parse(&text)
    }
}
