use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// At most this many bytes of the acknowledgement file are considered.
pub const MAX_ACK_BYTES: u64 = 1023;

#[derive(Debug, Error)]
pub enum AckError {
    #[error("acknowledgement file missing: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("failed to read acknowledgement file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("acknowledgement file empty: {}", .path.display())]
    Empty { path: PathBuf },

    #[error("acknowledgement invalid or altered: {}", .path.display())]
    Mismatch { path: PathBuf },
}

/// The operator acknowledgement: a file that must contain `token` once
/// surrounding whitespace is trimmed. Checked on every call, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    path: PathBuf,
    token: String,
}

impl Acknowledgement {
    pub fn new(path: impl Into<PathBuf>, token: impl Into<String>) -> Self {
        let token: String = token.into();
        Self {
            path: path.into(),
            token: token.trim().to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn verify(&self) -> Result<(), AckError> {
        let file = File::open(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                AckError::Missing {
                    path: self.path.clone(),
                }
            } else {
                AckError::Read {
                    path: self.path.clone(),
                    source,
                }
            }
        })?;

        let mut raw = Vec::new();
        file.take(MAX_ACK_BYTES)
            .read_to_end(&mut raw)
            .map_err(|source| AckError::Read {
                path: self.path.clone(),
                source,
            })?;

        if raw.is_empty() {
            return Err(AckError::Empty {
                path: self.path.clone(),
            });
        }
        if raw.trim_ascii() != self.token.as_bytes() {
            return Err(AckError::Mismatch {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}
