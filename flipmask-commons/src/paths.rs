use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Reasons a path could not be admitted into a sandbox root.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to resolve {}: {source}", .path.display())]
    Unresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path {} escapes sandbox root {}", .path.display(), .root.display())]
    Escapes { path: PathBuf, root: PathBuf },

    #[error("path {} does not end in a plain file name", .0.display())]
    NoFileName(PathBuf),
}

/// Canonicalize the sandbox root itself. Unlike the per-file checks this never
/// falls back to the provided path: a root that cannot be resolved cannot
/// anchor any containment decision.
pub fn canonicalize_root(root: &Path) -> Result<PathBuf, SandboxError> {
    std::fs::canonicalize(root).map_err(|source| SandboxError::Unresolvable {
        path: root.to_path_buf(),
        source,
    })
}

/// True when `path` lies below `root` and is not `root` itself.
///
/// Both arguments are expected to be canonical already; the comparison is
/// component-wise, so `/srv/box2` is not inside `/srv/box`.
pub fn is_strictly_within(root: &Path, path: &Path) -> bool {
    path != root && path.starts_with(root)
}

/// Resolve an existing path (following symlinks and `..`) and require the
/// result to sit strictly inside `root`.
pub fn resolve_within(root: &Path, candidate: &Path) -> Result<PathBuf, SandboxError> {
    let canonical =
        std::fs::canonicalize(candidate).map_err(|source| SandboxError::Unresolvable {
            path: candidate.to_path_buf(),
            source,
        })?;

    if !is_strictly_within(root, &canonical) {
        return Err(SandboxError::Escapes {
            path: canonical,
            root: root.to_path_buf(),
        });
    }
    Ok(canonical)
}

/// Resolve a path that may not exist yet, such as a backup that is about to
/// be created.
///
/// When the entry already exists it is resolved exactly like
/// [`resolve_within`]. Otherwise its parent directory is canonicalized and
/// must be `root` or lie inside it, and the final component must be a plain
/// name.
pub fn resolve_prospective_within(root: &Path, candidate: &Path) -> Result<PathBuf, SandboxError> {
    match std::fs::symlink_metadata(candidate) {
        Ok(_) => return resolve_within(root, candidate),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(SandboxError::Unresolvable {
                path: candidate.to_path_buf(),
                source,
            });
        }
    }

    let Some(Component::Normal(name)) = candidate.components().next_back() else {
        return Err(SandboxError::NoFileName(candidate.to_path_buf()));
    };
    let parent = candidate
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let parent_canonical =
        std::fs::canonicalize(parent).map_err(|source| SandboxError::Unresolvable {
            path: parent.to_path_buf(),
            source,
        })?;

    if parent_canonical != root && !is_strictly_within(root, &parent_canonical) {
        return Err(SandboxError::Escapes {
            path: parent_canonical.join(name),
            root: root.to_path_buf(),
        });
    }

    let resolved = parent_canonical.join(name);
    debug!(path = %resolved.display(), "resolved prospective sandbox path");
    Ok(resolved)
}
