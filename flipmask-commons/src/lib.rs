//! Shared helpers reused across the flipmask crates. Today this is limited to
//! sandbox path containment, which both the approval gate and the daemon
//! entry point need without depending on each other.

pub mod paths;

pub use paths::{
    SandboxError, canonicalize_root, is_strictly_within, resolve_prospective_within,
    resolve_within,
};
