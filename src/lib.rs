//! # flipmask
//!
//! Two small tools built on the same backup-and-transform engine:
//!
//! - `flipcfg` XORs every byte of a file with an 8-bit mask. The original is
//!   first renamed to `<file>.bak`; the transformed bytes are written to a
//!   temporary file that is renamed onto the original path once complete.
//! - `supervised_flip_daemon` watches a sandbox directory and applies the
//!   same transform to `<target>` when an operator drops a
//!   `<target>.approve` marker, provided `acknowledge.txt` holds the
//!   configured token and every path stays inside the sandbox.
//!
//! ```bash
//! flipcfg settings.bin mask 0x0F --dry
//! flipcfg settings.bin bits 0,3,7
//!
//! echo operator-token > sandbox/acknowledge.txt
//! supervised_flip_daemon sandbox &
//! printf 'mask 0x0F\ndry\n' > sandbox/settings.bin.approve
//! ```
//!
//! The engine, parsers and gate live in `flipmask-core`; configuration in
//! `flipmask-config`; sandbox path helpers in `flipmask-commons`. This crate
//! holds the binaries' glue.

pub mod approval_watcher;
pub mod cli;
pub mod daemon;
pub mod logging;

pub use approval_watcher::ApprovalWatcher;
pub use cli::{DaemonArgs, FlipArgs};
