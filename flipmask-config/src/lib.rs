//! Configuration for `flipcfg` and `supervised_flip_daemon`.
//!
//! Settings live in a small TOML file (`.flipmask.toml` by default) with three
//! sections: `[transform]`, `[approval]` and `[debug]`. Every field has a
//! default, so an absent or empty file yields a working configuration.

pub mod constants;
pub mod debug;
pub mod loader;

pub use debug::{DebugConfig, TraceLevel};
pub use loader::{ApprovalConfig, ConfigManager, FlipConfig, TransformConfig};
