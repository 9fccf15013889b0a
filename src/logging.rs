//! Tracing subscriber setup shared by both binaries.
//!
//! `RUST_LOG` always wins. Otherwise the daemon uses the `[debug]` section
//! of the configuration, while `flipcfg` stays quiet so that its stdout
//! report and stderr diagnostics are the only output.

use anyhow::{Result, anyhow};
use flipmask_config::DebugConfig;
use tracing_subscriber::EnvFilter;

const RUST_LOG_ENV: &str = "RUST_LOG";

/// Install a subscriber only when `RUST_LOG` is set.
pub fn init_env_tracing() -> Result<()> {
    if std::env::var_os(RUST_LOG_ENV).is_none() {
        return Ok(());
    }
    install(EnvFilter::from_default_env())
}

/// Install a subscriber driven by `RUST_LOG`, falling back to the configured
/// trace level for the flipmask targets.
pub fn init_tracing(debug: &DebugConfig) -> Result<()> {
    let directive = debug.filter_directive();
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&directive))?;
    install(filter)?;
    tracing::debug!(filter = %directive, "tracing initialised");
    Ok(())
}

fn install(filter: EnvFilter) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}
