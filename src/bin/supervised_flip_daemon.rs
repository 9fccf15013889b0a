//! `supervised_flip_daemon` - apply operator-approved transforms inside a sandbox.

use std::process::ExitCode;

use flipmask::cli::{self, DaemonArgs};
use flipmask::daemon;
use flipmask_core::exit_codes;

#[tokio::main]
async fn main() -> ExitCode {
    let args = match cli::parse_or_exit::<DaemonArgs>() {
        Ok(args) => args,
        Err(code) => return code,
    };

    match daemon::run(args).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_codes::USAGE)
        }
    }
}
