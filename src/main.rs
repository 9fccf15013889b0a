//! `flipcfg` - XOR a file with an 8-bit mask behind a `.bak` backup.

use std::process::ExitCode;

use flipmask::cli::{self, FlipArgs};
use flipmask_core::exit_codes;

fn main() -> ExitCode {
    let args = match cli::parse_or_exit::<FlipArgs>() {
        Ok(args) => args,
        Err(code) => return code,
    };

    match cli::handle_flip_command(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_codes::USAGE)
        }
    }
}
