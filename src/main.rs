//! recalc - Calculated fields for JSON records

use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(e) = recalc::cli::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
