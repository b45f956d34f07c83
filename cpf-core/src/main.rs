//! cpf - Dynamic Plugin Framework demo binary.
//!
//! The interactive CLI is an external collaborator this core doesn't
//! cover; this binary just initializes the framework against the default
//! (or first CLI argument) root, prints what it found, and exits --
//! fatal errors terminate the process with status 1, matching the
//! original `CPF_*` family's `exit(EXIT_FAILURE)` contract.

use std::process::ExitCode;

use cpf_core::Framework;
use tracing::error;

fn main() -> ExitCode {
    cpf_core::init_logging();

    let root = std::env::args().nth(1);
    match Framework::init(root.as_deref()) {
        Ok(framework) => {
            framework.print_loaded();
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
