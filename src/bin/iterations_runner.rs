//! `iterations-runner`: run a shared-library benchmark for N in-process
//! iterations and print the per-iteration deltas.

use std::process::ExitCode;

fn main() -> ExitCode {
    iteration_runner::cli::run_cli()
}
