// src/bin/clpar.rs

use clap::Parser;
use clpar::{
    CancellationToken,
    cli::{Cli, dispatcher},
    system::executor,
};
use colored::*;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// The main entry point of the `clpar` application.
/// It sets up logging, parses arguments, dispatches to the correct handler,
/// and performs centralized error handling.
fn main() {
    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));
    env_logger::init();

    let cli = Cli::parse();
    log::debug!("CLI args parsed: {:?}", cli);

    if let Err(e) = dispatcher::dispatch(cli.command, cli.args, &cancellation_token) {
        // An interrupted child process exits quietly with the shell's code.
        let cancelled = e.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<executor::ExecutionError>(),
                Some(executor::ExecutionError::Cancelled)
            )
        });
        if cancelled {
            std::process::exit(130);
        }
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}
