// src/cli/handlers/run.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use super::commons;
use crate::{
    CancellationToken,
    core::session::RunOptions,
    system::executor::Redirection,
};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Run a task")]
#[command(trailing_var_arg = true)]
struct RunArgs {
    /// Session configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep parameter changes in memory only.
    #[arg(long)]
    nosave: bool,

    #[arg(long)]
    stdin: Option<PathBuf>,

    #[arg(long)]
    stdout: Option<PathBuf>,

    #[arg(long)]
    stderr: Option<PathBuf>,

    /// Append to the stdout/stderr files.
    #[arg(long)]
    append: bool,

    /// Task to run.
    task: String,

    /// Positional values and `param=value` keywords.
    #[arg(allow_hyphen_values = true)]
    args: Vec<String>,
}

/// Entry point for `clpar run`.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let run_args = RunArgs::try_parse_from(&args)?;
    let mut session = commons::open_session(run_args.config.as_deref(), cancellation_token)?;
    let (positional, keywords) = commons::split_call_args(&run_args.args);
    let options = RunOptions {
        nosave: run_args.nosave,
        redirect: Redirection {
            stdin: run_args.stdin,
            stdout: run_args.stdout,
            stderr: run_args.stderr,
            append: run_args.append,
        },
        hush: false,
    };

    let report = session
        .run(&run_args.task, &positional, &keywords, &options)
        .with_context(|| format!("Task '{}' failed", run_args.task))?;
    if let Some(path) = report.saved {
        log::info!("Parameters for '{}' saved to {}", run_args.task, path.display());
    }
    Ok(())
}
