// src/cli/handlers/get.rs

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use super::commons;
use crate::CancellationToken;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Resolve a parameter through a session")]
struct GetArgs {
    /// Task whose scope chain is used.
    task: String,

    /// Parameter name, optionally qualified (`pkg.task.param[2].p_min`).
    param: String,

    /// Session configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Entry point for `clpar get`.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let get_args = GetArgs::try_parse_from(&args)?;
    let mut session = commons::open_session(get_args.config.as_deref(), cancellation_token)?;
    let task = session.find_task(&get_args.task)?;
    let value = session
        .get_param(task, &get_args.param)
        .with_context(|| format!("Could not read '{}' for task '{}'", get_args.param, get_args.task))?;
    println!("{}", value);
    Ok(())
}
