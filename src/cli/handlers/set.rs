// src/cli/handlers/set.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;

use super::commons;
use crate::{CancellationToken, core::value::NativeValue};

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Set a parameter and save it")]
struct SetArgs {
    /// Task whose scope chain is used.
    task: String,

    /// Parameter name, optionally qualified.
    param: String,

    /// New value (coerced to the parameter's type).
    value: String,

    /// Skip range and choice checks.
    #[arg(long)]
    no_check: bool,

    /// Session configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Entry point for `clpar set`.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let set_args = SetArgs::try_parse_from(&args)?;
    let mut session = commons::open_session(set_args.config.as_deref(), cancellation_token)?;
    let task = session.find_task(&set_args.task)?;
    session
        .set_param(
            task,
            &set_args.param,
            &NativeValue::from(set_args.value.as_str()),
            !set_args.no_check,
        )
        .with_context(|| format!("Could not set '{}' for task '{}'", set_args.param, set_args.task))?;

    match session.save_task(task)? {
        Some(path) => println!(
            "{} {} saved to {}",
            "✓".green().bold(),
            set_args.param.cyan(),
            path.display()
        ),
        None => println!("{} {} has no saved parameter file", "!".yellow().bold(), set_args.task),
    }
    Ok(())
}
