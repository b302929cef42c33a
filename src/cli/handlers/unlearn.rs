// src/cli/handlers/unlearn.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use dialoguer::{Confirm, theme::ColorfulTheme};
use std::path::PathBuf;

use super::commons;
use crate::CancellationToken;

#[derive(Parser, Debug)]
#[command(no_binary_name = true, about = "Reset a task's parameters to their defaults")]
struct UnlearnArgs {
    /// Task to reset.
    task: String,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    yes: bool,

    /// Session configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Entry point for `clpar unlearn`.
pub fn handle(args: Vec<String>, cancellation_token: &CancellationToken) -> Result<()> {
    let unlearn_args = UnlearnArgs::try_parse_from(&args)?;
    let mut session = commons::open_session(unlearn_args.config.as_deref(), cancellation_token)?;
    let task = session.find_task(&unlearn_args.task)?;

    if !unlearn_args.yes
        && !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Reset all learned parameters of '{}'?",
                unlearn_args.task
            ))
            .default(false)
            .interact()?
    {
        println!("\nOperation cancelled.");
        return Ok(());
    }

    session.unlearn(task)?;
    if let Some(path) = session.save_task(task)? {
        log::debug!("Wrote defaults to {}", path.display());
    }
    println!(
        "{} Parameters of {} reset to defaults",
        "✓".green().bold(),
        unlearn_args.task.cyan()
    );
    Ok(())
}
