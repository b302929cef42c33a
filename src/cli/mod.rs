// src/cli/mod.rs

use clap::Parser;

/// Routes a command name to its handler.
pub mod dispatcher;
/// One module per command.
pub mod handlers;

/// clpar: inspect parameter files and run tasks against a parameter session.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
#[command(disable_help_subcommand = true)]
#[command(trailing_var_arg = true)]
pub struct Cli {
    /// The command to run (lpar, dpar, check, get, set, run, unlearn).
    pub command: Option<String>,

    /// Arguments passed through to the command.
    #[arg(allow_hyphen_values = true)]
    pub args: Vec<String>,
}
