// src/cli/dispatcher.rs

use anyhow::{Result, anyhow};
use colored::Colorize;

use crate::{CancellationToken, cli::handlers};

/// Defines a command, its aliases, and its handler function.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    about: &'static str,
    handler: fn(Vec<String>, &CancellationToken) -> Result<()>,
}

/// The single source of truth for all commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "check",
        aliases: &[],
        about: "Parse every .par file under the given paths and report errors",
        handler: handlers::check::handle,
    },
    CommandDefinition {
        name: "dpar",
        aliases: &["dump"],
        about: "Dump a parameter file as task.param = value lines",
        handler: handlers::dpar::handle,
    },
    CommandDefinition {
        name: "get",
        aliases: &[],
        about: "Resolve a parameter through a session",
        handler: handlers::get::handle,
    },
    CommandDefinition {
        name: "lpar",
        aliases: &["list"],
        about: "Pretty-print a parameter file",
        handler: handlers::lpar::handle,
    },
    CommandDefinition {
        name: "run",
        aliases: &[],
        about: "Run a task",
        handler: handlers::run::handle,
    },
    CommandDefinition {
        name: "set",
        aliases: &[],
        about: "Set a parameter and save it",
        handler: handlers::set::handle,
    },
    CommandDefinition {
        name: "unlearn",
        aliases: &[],
        about: "Reset a task's parameters to their defaults",
        handler: handlers::unlearn::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

fn print_commands() {
    println!("{}", "Commands:".yellow().bold());
    for cmd in COMMAND_REGISTRY {
        println!("  {:<10} {}", cmd.name.cyan(), cmd.about);
    }
}

/// Routes a command name and its arguments to the registered handler.
pub fn dispatch(
    command: Option<String>,
    args: Vec<String>,
    cancellation_token: &CancellationToken,
) -> Result<()> {
    let Some(name) = command else {
        print_commands();
        return Ok(());
    };
    let command = find_command(&name).ok_or_else(|| {
        anyhow!(
            "Unknown command '{}'. Run 'clpar' without arguments to list commands.",
            name
        )
    })?;
    log::debug!("Dispatching '{}' with {:?}", command.name, args);
    (command.handler)(args, cancellation_token)
}
