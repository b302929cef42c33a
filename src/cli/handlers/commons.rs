// src/cli/handlers/commons.rs

// Shared helpers for the handlers.

use anyhow::{Context, Result};
use std::path::Path;

use crate::{
    CancellationToken,
    core::{
        config_loader::{self, Collaborators},
        par_list::ParList,
        session::Session,
        value::NativeValue,
    },
    models::SessionConfig,
    system::{executor::LiveProcessRunner, procedure::ProcedureTable, prompt::Interaction},
};

/// Builds the session for `get`/`set`/`run`/`unlearn` from the configured `clpar.toml`.
pub fn open_session(config: Option<&Path>, cancellation_token: &CancellationToken) -> Result<Session> {
    let collaborators = Collaborators {
        runner: Box::new(LiveProcessRunner::new(cancellation_token.clone())),
        compiler: Box::new(ProcedureTable::new()),
        interaction: Interaction::terminal(),
    };
    let (session_config, base_dir) = match config_loader::locate_config(config)? {
        Some(path) => {
            let parsed = config_loader::load_config(&path)?;
            (parsed, path.parent().map(Path::to_path_buf))
        }
        None => {
            log::debug!("No session config found; starting an empty session");
            (SessionConfig::default(), None)
        }
    };
    config_loader::build_session(session_config, base_dir.as_deref(), collaborators)
        .context("Failed to set up the parameter session")
}

/// Reads a standalone par file, naming the list after the file stem.
pub fn read_par_file(path: &Path, strict: bool) -> Result<ParList> {
    let name = task_name_for(path, None);
    Ok(ParList::read(&name, path, strict)?)
}

/// The explicit task name, or the file stem of `path`.
pub fn task_name_for(path: &Path, explicit: Option<&str>) -> String {
    match explicit {
        Some(name) => name.to_string(),
        None => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    }
}

/// Splits command-line task arguments into positionals and `key=value` keywords.
pub fn split_call_args(args: &[String]) -> (Vec<NativeValue>, Vec<(String, NativeValue)>) {
    let mut positional = Vec::new();
    let mut keywords = Vec::new();
    for arg in args {
        match arg.split_once('=') {
            Some((key, value)) if is_keyword(key) => {
                keywords.push((key.to_string(), NativeValue::from(value)));
            }
            _ => positional.push(NativeValue::from(arg.as_str())),
        }
    }
    (positional, keywords)
}

fn is_keyword(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_call_args() {
        let args: Vec<String> = ["dev$pix", "nlines=5", "a=b=c", "x == y"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let (positional, keywords) = split_call_args(&args);
        assert_eq!(
            positional,
            vec![NativeValue::from("dev$pix"), NativeValue::from("x == y")]
        );
        assert_eq!(
            keywords,
            vec![
                ("nlines".to_string(), NativeValue::from("5")),
                ("a".to_string(), NativeValue::from("b=c")),
            ]
        );
    }

    #[test]
    fn test_task_name_for() {
        assert_eq!(task_name_for(Path::new("/tmp/imstat.par"), None), "imstat");
        assert_eq!(task_name_for(Path::new("/tmp/imstat.par"), Some("other")), "other");
    }
}
