// src/core/paths.rs

//! Config locations and `var$path` expansion.

use crate::constants::{CONFIG_DIR_NAME, SESSION_CONFIG_FILENAME, UPARM_VAR};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Nested `var$` definitions deeper than this are treated as a loop.
const MAX_EXPANSION_DEPTH: usize = 20;

/// Failures locating config directories or expanding virtual paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The platform has no config directory.
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    /// `var$` names a variable that is neither a session variable nor in the environment.
    #[error("Undefined variable '{var}' in '{text}'")]
    UndefinedVariable { var: String, text: String },
    /// Variable definitions that refer to each other.
    #[error("Recursive variable definition while expanding '{0}'")]
    Recursion(String),
    /// `~` or environment expansion failed.
    #[error("Failed to expand '{text}': {message}")]
    Expansion { text: String, message: String },
}

/// Returns the clpar configuration directory (`~/.config/clpar`).
pub fn get_config_dir() -> Result<PathBuf, PathError> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME))
        .ok_or(PathError::ConfigDirNotFound)
}

/// Returns the path of the default `clpar.toml`.
pub fn get_session_config_path() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(SESSION_CONFIG_FILENAME))
}

/// Default location for saved parameter files when `uparm` is not configured.
pub fn default_uparm_dir() -> Result<PathBuf, PathError> {
    get_config_dir().map(|dir| dir.join(UPARM_VAR))
}

/// Splits `var$rest` into its variable and remainder when the prefix is a variable name.
fn split_virtual(text: &str) -> Option<(&str, &str)> {
    let (var, rest) = text.split_once('$')?;
    if var.is_empty() || !var.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((var, rest))
}

/// Expands a virtual path such as `uparm$imsttr.par`.
///
/// The variable is looked up in `vars`, then in the process environment, and
/// its value is itself expanded. A leading `~` is expanded last.
pub fn expand(vars: &HashMap<String, String>, text: &str) -> Result<String, PathError> {
    let expanded = expand_virtual(vars, text, 0)?;
    Ok(shellexpand::tilde(&expanded).into_owned())
}

fn expand_virtual(
    vars: &HashMap<String, String>,
    text: &str,
    depth: usize,
) -> Result<String, PathError> {
    if depth > MAX_EXPANSION_DEPTH {
        return Err(PathError::Recursion(text.to_string()));
    }
    let Some((var, rest)) = split_virtual(text) else {
        return Ok(text.to_string());
    };
    let value = match vars.get(var) {
        Some(value) => value.clone(),
        None => std::env::var(var).map_err(|_| PathError::UndefinedVariable {
            var: var.to_string(),
            text: text.to_string(),
        })?,
    };
    let mut dir = expand_virtual(vars, &value, depth + 1)?;
    if !rest.is_empty() && !dir.is_empty() && !dir.ends_with('/') && !dir.ends_with('$') {
        dir.push('/');
    }
    dir.push_str(rest);
    Ok(dir)
}

/// Expands `~` and `$VAR` references in a configuration value.
pub fn expand_config_value(text: &str) -> Result<String, PathError> {
    shellexpand::full(text)
        .map(|s| s.into_owned())
        .map_err(|e| PathError::Expansion {
            text: text.to_string(),
            message: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_expands_nested_variables() {
        let vars = vars(&[("home", "/home/user/"), ("uparm", "home$uparm/")]);
        assert_eq!(expand(&vars, "uparm$imsttr.par").unwrap(), "/home/user/uparm/imsttr.par");
    }

    #[test]
    fn test_adds_separator_for_directories_without_slash() {
        let vars = vars(&[("bin", "/opt/iraf/bin")]);
        assert_eq!(expand(&vars, "bin$x_images.e").unwrap(), "/opt/iraf/bin/x_images.e");
        assert_eq!(expand(&vars, "bin$").unwrap(), "/opt/iraf/bin");
    }

    #[test]
    fn test_plain_paths_and_foreign_commands_are_untouched() {
        let vars = HashMap::new();
        assert_eq!(expand(&vars, "/tmp/task.par").unwrap(), "/tmp/task.par");
        assert_eq!(expand(&vars, "$ls -l").unwrap(), "$ls -l");
    }

    #[test]
    fn test_undefined_variable() {
        let err = expand(&HashMap::new(), "nosuchvar_clpar$file").unwrap_err();
        assert_eq!(
            err,
            PathError::UndefinedVariable {
                var: "nosuchvar_clpar".to_string(),
                text: "nosuchvar_clpar$file".to_string()
            }
        );
    }

    #[test]
    fn test_recursive_definition_is_detected() {
        let vars = vars(&[("a", "b$"), ("b", "a$")]);
        assert!(matches!(expand(&vars, "a$x"), Err(PathError::Recursion(_))));
    }
}
