//! # Config Loader
//!
//! Reads `clpar.toml` and turns it into a ready [`Session`]: variables are
//! expanded, tasks declared in file order, the root package set and the
//! start-up packages loaded.
use crate::constants::UPARM_VAR;
use crate::core::paths::{self, PathError};
use crate::core::session::{RunOptions, Session, SessionOptions};
use crate::core::task::TaskError;
use crate::models::SessionConfig;
use crate::system::executor::ProcessRunner;
use crate::system::procedure::ScriptCompiler;
use crate::system::prompt::Interaction;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures loading a session configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for a session.
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// Path or variable expansion failed.
    #[error(transparent)]
    Path(#[from] PathError),
    /// A declared task could not be registered.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Parses a `clpar.toml` file.
pub fn load_config(path: &Path) -> Result<SessionConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    let config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })?;
    log::debug!("Loaded session config from {}", path.display());
    Ok(config)
}

/// Resolves which config file to use: the explicit one, else the default
/// location if it exists. `None` means run with an empty configuration.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    let default = paths::get_session_config_path()?;
    Ok(default.exists().then_some(default))
}

/// The collaborators a session is built with.
pub struct Collaborators {
    /// Runs foreign and executable tasks.
    pub runner: Box<dyn ProcessRunner>,
    /// Compiles script and package tasks.
    pub compiler: Box<dyn ScriptCompiler>,
    /// Prompter and cursor.
    pub interaction: Interaction,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("interaction", &self.interaction)
            .finish_non_exhaustive()
    }
}

/// Builds a session from a parsed configuration.
///
/// Relative task files are taken relative to `base_dir` (the directory of the
/// config file). When `uparm` is not configured, saved parameters go to the
/// default uparm directory under the clpar config dir.
pub fn build_session(
    config: SessionConfig,
    base_dir: Option<&Path>,
    collaborators: Collaborators,
) -> Result<Session, ConfigError> {
    let mut session = Session::new(
        collaborators.runner,
        collaborators.compiler,
        collaborators.interaction,
    );
    session.set_options(SessionOptions {
        strict: config.strict,
        prompting: config.prompting,
    });

    let mut vars: Vec<(String, String)> = config.vars.into_iter().collect();
    vars.sort();
    for (name, value) in vars {
        session.set_var(name, paths::expand_config_value(&value)?);
    }
    if session.var(UPARM_VAR).is_none() {
        let mut uparm = paths::default_uparm_dir()?.display().to_string();
        uparm.push('/');
        log::debug!("Using default uparm directory {}", uparm);
        session.set_var(UPARM_VAR, uparm);
    }

    for mut decl in config.tasks {
        if let Some(base) = base_dir
            && is_plain_relative(&decl.file)
        {
            decl.file = base.join(&decl.file).display().to_string();
        }
        session.declare(decl)?;
    }

    if let Some(root) = &config.root {
        session.set_root(root)?;
    }
    let hushed = RunOptions {
        hush: true,
        ..RunOptions::default()
    };
    for package in &config.load {
        log::info!("Loading package '{}'", package);
        session.load_package(package, &hushed)?;
    }
    Ok(session)
}

/// A relative file name with no `var$` prefix and no foreign `$`.
fn is_plain_relative(file: &str) -> bool {
    !file.is_empty() && !file.contains('$') && !file.starts_with('~') && Path::new(file).is_relative()
}
