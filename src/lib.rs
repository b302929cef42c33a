//! Typed parameter files and hierarchical task resolution for legacy
//! command-language environments.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
/// Shared flag set when the user interrupts a running child process.
pub type CancellationToken = Arc<AtomicBool>;

/// Command-line front end.
pub mod cli;
/// File names, defaults and limits.
pub mod constants;
/// The parameter engine: values, par files, tasks and the session.
pub mod core;
/// Declarations read from configuration.
pub mod models;
pub mod system;
