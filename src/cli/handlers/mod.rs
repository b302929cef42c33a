// src/cli/handlers/mod.rs

/// `check`: validate par files.
pub mod check;
/// Argument helpers shared by the handlers.
pub mod commons;
/// `dpar`: dump parameters as assignments or JSON.
pub mod dpar;
/// `get`: read one parameter.
pub mod get;
/// `lpar`: list parameters.
pub mod lpar;
/// `run`: run a task.
pub mod run;
/// `set`: assign one parameter and save it.
pub mod set;
/// `unlearn`: reset a task to its defaults.
pub mod unlearn;
