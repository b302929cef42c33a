//! # System Interaction Layer
//!
//! Boundaries between the parameter engine and the outside world.
//!
//! ## Modules
//!
//! - **`executor`**: Spawns external programs for executable and foreign tasks, with
//!   stream redirection and graceful cancellation (`Ctrl+C`).
//! - **`procedure`**: The compiled-procedure contract for script and package tasks.
//! - **`prompt`**: Interactive prompting for query-mode parameters and cursor reads.

pub mod executor;
pub mod procedure;
pub mod prompt;
