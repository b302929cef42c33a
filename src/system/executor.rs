// src/system/executor.rs

//! Process spawning for executable and foreign tasks.

use crate::CancellationToken;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Failures spawning or supervising a child process.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The command line does not split into words.
    #[error("Command could not be parsed: {0}")]
    CommandParse(String),
    /// Nothing to run.
    #[error("No command specified to run.")]
    EmptyCommand,
    /// The process could not be spawned or waited on.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    /// A redirection file could not be opened.
    #[error("Could not redirect {stream} to '{path}': {source}")]
    Redirect {
        stream: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The user interrupted the child.
    #[error("Operation was cancelled by the user.")]
    Cancelled,
}

/// Standard-stream redirection for one task invocation.
///
/// Unset streams are inherited from the enclosing invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Redirection {
    /// File read as standard input.
    pub stdin: Option<PathBuf>,
    /// File receiving standard output.
    pub stdout: Option<PathBuf>,
    /// File receiving standard error.
    pub stderr: Option<PathBuf>,
    /// Append to stdout/stderr files instead of truncating them.
    pub append: bool,
}

impl Redirection {
    /// True when no stream is redirected.
    pub fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }

    /// Fills the streams this redirection leaves unset from `base`.
    pub fn over(&self, base: &Redirection) -> Redirection {
        Redirection {
            stdin: self.stdin.clone().or_else(|| base.stdin.clone()),
            stdout: self.stdout.clone().or_else(|| base.stdout.clone()),
            stderr: self.stderr.clone().or_else(|| base.stderr.clone()),
            append: if self.stdout.is_some() || self.stderr.is_some() {
                self.append
            } else {
                base.append
            },
        }
    }

    /// Sends stdout to the null device unless it is already redirected.
    pub fn hushed(mut self) -> Redirection {
        if self.stdout.is_none() {
            self.stdout = Some(null_device());
        }
        self
    }

    fn open_output(&self, path: &Path, stream: &'static str) -> Result<File, ExecutionError> {
        let mut options = OpenOptions::new();
        options.create(true);
        if self.append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        options.open(path).map_err(|e| ExecutionError::Redirect {
            stream,
            path: path.display().to_string(),
            source: e,
        })
    }

    fn stdio(&self) -> Result<(Stdio, Stdio, Stdio), ExecutionError> {
        let stdin = match &self.stdin {
            Some(path) => Stdio::from(File::open(path).map_err(|e| ExecutionError::Redirect {
                stream: "stdin",
                path: path.display().to_string(),
                source: e,
            })?),
            None => Stdio::inherit(),
        };
        let stdout = match &self.stdout {
            Some(path) => Stdio::from(self.open_output(path, "stdout")?),
            None => Stdio::inherit(),
        };
        let stderr = match &self.stderr {
            Some(path) => Stdio::from(self.open_output(path, "stderr")?),
            None => Stdio::inherit(),
        };
        Ok((stdin, stdout, stderr))
    }
}

/// The platform's bit bucket.
pub fn null_device() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from("NUL")
    } else {
        PathBuf::from("/dev/null")
    }
}

/// Runs external programs on behalf of executable and foreign tasks.
pub trait ProcessRunner {
    /// Runs `command_line` to completion and returns its exit status.
    fn run(
        &mut self,
        command_line: &str,
        env_vars: &HashMap<String, String>,
        redirection: &Redirection,
    ) -> Result<i32, ExecutionError>;
}

/// Spawns real processes, polling so a cancellation request can kill the child.
#[derive(Debug, Clone, Default)]
pub struct LiveProcessRunner {
    cancellation_token: CancellationToken,
}

impl LiveProcessRunner {
    /// A runner that kills its child when `cancellation_token` is set.
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self { cancellation_token }
    }
}

impl ProcessRunner for LiveProcessRunner {
    fn run(
        &mut self,
        command_line: &str,
        env_vars: &HashMap<String, String>,
        redirection: &Redirection,
    ) -> Result<i32, ExecutionError> {
        let command_line = command_line.trim();
        if command_line.is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }

        let parts = shlex::split(command_line)
            .ok_or_else(|| ExecutionError::CommandParse(command_line.to_string()))?;
        let Some((program, args)) = parts.split_first() else {
            return Err(ExecutionError::EmptyCommand);
        };
        let program = dunce::simplified(Path::new(program));

        let (stdin, stdout, stderr) = redirection.stdio()?;
        let mut command = StdCommand::new(program);
        command
            .args(args)
            .envs(env_vars)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr);

        log::debug!("Spawning '{}'", command_line);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound && cfg!(target_os = "windows") => {
                log::debug!("Command '{}' not found. Retrying with cmd /C.", program.display());
                let (stdin, stdout, stderr) = redirection.stdio()?;
                StdCommand::new("cmd")
                    .arg("/C")
                    .arg(command_line)
                    .envs(env_vars)
                    .stdin(stdin)
                    .stdout(stdout)
                    .stderr(stderr)
                    .spawn()
                    .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?
            }
            Err(e) => return Err(ExecutionError::CommandFailed(command_line.to_string(), e)),
        };

        // Non-blocking wait loop to allow for cancellation.
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status.code().unwrap_or(-1)),
                Ok(None) => {
                    if self.cancellation_token.load(Ordering::SeqCst) {
                        log::debug!(
                            "Cancellation requested, killing child process (PID: {})...",
                            child.id()
                        );
                        if let Err(e) = child.kill() {
                            log::warn!("Failed to kill child process {}: {}", child.id(), e);
                        }
                        child.wait().ok();
                        return Err(ExecutionError::Cancelled);
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(ExecutionError::CommandFailed(command_line.to_string(), e)),
            }
        }
    }
}

/// One invocation seen by a [`RecordingRunner`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// The command as handed to the runner.
    pub command_line: String,
    /// Redirection in effect for the call.
    pub redirection: Redirection,
}

/// Runner double: records every command and answers with queued exit statuses (0 once drained).
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    statuses: Vec<i32>,
}

impl RecordingRunner {
    /// A runner that always reports success.
    pub fn new() -> Self {
        Self::default()
    }

    /// A runner answering with `statuses` in order.
    pub fn with_statuses(statuses: impl IntoIterator<Item = i32>) -> Self {
        let mut statuses: Vec<i32> = statuses.into_iter().collect();
        statuses.reverse();
        Self {
            calls: Arc::default(),
            statuses,
        }
    }

    /// Shared handle to the call log; stays valid after the runner is boxed into a session.
    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

impl ProcessRunner for RecordingRunner {
    fn run(
        &mut self,
        command_line: &str,
        _env_vars: &HashMap<String, String>,
        redirection: &Redirection,
    ) -> Result<i32, ExecutionError> {
        if command_line.trim().is_empty() {
            return Err(ExecutionError::EmptyCommand);
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                command_line: command_line.to_string(),
                redirection: redirection.clone(),
            });
        }
        Ok(self.statuses.pop().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_redirection_layering() {
        let base = Redirection {
            stdout: Some(PathBuf::from("outer.log")),
            append: true,
            ..Redirection::default()
        };
        let inner = Redirection {
            stderr: Some(PathBuf::from("err.log")),
            ..Redirection::default()
        };
        let merged = inner.over(&base);
        assert_eq!(merged.stdout, Some(PathBuf::from("outer.log")));
        assert_eq!(merged.stderr, Some(PathBuf::from("err.log")));
        assert!(!merged.append);

        assert_eq!(Redirection::default().hushed().stdout, Some(null_device()));
        assert_eq!(base.clone().hushed().stdout, Some(PathBuf::from("outer.log")));
    }

    #[test]
    fn test_recording_runner_returns_queued_statuses() {
        let mut runner = RecordingRunner::with_statuses([3, 0]);
        let log = runner.calls();
        let env = HashMap::new();
        assert_eq!(runner.run("ls -l", &env, &Redirection::default()).unwrap(), 3);
        assert_eq!(runner.run("ls", &env, &Redirection::default()).unwrap(), 0);
        assert_eq!(runner.run("ls", &env, &Redirection::default()).unwrap(), 0);
        assert_eq!(log.lock().unwrap().len(), 3);
        assert_eq!(log.lock().unwrap()[0].command_line, "ls -l");
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let mut runner = LiveProcessRunner::new(Arc::new(AtomicBool::new(false)));
        let result = runner.run("   ", &HashMap::new(), &Redirection::default());
        assert!(matches!(result, Err(ExecutionError::EmptyCommand)));
    }

    #[cfg(unix)]
    #[test]
    fn test_live_runner_reports_status_and_redirects_stdout() {
        // --- Setup ---
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let redirection = Redirection {
            stdout: Some(out.clone()),
            ..Redirection::default()
        };
        let mut runner = LiveProcessRunner::default();

        // --- Execute ---
        let ok = runner.run("echo hello", &HashMap::new(), &redirection).unwrap();
        let failed = runner.run("false", &HashMap::new(), &Redirection::default()).unwrap();

        // --- Assert ---
        assert_eq!(ok, 0);
        assert_ne!(failed, 0);
        assert_eq!(std::fs::read_to_string(out).unwrap().trim(), "hello");
    }
}
