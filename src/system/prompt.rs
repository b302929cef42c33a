// src/system/prompt.rs

//! Interactive channels: prompting for query-mode parameters and reading
//! graphics cursors.

use dialoguer::{Input, theme::ColorfulTheme};
use std::collections::VecDeque;
use std::io::{self, Write};

/// Line-oriented interactive channel used to solicit query-mode parameters.
pub trait Prompter {
    /// Shows a line of text. A line ending in `": "` is the prompt for the next read.
    fn write_line(&mut self, text: &str) -> io::Result<()>;
    /// Reads one line without its terminator. `None` means the input is exhausted.
    fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Source of graphics-cursor readings for `*gcur` parameters.
pub trait CursorProvider {
    /// Takes one reading on behalf of parameter `param`.
    fn read_cursor(&mut self, param: &str) -> io::Result<String>;
}

/// Prompts on the terminal through `dialoguer`.
///
/// Prompt lines are held back and shown as the label of the next input.
#[derive(Debug, Default)]
pub struct TerminalPrompter {
    pending: Option<String>,
}

impl TerminalPrompter {
    /// A prompter with no pending prompt.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Prompter for TerminalPrompter {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        if let Some(prompt) = text.strip_suffix(": ") {
            self.pending = Some(prompt.to_string());
            return Ok(());
        }
        let mut out = io::stdout().lock();
        writeln!(out, "{}", text)?;
        out.flush()
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        let prompt = self.pending.take().unwrap_or_default();
        let answer = Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text();
        match answer {
            Ok(line) => Ok(Some(line)),
            Err(dialoguer::Error::IO(e)) => match e.kind() {
                // Closed or non-interactive input counts as end of input.
                io::ErrorKind::UnexpectedEof | io::ErrorKind::NotConnected => {
                    log::debug!("Terminal input unavailable: {}", e);
                    Ok(None)
                }
                _ => Err(e),
            },
        }
    }
}

/// Answers prompts from a fixed queue and records everything written to it.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    transcript: Vec<String>,
}

impl ScriptedPrompter {
    /// A prompter that answers with `answers` in order.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    /// Every line written so far, prompts included.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }
}

impl Prompter for ScriptedPrompter {
    fn write_line(&mut self, text: &str) -> io::Result<()> {
        self.transcript.push(text.to_string());
        Ok(())
    }

    fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.answers.pop_front())
    }
}

/// Cursor provider for sessions without a graphics device.
#[derive(Debug, Default)]
pub struct NoCursor;

impl CursorProvider for NoCursor {
    fn read_cursor(&mut self, param: &str) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("no graphics cursor available to read '{}'", param),
        ))
    }
}

/// Returns queued cursor readings in order.
#[derive(Debug, Default)]
pub struct ScriptedCursor {
    readings: VecDeque<String>,
}

impl ScriptedCursor {
    /// A provider that returns `readings` in order.
    pub fn new<I, S>(readings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            readings: readings.into_iter().map(Into::into).collect(),
        }
    }
}

impl CursorProvider for ScriptedCursor {
    fn read_cursor(&mut self, param: &str) -> io::Result<String> {
        self.readings.pop_front().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("no cursor reading left for '{}'", param),
            )
        })
    }
}

/// The interactive collaborators a session talks to.
pub struct Interaction {
    /// Answers query-mode prompts.
    pub prompter: Box<dyn Prompter>,
    /// Supplies `*gcur` readings.
    pub cursor: Box<dyn CursorProvider>,
}

impl Interaction {
    /// Bundles a prompter and a cursor provider.
    pub fn new(prompter: Box<dyn Prompter>, cursor: Box<dyn CursorProvider>) -> Self {
        Self { prompter, cursor }
    }

    /// Terminal prompting without a graphics device.
    pub fn terminal() -> Self {
        Self::new(Box::new(TerminalPrompter::new()), Box::new(NoCursor))
    }
}

impl std::fmt::Debug for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interaction").finish_non_exhaustive()
    }
}
