// src/core/tokenizer.rs

//! Splits parameter-file records into raw fields.
//!
//! A record is one logical line of a `.par` file. Physical lines are joined when
//! a line ends in an odd number of backslashes, or when a quoted field is still
//! open at the end of the line (the next line is appended and the scan restarts
//! at the same field).

use std::io::{BufRead, Cursor};
use thiserror::Error;

/// Record-level syntax errors, with the offending location.
#[derive(Error, Debug)]
pub enum GrammarError {
    /// Text between a closing quote and the next comma.
    #[error("{file}:{line_number}: non-blank follows quoted string\n{line}")]
    NonBlankAfterQuote {
        file: String,
        line_number: usize,
        line: String,
    },
    /// A quote still open at end of input.
    #[error("{file}:{line_number}: unmatched quote\n{line}")]
    UnmatchedQuote {
        file: String,
        line_number: usize,
        line: String,
    },
    /// In strict mode, an unquoted field ending in a quote.
    #[error("{file}:{line_number}: unquoted string has trailing quote\n{line}")]
    TrailingQuote {
        file: String,
        line_number: usize,
        line: String,
    },
    /// The source could not be read.
    #[error("Failed to read '{file}': {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// One logical record with its raw fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Line number (1-based) of the first physical line of the record.
    pub line_number: usize,
    /// The logical line after continuation lines were joined.
    pub line: String,
    /// Raw field values, quotes and escapes removed.
    pub fields: Vec<String>,
}

/// Outcome of scanning one field at a given offset.
enum FieldScan {
    Field { value: String, end: usize },
    /// A quote was opened but not closed before the end of the text.
    Unterminated,
    NonBlankAfterQuote,
    TrailingQuote,
}

/// Pulls logical records out of a line source, reading continuation lines on demand.
pub struct RecordReader<R: BufRead> {
    source: R,
    file: String,
    line_number: usize,
    strict: bool,
}

impl<R: BufRead> RecordReader<R> {
    /// Wraps `source`; `file` is only used in error messages.
    pub fn new(source: R, file: impl Into<String>, strict: bool) -> Self {
        Self {
            source,
            file: file.into(),
            line_number: 0,
            strict,
        }
    }

    /// The name used in error messages.
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Reads one physical line without its line terminator. `None` at end of input.
    fn read_physical(&mut self) -> Result<Option<String>, GrammarError> {
        let mut buf = String::new();
        let read = self
            .source
            .read_line(&mut buf)
            .map_err(|e| GrammarError::Io {
                file: self.file.clone(),
                source: e,
            })?;
        if read == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some(buf))
    }

    /// Returns the next record, skipping blank lines, `#` comments and the `...` sentinel.
    pub fn next_record(&mut self) -> Result<Option<Record>, GrammarError> {
        loop {
            let Some(raw) = self.read_physical()? else {
                return Ok(None);
            };
            let mut line = raw.trim().to_string();
            if line.is_empty() || line.starts_with('#') || line == "..." {
                continue;
            }
            let line_number = self.line_number;

            while line.ends_with('\\') {
                let trailing = line.len() - line.trim_end_matches('\\').len();
                if trailing % 2 == 0 {
                    break;
                }
                line.pop();
                match self.read_physical()? {
                    Some(next) => line.push_str(next.trim_end()),
                    None => break,
                }
            }

            let fields = self.split_fields(&mut line, line_number)?;
            return Ok(Some(Record {
                line_number,
                line,
                fields,
            }));
        }
    }

    fn split_fields(
        &mut self,
        line: &mut String,
        line_number: usize,
    ) -> Result<Vec<String>, GrammarError> {
        let mut fields = Vec::new();
        let mut pos = 0;
        while pos < line.len() {
            match scan_field(line, pos, self.strict) {
                FieldScan::Field { value, end } => {
                    fields.push(value);
                    pos = end;
                }
                FieldScan::Unterminated => match self.read_physical()? {
                    Some(next) => {
                        line.push('\n');
                        line.push_str(next.trim_end());
                    }
                    None => {
                        return Err(GrammarError::UnmatchedQuote {
                            file: self.file.clone(),
                            line_number,
                            line: line.clone(),
                        });
                    }
                },
                FieldScan::NonBlankAfterQuote => {
                    return Err(GrammarError::NonBlankAfterQuote {
                        file: self.file.clone(),
                        line_number,
                        line: line.clone(),
                    });
                }
                FieldScan::TrailingQuote => {
                    return Err(GrammarError::TrailingQuote {
                        file: self.file.clone(),
                        line_number,
                        line: line.clone(),
                    });
                }
            }
        }
        Ok(fields)
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<Record, GrammarError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Tokenizes a single record given as text (continuation lines may be embedded).
pub fn split_record(text: &str) -> Result<Vec<String>, GrammarError> {
    let mut reader = RecordReader::new(Cursor::new(text.as_bytes()), "<string>", false);
    Ok(reader
        .next_record()?
        .map(|record| record.fields)
        .unwrap_or_default())
}

/// Splits `text` at its first comma: the field body and the offset just past the comma
/// (or `text.len()` when there is none).
fn up_to_comma(text: &str) -> (&str, usize) {
    match text.split_once(',') {
        Some((body, _)) => (body, body.len() + 1),
        None => (text, text.len()),
    }
}

fn scan_field(line: &str, start: usize, strict: bool) -> FieldScan {
    let rest = line.get(start..).unwrap_or("");
    let trimmed = rest.trim_start_matches([' ', '\t']);
    let pos = line.len() - trimmed.len();
    let Some(quote) = trimmed.chars().next() else {
        return FieldScan::Field {
            value: String::new(),
            end: line.len(),
        };
    };

    if quote != '"' && quote != '\'' {
        let (body, consumed) = up_to_comma(trimmed);
        let value = body.trim_end();
        if strict && (value.ends_with('"') || value.ends_with('\'')) {
            return FieldScan::TrailingQuote;
        }
        return FieldScan::Field {
            value: value.to_string(),
            end: pos + consumed,
        };
    }

    // Inside quotes a backslash escapes the quote character and itself; any
    // other escape is kept verbatim.
    let mut value = String::new();
    let mut chars = trimmed.char_indices().skip(1);
    let close = loop {
        let Some((offset, c)) = chars.next() else {
            return FieldScan::Unterminated;
        };
        match c {
            '\\' => match chars.next() {
                Some((_, next)) if next == quote || next == '\\' => value.push(next),
                Some((_, next)) => {
                    value.push('\\');
                    value.push(next);
                }
                None => return FieldScan::Unterminated,
            },
            c if c == quote => break pos + offset + c.len_utf8(),
            c => value.push(c),
        }
    };

    let after = line.get(close..).unwrap_or("");
    let (junk, consumed) = up_to_comma(after);
    if !junk.trim().is_empty() {
        return FieldScan::NonBlankAfterQuote;
    }
    FieldScan::Field {
        value,
        end: close + consumed,
    }
}
