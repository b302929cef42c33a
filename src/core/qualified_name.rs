// src/core/qualified_name.rs

//! Parsing of dotted parameter references.

use std::fmt;
use thiserror::Error;

/// A parameter reference that does not parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Empty names or too many dotted segments.
    #[error("Illegal syntax for parameter: {0}")]
    IllegalSyntax(String),
    /// A subscript that is not a positive integer in brackets.
    #[error("Illegal syntax for array parameter: {0}")]
    IllegalSubscript(String),
}

/// A parsed `[[package.]task.]param[index][.p_field]` reference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QualifiedName {
    /// Package prefix.
    pub package: Option<String>,
    /// Task part; `_` stands for the current package.
    pub task: Option<String>,
    /// Parameter name, possibly abbreviated.
    pub param: String,
    /// Zero-based; the written form is one-based.
    pub index: Option<usize>,
    /// A trailing `p_` field.
    pub field: Option<String>,
}

impl QualifiedName {
    /// Splits a dotted reference into its parts.
    pub fn parse(text: &str) -> Result<Self, NameError> {
        let mut segments: Vec<&str> = text.split('.').collect();

        let field = match segments.last() {
            Some(last) if segments.len() > 1 && last.starts_with("p_") => {
                segments.pop().map(str::to_string)
            }
            _ => None,
        };
        let raw_param = segments
            .pop()
            .ok_or_else(|| NameError::IllegalSyntax(text.to_string()))?;
        if segments.len() > 2 {
            return Err(NameError::IllegalSyntax(text.to_string()));
        }
        let task = segments.pop().map(str::to_string);
        let package = segments.pop().map(str::to_string);

        let (param, index) = match raw_param.split_once('[') {
            Some((param, rest)) => {
                let subscript: usize = rest
                    .strip_suffix(']')
                    .and_then(|inner| inner.trim().parse().ok())
                    .ok_or_else(|| NameError::IllegalSubscript(text.to_string()))?;
                if subscript == 0 {
                    return Err(NameError::IllegalSubscript(text.to_string()));
                }
                (param, Some(subscript - 1))
            }
            None => (raw_param, None),
        };
        if param.is_empty() {
            return Err(NameError::IllegalSyntax(text.to_string()));
        }

        Ok(QualifiedName {
            package,
            task,
            param: param.to_string(),
            index,
            field,
        })
    }

    /// The parameter part with its subscript and field, as forwarded to another task.
    pub fn local_part(&self) -> String {
        let mut text = self.param.clone();
        if let Some(index) = self.index {
            text.push_str(&format!("[{}]", index + 1));
        }
        if let Some(field) = &self.field {
            text.push('.');
            text.push_str(field);
        }
        text
    }

    /// `package.task` or `task`, when a task is named.
    pub(crate) fn task_reference(&self) -> Option<String> {
        let task = self.task.as_ref()?;
        Some(match &self.package {
            Some(package) => format!("{}.{}", package, task),
            None => task.clone(),
        })
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(task) = self.task_reference() {
            write!(f, "{}.", task)?;
        }
        write!(f, "{}", self.local_part())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_form() {
        let name = QualifiedName::parse("images.imstat.fields[2].p_value").unwrap();
        assert_eq!(name.package.as_deref(), Some("images"));
        assert_eq!(name.task.as_deref(), Some("imstat"));
        assert_eq!(name.param, "fields");
        assert_eq!(name.index, Some(1));
        assert_eq!(name.field.as_deref(), Some("p_value"));
        assert_eq!(name.to_string(), "images.imstat.fields[2].p_value");
    }

    #[test]
    fn test_bare_and_task_forms() {
        let bare = QualifiedName::parse("nlines").unwrap();
        assert_eq!((bare.package.as_deref(), bare.task.as_deref()), (None, None));

        let task = QualifiedName::parse("imstat.nlines").unwrap();
        assert_eq!(task.task.as_deref(), Some("imstat"));
        assert_eq!(task.task_reference().as_deref(), Some("imstat"));

        let field_only = QualifiedName::parse("nlines.p_min").unwrap();
        assert!(field_only.task.is_none());
        assert_eq!(field_only.field.as_deref(), Some("p_min"));

        let package = QualifiedName::parse("_.version").unwrap();
        assert_eq!(package.task.as_deref(), Some("_"));
    }

    #[test]
    fn test_too_many_segments_is_illegal() {
        assert_eq!(
            QualifiedName::parse("a.b.c.d"),
            Err(NameError::IllegalSyntax("a.b.c.d".to_string()))
        );
    }

    #[test]
    fn test_bad_subscripts() {
        assert!(matches!(QualifiedName::parse("arr[0]"), Err(NameError::IllegalSubscript(_))));
        assert!(matches!(QualifiedName::parse("arr[x]"), Err(NameError::IllegalSubscript(_))));
        assert!(matches!(QualifiedName::parse("arr[2"), Err(NameError::IllegalSubscript(_))));
        assert!(matches!(QualifiedName::parse("arr[2]x"), Err(NameError::IllegalSubscript(_))));
        assert!(matches!(QualifiedName::parse(""), Err(NameError::IllegalSyntax(_))));
    }
}
