// src/core/par_list.rs

//! Ordered, name-indexed parameter lists and `.par` file I/O.

use crate::constants::{MODE_PARAM, NARGS_PARAM};
use crate::core::minmatch::{MinMatch, min_match};
use crate::core::parameter::{ParKind, ParamError, Parameter};
use crate::core::tokenizer::{GrammarError, RecordReader};
use crate::core::value::NativeValue;
use crate::system::prompt::Interaction;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures reading or writing a par file.
#[derive(Error, Debug)]
pub enum ParFileError {
    /// The file could not be opened.
    #[error("Failed to open parameter file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    /// A record that does not tokenize.
    #[error(transparent)]
    Grammar(#[from] GrammarError),
    /// A record that does not define a valid parameter.
    #[error("{file}:{line_number}: {source}\n{line}")]
    Invalid {
        file: String,
        line_number: usize,
        line: String,
        #[source]
        source: ParamError,
    },
    /// The same name declared twice.
    #[error("{file}:{line_number}: Duplicate parameter {name}\n{line}")]
    Duplicate {
        file: String,
        line_number: usize,
        line: String,
        name: String,
    },
    /// The file could not be written.
    #[error("Failed to write parameter file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Failures looking up, reading or assigning parameters of a list.
#[derive(Error, Debug)]
pub enum ParListError {
    /// No parameter matches the name.
    #[error("Unknown parameter '{name}' for {list}")]
    UnknownParameter { name: String, list: String },
    /// The abbreviation matches several parameters.
    #[error("Ambiguous parameter '{name}' for {list}\nCould be any of {candidates:?}")]
    AmbiguousParameter {
        name: String,
        list: String,
        candidates: Vec<String>,
    },
    /// A list built with the same name twice.
    #[error("Duplicate parameter {name} in {list}")]
    DuplicateParameter { name: String, list: String },
    /// Graphics cursors cannot be indexed or read without prompting.
    #[error("Parameter {name} is graphics cursor, cannot use index or prompt")]
    CursorAccess { name: String },
    /// The cursor device failed.
    #[error("Failed to read graphics cursor for parameter {name}: {source}")]
    Cursor {
        name: String,
        #[source]
        source: io::Error,
    },
    /// More positional arguments than non-hidden parameters.
    #[error("Too many positional arguments for {list} ({given} given, {allowed} allowed)")]
    TooManyArguments {
        list: String,
        given: usize,
        allowed: usize,
    },
    /// A parameter assigned both positionally and by keyword, or twice by keyword.
    #[error("Parameter {name} given more than once in call to {list}")]
    DuplicateArgument { name: String, list: String },
    /// Failure inside one parameter.
    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Options for [`ParList::get`].
#[derive(Debug, Clone, Copy)]
pub struct GetOptions<'a> {
    /// A `p_` field to read instead of the value.
    pub field: Option<&'a str>,
    /// Zero-based array index.
    pub index: Option<usize>,
    /// Solicit query-mode parameters interactively.
    pub prompt: bool,
}

impl Default for GetOptions<'_> {
    fn default() -> Self {
        Self {
            field: None,
            index: None,
            prompt: true,
        }
    }
}

impl<'a> GetOptions<'a> {
    /// Reads without soliciting query parameters.
    pub fn no_prompt() -> Self {
        Self {
            prompt: false,
            ..Self::default()
        }
    }

    /// Selects a `p_` field.
    pub fn with_field(mut self, field: Option<&'a str>) -> Self {
        self.field = field;
        self
    }

    /// Selects an array element.
    pub fn with_index(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }
}

/// The parameters of one task, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParList {
    name: String,
    file: Option<PathBuf>,
    params: Vec<Parameter>,
    index: HashMap<String, usize>,
}

/// Parameters that positional call arguments fill.
fn is_positional(par: &Parameter) -> bool {
    !par.is_hidden() && par.name() != NARGS_PARAM
}

impl ParList {
    /// Builds a list from already-constructed parameters, adding `$nargs` if absent.
    pub fn from_params(
        name: impl Into<String>,
        params: Vec<Parameter>,
    ) -> Result<Self, ParListError> {
        let mut list = ParList {
            name: name.into(),
            file: None,
            params: Vec::with_capacity(params.len() + 1),
            index: HashMap::new(),
        };
        for par in params {
            if list.index.contains_key(par.name()) {
                return Err(ParListError::DuplicateParameter {
                    name: par.name().to_string(),
                    list: list.name.clone(),
                });
            }
            list.push(par);
        }
        list.ensure_nargs();
        Ok(list)
    }

    /// Reads a `.par` file.
    pub fn read(name: &str, path: &Path, strict: bool) -> Result<Self, ParFileError> {
        let file = File::open(path).map_err(|e| ParFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut list = Self::from_reader(
            name,
            BufReader::new(file),
            &path.display().to_string(),
            strict,
        )?;
        list.file = Some(path.to_path_buf());
        log::debug!(
            "Read {} parameters for '{}' from {}",
            list.len(),
            name,
            path.display()
        );
        Ok(list)
    }

    /// Parses par-file records from any line source; `label` names it in errors.
    pub fn from_reader<R: BufRead>(
        name: &str,
        source: R,
        label: &str,
        strict: bool,
    ) -> Result<Self, ParFileError> {
        let mut list = ParList {
            name: name.to_string(),
            file: None,
            params: Vec::new(),
            index: HashMap::new(),
        };
        for record in RecordReader::new(source, label, strict) {
            let record = record?;
            let par = Parameter::from_fields(&record.fields, strict).map_err(|e| {
                ParFileError::Invalid {
                    file: label.to_string(),
                    line_number: record.line_number,
                    line: record.line.clone(),
                    source: e,
                }
            })?;
            if list.index.contains_key(par.name()) {
                return Err(ParFileError::Duplicate {
                    file: label.to_string(),
                    line_number: record.line_number,
                    line: record.line,
                    name: par.name().to_string(),
                });
            }
            list.push(par);
        }
        list.ensure_nargs();
        Ok(list)
    }

    fn push(&mut self, par: Parameter) {
        self.index.insert(par.name().to_string(), self.params.len());
        self.params.push(par);
    }

    fn ensure_nargs(&mut self) {
        if !self.index.contains_key(NARGS_PARAM) {
            self.push(Parameter::nargs());
        }
    }

    /// Name of the owning task.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The par file this list was read from or last saved to.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Records where the list lives on disk.
    pub fn set_file(&mut self, file: Option<PathBuf>) {
        self.file = file;
    }

    /// Number of parameters, `$nargs` included.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when the list declares nothing.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// All parameters in declaration order.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name())
    }

    /// Exact-name membership test.
    pub fn has_param(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Exact-name access without abbreviation.
    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.index.get(name).and_then(|&i| self.params.get(i))
    }

    /// Exact-name mutable access.
    pub fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        let i = *self.index.get(name)?;
        self.params.get_mut(i)
    }

    fn unknown(&self, name: &str) -> ParListError {
        ParListError::UnknownParameter {
            name: name.to_string(),
            list: self.name.clone(),
        }
    }

    /// The parameter at a position `resolve` returned for `name`.
    fn at_mut(&mut self, i: usize, name: &str) -> Result<&mut Parameter, ParListError> {
        match self.params.get_mut(i) {
            Some(par) => Ok(par),
            None => Err(ParListError::UnknownParameter {
                name: name.to_string(),
                list: self.name.clone(),
            }),
        }
    }

    fn resolve(&self, name: &str) -> Result<usize, ParListError> {
        if let Some(&i) = self.index.get(name) {
            return Ok(i);
        }
        match min_match(name, self.names()) {
            MinMatch::Unique(found) => self.index.get(found).copied().ok_or_else(|| self.unknown(name)),
            MinMatch::NoMatch => Err(self.unknown(name)),
            MinMatch::Ambiguous(hits) => Err(ParListError::AmbiguousParameter {
                name: name.to_string(),
                list: self.name.clone(),
                candidates: hits.into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Abbreviation-aware lookup.
    pub fn lookup(&self, name: &str) -> Result<&Parameter, ParListError> {
        let i = self.resolve(name)?;
        self.params.get(i).ok_or_else(|| self.unknown(name))
    }

    /// Abbreviation-aware mutable lookup.
    pub fn lookup_mut(&mut self, name: &str) -> Result<&mut Parameter, ParListError> {
        let i = self.resolve(name)?;
        self.at_mut(i, name)
    }

    /// Handles cursor reads and query prompting ahead of a value read.
    ///
    /// Returns the cursor reading when the parameter is a graphics cursor.
    fn prepare_get(
        par: &mut Parameter,
        options: GetOptions<'_>,
        interaction: Option<&mut Interaction>,
    ) -> Result<Option<String>, ParListError> {
        if par.kind() == ParKind::GCur {
            if options.index.is_some() || !options.prompt {
                return Err(ParListError::CursorAccess {
                    name: par.name().to_string(),
                });
            }
            if options.field.is_some() {
                return Ok(None);
            }
            return match interaction {
                Some(interaction) => interaction
                    .cursor
                    .read_cursor(par.name())
                    .map(Some)
                    .map_err(|e| ParListError::Cursor {
                        name: par.name().to_string(),
                        source: e,
                    }),
                None => Ok(Some(par.value_string())),
            };
        }
        if options.prompt
            && options.field.is_none()
            && par.is_query()
            && let Some(interaction) = interaction
        {
            par.prompt_for_value(interaction.prompter.as_mut())?;
        }
        Ok(None)
    }

    /// Reads a parameter (or one field or element of it) as a string.
    pub fn get(
        &mut self,
        name: &str,
        options: GetOptions<'_>,
        interaction: Option<&mut Interaction>,
    ) -> Result<String, ParListError> {
        let par = self.lookup_mut(name)?;
        if let Some(reading) = Self::prepare_get(par, options, interaction)? {
            return Ok(reading);
        }
        Ok(par.get(options.field, options.index)?)
    }

    /// Reads a parameter as a typed value.
    pub fn get_native(
        &mut self,
        name: &str,
        options: GetOptions<'_>,
        interaction: Option<&mut Interaction>,
    ) -> Result<NativeValue, ParListError> {
        let par = self.lookup_mut(name)?;
        if let Some(reading) = Self::prepare_get(par, options, interaction)? {
            return Ok(NativeValue::Str(reading));
        }
        Ok(par.get_native(options.field, options.index)?)
    }

    /// Assigns a value (or a field or element) with coercion and, when `check` is set, validation.
    pub fn set(
        &mut self,
        name: &str,
        value: &NativeValue,
        field: Option<&str>,
        index: Option<usize>,
        check: bool,
    ) -> Result<(), ParListError> {
        Ok(self.lookup_mut(name)?.set(value, field, index, check)?)
    }

    /// The task mode carried by the `mode` parameter, if the list has one.
    pub fn mode(&self) -> Option<String> {
        self.param(MODE_PARAM).map(|p| p.value_string())
    }

    /// True when both lists declare the same parameters with the same types and sizes.
    pub fn is_consistent(&self, other: &ParList) -> bool {
        self.params.len() == other.params.len()
            && self.params.iter().all(|par| {
                other.param(par.name()).is_some_and(|o| {
                    o.type_code() == par.type_code() && o.dim() == par.dim()
                })
            })
    }

    /// Applies call-site arguments to this (ephemeral) list.
    ///
    /// Positional values fill the non-hidden parameters in order; keywords are
    /// abbreviation-matched. `$nargs` receives the positional count.
    pub fn set_par_list(
        &mut self,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
    ) -> Result<(), ParListError> {
        let allowed = self.params.iter().filter(|p| is_positional(p)).count();
        if args.len() > allowed {
            return Err(ParListError::TooManyArguments {
                list: self.name.clone(),
                given: args.len(),
                allowed,
            });
        }

        let mut assigned = HashSet::new();
        let positional = self
            .params
            .iter_mut()
            .enumerate()
            .filter(|(_, p)| is_positional(p));
        for (value, (i, par)) in args.iter().zip(positional) {
            par.set(value, None, None, true)?;
            par.set_cmdline(true);
            assigned.insert(i);
        }
        for (key, value) in keywords {
            let i = self.resolve(key)?;
            let list = self.name.clone();
            let par = self.at_mut(i, key)?;
            if !assigned.insert(i) {
                return Err(ParListError::DuplicateArgument {
                    name: par.name().to_string(),
                    list,
                });
            }
            par.set(value, None, None, true)?;
            par.set_cmdline(true);
        }

        if let Some(nargs) = self.param_mut(NARGS_PARAM) {
            let count = i64::try_from(args.len()).unwrap_or(i64::MAX);
            nargs.set(&NativeValue::Int(count), None, None, false)?;
        }
        Ok(())
    }

    /// Resets the changed and command-line flags of every parameter.
    pub fn clear_flags(&mut self) {
        for par in &mut self.params {
            par.set_changed(false);
            par.set_cmdline(false);
        }
    }

    /// Rewrites automatic (`a`) modes with the task's effective mode.
    pub fn apply_auto_mode(&mut self, mode: &str) {
        for par in &mut self.params {
            par.resolve_auto_mode(mode);
        }
    }

    /// Copies back every parameter of `run` that changed, or that was given on
    /// the command line and is in learn mode. Returns true if anything was copied.
    pub fn merge_from(&mut self, run: &ParList) -> bool {
        let mut merged = false;
        for par in &run.params {
            if par.name() == NARGS_PARAM {
                continue;
            }
            if !(par.is_changed() || (par.is_cmdline() && par.is_learn())) {
                continue;
            }
            if let Some(target) = self.param_mut(par.name()) {
                target.merge_from(par);
                merged = true;
            }
        }
        merged
    }

    /// Writes every parameter in par-file grammar.
    pub fn serialize<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for par in &self.params {
            writeln!(out, "{}", par.to_record())?;
        }
        Ok(())
    }

    /// Writes the list to `path` atomically (temporary file, then rename).
    pub fn save(&self, path: &Path) -> Result<(), ParFileError> {
        let write_error = |e: io::Error| ParFileError::Write {
            path: path.display().to_string(),
            source: e,
        };
        let parent = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(write_error)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
        self.serialize(&mut temp).map_err(write_error)?;
        temp.persist(path).map_err(|e| write_error(e.error))?;
        log::debug!("Saved parameters for '{}' to {}", self.name, path.display());
        Ok(())
    }

    /// The `lpar` listing, one parameter per line (`$nargs` omitted).
    pub fn lpar(&self, verbose: bool) -> String {
        self.params
            .iter()
            .filter(|p| p.name() != NARGS_PARAM)
            .map(|p| p.pretty(verbose))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// The `dpar` dump: `task.param = value` lines terminated by `# EOF`.
    pub fn dpar(&self, task: &str) -> String {
        let mut lines: Vec<String> = self
            .params
            .iter()
            .filter(|p| p.name() != NARGS_PARAM)
            .map(|p| format!("{}.{} = {}", task, p.name(), p.dump_value()))
            .collect();
        lines.push("# EOF".to_string());
        lines.join("\n")
    }
}
