// src/core/task.rs

//! Task definitions: naming rules, executable and parameter-file paths.

use crate::constants::{PAR_EXTENSION, UPARM_VAR};
use crate::core::package::PackageState;
use crate::core::par_list::{ParFileError, ParList, ParListError};
use crate::core::parameter::ParamError;
use crate::core::paths::{self, PathError};
use crate::core::qualified_name::NameError;
use crate::models::{TaskDecl, TaskKind};
use crate::system::executor::ExecutionError;
use crate::system::procedure::Procedure;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

lazy_static! {
    /// `$n`, `$*`, `$(n)` and `$(*)` in foreign command templates.
    static ref FOREIGN_ARG_RE: Regex =
        Regex::new(r"\$(?:([0-9]+)|(\*)|\(([0-9]+)\)|\((\*)\))").expect("foreign argument pattern is valid");
}

/// Errors from the task registry, resolution and runs.
#[derive(Error, Debug)]
pub enum TaskError {
    /// No task by that name is visible.
    #[error("Unknown task '{0}'")]
    UnknownTask(String),
    /// The abbreviation matches several tasks.
    #[error("Ambiguous task name '{name}'\nCould be any of {candidates:?}")]
    AmbiguousTask {
        name: String,
        candidates: Vec<String>,
    },
    /// No parameter by that name in the scope chain.
    #[error("Unknown parameter requested: {0}")]
    UnknownParameter(String),
    /// The abbreviation matches several parameters.
    #[error("Ambiguous parameter '{name}'\nCould be any of {candidates:?}")]
    AmbiguousParameter {
        name: String,
        candidates: Vec<String>,
    },
    /// A qualified parameter names a task that does not exist.
    #[error("Could not find task {task} to get parameter {name}")]
    TaskForParameter { task: String, name: String },
    /// The parameter reference does not parse.
    #[error(transparent)]
    Name(#[from] NameError),
    /// Indirections that lead back to a slot already visited.
    #[error("Indirection cycle while resolving {name}: {chain}")]
    IndirectionCycle { name: String, chain: String },
    /// Indirections nested beyond the limit.
    #[error("Indirection for {name} is nested more than {limit} levels deep")]
    IndirectionDepth { name: String, limit: usize },
    /// No binary directory holds the executable.
    #[error("Cannot find executable for task {task}\nTried {tried}")]
    ExecutableNotFound { task: String, tried: String },
    /// A task that needs a par file has none.
    #[error("Cannot find .par file for task {0}")]
    NoParFile(String),
    /// A task without parameters was asked to list or save them.
    #[error("Task {0} has no parameter file")]
    NoParameters(String),
    /// The declaration names no executable.
    #[error("No filename in task {task} definition: `{filename}'")]
    NoFilename { task: String, filename: String },
    /// The declared file has the wrong suffix for its kind.
    #[error("Bad filename for {kind} {task}: `{filename}'")]
    BadFilename {
        kind: &'static str,
        task: String,
        filename: String,
    },
    /// Psets must declare a par file.
    #[error("Pset {0} has no parameter file")]
    PsetWithoutParFile(String),
    /// Psets hold parameters only.
    #[error("Cannot execute Pset {0}")]
    PsetExecution(String),
    /// Foreign tasks only take positional arguments.
    #[error("Keyword parameters not permitted for foreign task {task}: {keys:?}")]
    ForeignKeywords { task: String, keys: Vec<String> },
    /// A package operation on a task.
    #[error("Task {0} is not a package")]
    NotAPackage(String),
    /// The package init has not run yet.
    #[error("Package {0} has not been loaded; no tasks are defined")]
    PackageNotLoaded(String),
    /// `bye` with an empty load path.
    #[error("No package is loaded")]
    NothingLoaded,
    /// A handle from another session.
    #[error("No task is registered under id {0}")]
    InvalidTaskId(usize),
    /// A run context used after its run ended.
    #[error("Run frame {0} is no longer active")]
    InactiveFrame(usize),
    /// Path expansion failed.
    #[error(transparent)]
    Path(#[from] PathError),
    /// The script compiler rejected the task.
    #[error("Failed to compile script for task {task}: {source}")]
    Compile {
        task: String,
        #[source]
        source: anyhow::Error,
    },
    /// The process runner failed.
    #[error("Error running task {task}\n{source}")]
    Execution {
        task: String,
        #[source]
        source: ExecutionError,
    },
    /// The child process reported failure.
    #[error("Task {task} exited with status {status}")]
    NonZeroExit { task: String, status: i32 },
    /// Parameter list failure.
    #[error(transparent)]
    List(#[from] ParListError),
    /// Single parameter failure.
    #[error(transparent)]
    Param(#[from] ParamError),
    /// A par file could not be read or written.
    #[error(transparent)]
    ParFile(#[from] ParFileError),
    /// A procedure body failed.
    #[error(transparent)]
    Procedure(#[from] anyhow::Error),
}

/// Handle to a task registered in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

/// One declared task.
pub struct Task {
    pub(crate) name: String,
    pub(crate) package: String,
    pub(crate) kind: TaskKind,
    pub(crate) binaries: Vec<String>,
    pub(crate) hidden: bool,
    pub(crate) has_par_file: bool,
    pub(crate) tb_flag: bool,
    /// Executable or script template; for foreign tasks the command template.
    pub(crate) filename: String,
    pub(crate) full_path: Option<String>,
    pub(crate) default_list: Option<ParList>,
    pub(crate) current_list: Option<ParList>,
    pub(crate) default_par_path: Option<PathBuf>,
    pub(crate) current_par_path: Option<PathBuf>,
    pub(crate) scrunch_par_path: Option<PathBuf>,
    pub(crate) procedure: Option<Arc<dyn Procedure>>,
    pub(crate) members: Option<PackageState>,
    pub(crate) initialized: bool,
}

/// Dots are reserved for qualified names.
fn sanitize(name: &str, what: &str) -> String {
    if name.contains('.') {
        let fixed = name.replace('.', "_");
        log::warn!("Illegal character '.' in {} name '{}' changed to '{}'", what, name, fixed);
        return fixed;
    }
    name.to_string()
}

impl Task {
    /// Builds a task from its declaration. `package` is the owning package and
    /// `inherited` the binary directories of that package.
    pub fn new(decl: &TaskDecl, package: &str, inherited: &[String]) -> Result<Self, TaskError> {
        // A leading `$` declares the task without a parameter file.
        let declared = decl.name.trim();
        let (declared, bare) = match declared.strip_prefix('$') {
            Some(rest) => (rest, true),
            None => (declared, false),
        };
        let name = sanitize(declared, "task");
        if name.is_empty() {
            return Err(TaskError::NoFilename {
                task: decl.name.clone(),
                filename: decl.file.clone(),
            });
        }
        let package = sanitize(package.trim(), "package");
        let kind = decl.resolved_kind();
        let file = decl.file.trim();
        let is_foreign = file.starts_with('$');

        let bad_filename = |kind: TaskKind| TaskError::BadFilename {
            kind: kind.label(),
            task: name.clone(),
            filename: file.to_string(),
        };
        match kind {
            TaskKind::Foreign if !is_foreign => return Err(bad_filename(kind)),
            TaskKind::Pset | TaskKind::Script | TaskKind::Package if is_foreign => {
                return Err(bad_filename(kind));
            }
            _ => {}
        }

        let mut has_par_file = !decl.no_par_file && !bare;
        if kind == TaskKind::Foreign && has_par_file {
            log::warn!("Foreign task '{}' cannot have a parameter file", name);
            has_par_file = false;
        }
        if kind == TaskKind::Pset && !has_par_file {
            return Err(TaskError::PsetWithoutParFile(name));
        }

        let filename = if is_foreign {
            foreign_template(&name, file)
        } else {
            file.to_string()
        };

        let mut binaries: Vec<String> = Vec::new();
        for bin in decl.binaries.iter().chain(inherited) {
            if !bin.is_empty() && !binaries.contains(bin) {
                binaries.push(bin.clone());
            }
        }

        Ok(Task {
            hidden: decl.hidden || name.starts_with('_'),
            tb_flag: decl.suffix.as_deref() == Some(".tb"),
            members: (kind == TaskKind::Package).then(PackageState::default),
            name,
            package,
            kind,
            binaries,
            has_par_file,
            filename,
            full_path: None,
            default_list: None,
            current_list: None,
            default_par_path: None,
            current_par_path: None,
            scrunch_par_path: None,
            procedure: None,
            initialized: false,
        })
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning package; empty for tasks declared outside any package.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// `package.name`, or the bare name for tasks outside any package.
    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() || self.package == self.name {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    /// Task kind.
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Hidden tasks are left out of package listings.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// False for tasks declared without parameters.
    pub fn has_par_file(&self) -> bool {
        self.has_par_file
    }

    /// Set for tasks declared with the `tb` suffix.
    pub fn tb_flag(&self) -> bool {
        self.tb_flag
    }

    /// File (or command template) as declared.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Binary directories searched for the executable.
    pub fn binaries(&self) -> &[String] {
        &self.binaries
    }

    /// Resolved executable or script path, once initialized.
    pub fn full_path(&self) -> Option<&str> {
        self.full_path.as_deref()
    }

    /// Parameters as read from the default par file.
    pub fn default_list(&self) -> Option<&ParList> {
        self.default_list.as_ref()
    }

    /// Parameters as of the last successful run.
    pub fn current_list(&self) -> Option<&ParList> {
        self.current_list.as_ref()
    }

    /// Default par file path.
    pub fn default_par_path(&self) -> Option<&Path> {
        self.default_par_path.as_deref()
    }

    /// Where the current list was last read from or saved to.
    pub fn current_par_path(&self) -> Option<&Path> {
        self.current_par_path.as_deref()
    }

    /// Saved par file path under `uparm`.
    pub fn scrunch_par_path(&self) -> Option<&Path> {
        self.scrunch_par_path.as_deref()
    }

    /// True once paths and par files are resolved.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True for package tasks.
    pub fn is_package(&self) -> bool {
        self.kind == TaskKind::Package
    }

    /// Whether a package's init procedure has run in this session.
    pub fn is_loaded(&self) -> bool {
        self.members.as_ref().is_some_and(|m| m.loaded)
    }

    /// Package membership; `None` for non-packages.
    pub fn members(&self) -> Option<&PackageState> {
        self.members.as_ref()
    }

    /// Short name used for the saved parameter file: the first two and last
    /// characters of the package, then the first five and last of the task.
    pub fn scrunch_name(&self) -> String {
        format!("{}{}", scrunch(&self.package, 2), scrunch(&self.name, 5))
    }

    /// Resolves the executable path. Binary directories are tried first, then
    /// the expanded filename itself.
    pub(crate) fn locate_executable(
        &self,
        vars: &HashMap<String, String>,
    ) -> Result<Option<String>, TaskError> {
        if self.kind == TaskKind::Foreign {
            return Ok(Some(self.filename.clone()));
        }
        if self.filename.is_empty() {
            return Ok(None);
        }
        let expanded = paths::expand(vars, &self.filename)?;
        let basename = Path::new(&expanded)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if basename.is_empty() {
            return Err(TaskError::NoFilename {
                task: self.name.clone(),
                filename: self.filename.clone(),
            });
        }

        let mut tried = Vec::new();
        for bin in &self.binaries {
            let candidate = paths::expand(vars, &format!("{}{}", bin, basename))?;
            if Path::new(&candidate).exists() {
                return Ok(Some(candidate));
            }
            tried.push(candidate);
        }
        if Path::new(&expanded).exists() {
            return Ok(Some(expanded));
        }
        tried.push(expanded);
        Err(TaskError::ExecutableNotFound {
            task: self.name.clone(),
            tried: tried.join(" and "),
        })
    }

    /// The canonical parameter file next to the executable, and the saved copy
    /// under `uparm`, when the task has parameters at all.
    pub(crate) fn par_file_paths(
        &self,
        vars: &HashMap<String, String>,
    ) -> Result<(Option<PathBuf>, Option<PathBuf>), TaskError> {
        if !self.has_par_file || self.filename.is_empty() {
            return Ok((None, None));
        }
        let expanded = paths::expand(vars, &self.filename)?;
        let base_dir = Path::new(&expanded)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let default_path = base_dir.join(format!("{}.{}", self.name, PAR_EXTENSION));

        let scrunch_path = match paths::expand(
            vars,
            &format!("{}${}.{}", UPARM_VAR, self.scrunch_name(), PAR_EXTENSION),
        ) {
            Ok(path) => Some(PathBuf::from(path)),
            Err(e) => {
                log::debug!("No uparm directory for '{}': {}", self.name, e);
                None
            }
        };
        Ok((Some(default_path), scrunch_path))
    }

    /// Builds the command line for a foreign task from its template and arguments.
    ///
    /// `$0` is the task name, `$n`/`$*` insert arguments and the parenthesized
    /// forms also expand virtual paths. Without any placeholder the arguments
    /// are appended.
    pub fn foreign_command_line(
        &self,
        args: &[String],
        vars: &HashMap<String, String>,
    ) -> Result<String, TaskError> {
        let template = &self.filename;
        let mut command = String::with_capacity(template.len());
        let mut last = 0;
        let mut substitutions = 0;

        for caps in FOREIGN_ARG_RE.captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            command.push_str(template.get(last..whole.start()).unwrap_or_default());
            last = whole.end();
            substitutions += 1;

            let replacement = if let Some(n) = caps.get(1) {
                self.positional(n.as_str(), args)
            } else if caps.get(2).is_some() {
                args.join(" ")
            } else if let Some(n) = caps.get(3) {
                paths::expand(vars, &self.positional(n.as_str(), args))?
            } else {
                args.iter()
                    .map(|arg| paths::expand(vars, arg))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(" ")
            };
            command.push_str(&replacement);
        }
        command.push_str(template.get(last..).unwrap_or_default());

        if substitutions == 0 && !args.is_empty() {
            command.push(' ');
            command.push_str(&args.join(" "));
        }
        Ok(command)
    }

    fn positional(&self, digits: &str, args: &[String]) -> String {
        match digits.parse::<usize>() {
            Ok(0) => self.name.clone(),
            Ok(n) => args.get(n - 1).cloned().unwrap_or_default(),
            Err(_) => String::new(),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("package", &self.package)
            .field("kind", &self.kind)
            .field("filename", &self.filename)
            .field("full_path", &self.full_path)
            .field("has_par_file", &self.has_par_file)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

/// Normalizes the `$foreign`, `$foreign args` and `$0...` spellings.
fn foreign_template(name: &str, file: &str) -> String {
    let body = file.strip_prefix('$').unwrap_or(file);
    if body == "foreign" {
        name.to_string()
    } else if let Some(rest) = body.strip_prefix("foreign ") {
        format!("{} {}", name, rest)
    } else if let Some(rest) = file.strip_prefix("$0") {
        format!("{}{}", name, rest)
    } else {
        body.to_string()
    }
}

/// Keeps the first `head` characters and, for longer names, the last one.
fn scrunch(name: &str, head: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out: String = chars.iter().take(head).collect();
    if chars.len() > head
        && let Some(last) = chars.last()
    {
        out.push(*last);
    }
    out
}
