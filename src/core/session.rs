// src/core/session.rs

//! The task registry and the run protocol.
//!
//! A run works on a copy of the task's current parameters (a frame). Only a
//! successful run merges that copy back and saves it; on any failure the
//! frame is discarded and the current list is left untouched.

use crate::constants::NARGS_PARAM;
use crate::core::minmatch::{MinMatch, min_match};
use crate::core::par_list::ParList;
use crate::core::paths;
use crate::core::task::{Task, TaskError, TaskId};
use crate::core::value::NativeValue;
use crate::models::{TaskDecl, TaskKind};
use crate::system::executor::{ExecutionError, ProcessRunner, Redirection};
use crate::system::procedure::ScriptCompiler;
use crate::system::prompt::Interaction;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Session-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Reject legacy par-file syntax instead of accepting it.
    pub strict: bool,
    /// Solicit query-mode parameters on read.
    pub prompting: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            strict: false,
            prompting: true,
        }
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Merge changes into the current list but do not write them to disk.
    pub nosave: bool,
    /// Redirection layered over the enclosing run's.
    pub redirect: Redirection,
    /// Discard stdout unless it is already redirected.
    pub hush: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Some parameter was merged back into the current list.
    pub changed: bool,
    /// Where the merged list was written, if it was.
    pub saved: Option<PathBuf>,
}

/// The ephemeral parameter copy of one in-progress run.
#[derive(Debug)]
pub(crate) struct Frame {
    pub(crate) task: TaskId,
    pub(crate) list: ParList,
}

/// Registry of declared tasks, their packages and every in-progress run.
///
/// Tasks are addressed by [`TaskId`] handles that stay valid for the life of the session.
pub struct Session {
    pub(crate) tasks: Vec<Task>,
    pub(crate) qualified: HashMap<String, TaskId>,
    pub(crate) packages: HashMap<String, TaskId>,
    pub(crate) root: Option<TaskId>,
    pub(crate) loaded_path: Vec<TaskId>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) redirections: Vec<Redirection>,
    pub(crate) vars: HashMap<String, String>,
    pub(crate) options: SessionOptions,
    pub(crate) runner: Box<dyn ProcessRunner>,
    pub(crate) compiler: Box<dyn ScriptCompiler>,
    pub(crate) interaction: Interaction,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("tasks", &self.tasks)
            .field("root", &self.root)
            .field("loaded_path", &self.loaded_path)
            .field("frames", &self.frames.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// An empty session with default options.
    pub fn new(
        runner: Box<dyn ProcessRunner>,
        compiler: Box<dyn ScriptCompiler>,
        interaction: Interaction,
    ) -> Self {
        Self {
            tasks: Vec::new(),
            qualified: HashMap::new(),
            packages: HashMap::new(),
            root: None,
            loaded_path: Vec::new(),
            frames: Vec::new(),
            redirections: Vec::new(),
            vars: HashMap::new(),
            options: SessionOptions::default(),
            runner,
            compiler,
            interaction,
        }
    }

    /// Current switches.
    pub fn options(&self) -> SessionOptions {
        self.options
    }

    /// Replaces the switches.
    pub fn set_options(&mut self, options: SessionOptions) {
        self.options = options;
    }

    /// Defines a variable for `var$` expansion and child environments.
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Value of a session variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// All session variables.
    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// Expands a `var$path` reference against the session variables.
    pub fn expand(&self, text: &str) -> Result<String, TaskError> {
        Ok(paths::expand(&self.vars, text)?)
    }

    // --- Registry ---

    /// The task behind `id`.
    pub fn task(&self, id: TaskId) -> Result<&Task, TaskError> {
        self.tasks.get(id.0).ok_or(TaskError::InvalidTaskId(id.0))
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, TaskError> {
        self.tasks.get_mut(id.0).ok_or(TaskError::InvalidTaskId(id.0))
    }

    /// Every declared task with its handle, in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks.iter().enumerate().map(|(i, t)| (TaskId(i), t))
    }

    /// The root package, if one was set.
    pub fn root(&self) -> Option<TaskId> {
        self.root
    }

    /// Number of runs in progress, nested runs included.
    pub fn active_runs(&self) -> usize {
        self.frames.len()
    }

    /// Makes a declared package the root of every scope chain.
    pub fn set_root(&mut self, name: &str) -> Result<TaskId, TaskError> {
        let id = self.find_task(name)?;
        if !self.task(id)?.is_package() {
            return Err(TaskError::NotAPackage(name.to_string()));
        }
        self.root = Some(id);
        Ok(id)
    }

    /// Packages in load order; the last one is where new declarations go.
    pub fn loaded_path(&self) -> &[TaskId] {
        &self.loaded_path
    }

    /// Most recently loaded package, falling back to the root.
    pub fn current_package(&self) -> Option<TaskId> {
        self.loaded_path.last().copied().or(self.root)
    }

    /// Handle of a declared package.
    pub fn package_id(&self, name: &str) -> Option<TaskId> {
        self.packages.get(name).copied()
    }

    /// Registers a task. Redeclaring `package.name` replaces the earlier definition.
    pub fn declare(&mut self, decl: TaskDecl) -> Result<TaskId, TaskError> {
        let package = match &decl.package {
            Some(package) => package.clone(),
            None => self
                .current_package()
                .and_then(|id| self.tasks.get(id.0))
                .map(|t| t.name.clone())
                .unwrap_or_default(),
        };
        let inherited = self
            .package_id(&package)
            .and_then(|id| self.tasks.get(id.0))
            .map(|t| t.binaries.clone())
            .unwrap_or_default();
        let task = Task::new(&decl, &package, &inherited)?;
        let key = task.qualified_name();

        let id = match self.qualified.get(&key).copied() {
            Some(id) => {
                log::debug!("Redefining task '{}'", key);
                let slot = self.task_mut(id)?;
                let previous = std::mem::replace(slot, task);
                if let (Some(members), Some(new_members)) = (previous.members, slot.members.as_mut()) {
                    *new_members = members;
                }
                id
            }
            None => {
                let id = TaskId(self.tasks.len());
                self.tasks.push(task);
                self.qualified.insert(key.clone(), id);
                id
            }
        };

        let task = self.task(id)?;
        let (name, package, is_package) = (task.name.clone(), task.package.clone(), task.is_package());
        let label = task.kind.label();
        if is_package {
            self.packages.insert(name.clone(), id);
        }
        if let Some(owner) = self.package_id(&package)
            && owner != id
            && let Some(members) = self.tasks.get_mut(owner.0).and_then(|t| t.members.as_mut())
        {
            members.tasks.insert(name.clone(), id);
            if is_package {
                members.packages.insert(name, id);
            }
        }
        log::debug!("Declared {} '{}'", label, key);
        Ok(id)
    }

    fn member_of(&self, package: TaskId, name: &str) -> Result<Option<TaskId>, TaskError> {
        let Some(members) = self.task(package)?.members.as_ref() else {
            return Ok(None);
        };
        match min_match(name, members.tasks.keys().map(String::as_str)) {
            MinMatch::Unique(found) => Ok(members.tasks.get(found).copied()),
            MinMatch::NoMatch => Ok(None),
            MinMatch::Ambiguous(hits) => Err(TaskError::AmbiguousTask {
                name: name.to_string(),
                candidates: hits.into_iter().map(String::from).collect(),
            }),
        }
    }

    /// Finds a task by `package.task` or by (abbreviated) bare name.
    ///
    /// Bare names are looked up in the loaded packages, most recent first,
    /// then among every declared task.
    pub fn find_task(&self, name: &str) -> Result<TaskId, TaskError> {
        let name = name.trim();
        if let Some((package, task)) = name.split_once('.') {
            let package = self
                .package_id(package)
                .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
            return self
                .member_of(package, task)?
                .ok_or_else(|| TaskError::UnknownTask(name.to_string()));
        }

        let mut searched = HashSet::new();
        for &package in self.loaded_path.iter().rev().chain(self.root.iter()) {
            if searched.insert(package)
                && let Some(id) = self.member_of(package, name)?
            {
                return Ok(id);
            }
        }

        let mut names: Vec<&str> = self.tasks.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        match min_match(name, names) {
            MinMatch::Unique(found) => self
                .tasks
                .iter()
                .rposition(|t| t.name == found)
                .map(TaskId)
                .ok_or_else(|| TaskError::UnknownTask(name.to_string())),
            MinMatch::NoMatch => Err(TaskError::UnknownTask(name.to_string())),
            MinMatch::Ambiguous(hits) => Err(TaskError::AmbiguousTask {
                name: name.to_string(),
                candidates: hits.into_iter().map(String::from).collect(),
            }),
        }
    }

    // --- Initialization ---

    /// Resolves paths, reads the parameter files and compiles scripts, once.
    ///
    /// A saved list that no longer matches the defaults is discarded; one that
    /// cannot be read at all is an error.
    pub fn init_task(&mut self, id: TaskId) -> Result<(), TaskError> {
        let strict = self.options.strict;
        let task = self.task(id)?;
        if task.initialized {
            return Ok(());
        }
        let name = task.name.clone();
        let kind = task.kind;

        let full_path = task.locate_executable(&self.vars)?;
        let (default_path, scrunch_path) = task.par_file_paths(&self.vars)?;
        if task.has_par_file && task.filename.is_empty() && !kind.is_script() {
            return Err(TaskError::NoParFile(name));
        }

        let mut default_list = match &default_path {
            Some(path) if path.exists() => Some(ParList::read(&name, path, strict)?),
            Some(path) if !kind.is_script() => {
                log::debug!("Missing parameter file {}", path.display());
                return Err(TaskError::NoParFile(name));
            }
            _ => None,
        };
        let saved_list = match &scrunch_path {
            Some(path) if path.exists() => Some(ParList::read(&name, path, strict)?),
            _ => None,
        };

        let mut procedure = None;
        if kind.is_script() {
            let script = PathBuf::from(full_path.clone().unwrap_or_default());
            let compiled = self
                .compiler
                .compile(&name, &script, default_list.as_ref())
                .map_err(|e| TaskError::Compile {
                    task: name.clone(),
                    source: e,
                })?;
            procedure = Some(compiled.procedure);
            if let Some(list) = compiled.par_list {
                default_list = Some(list);
            }
        }

        let (current_list, current_path) = match (saved_list, &default_list) {
            (Some(saved), Some(defaults)) if saved.is_consistent(defaults) => {
                (Some(saved), scrunch_path.clone())
            }
            (Some(_), Some(defaults)) => {
                log::warn!(
                    "Saved parameters for '{}' are inconsistent with the defaults; using defaults",
                    name
                );
                (Some(defaults.clone()), default_path.clone())
            }
            (_, Some(defaults)) => (Some(defaults.clone()), default_path.clone()),
            (_, None) if kind.is_script() => (Some(ParList::from_params(name.as_str(), Vec::new())?), None),
            (_, None) => (None, None),
        };

        let task = self.task_mut(id)?;
        task.has_par_file = task.has_par_file && default_list.is_some();
        task.full_path = full_path;
        task.default_list = default_list;
        task.current_list = current_list;
        task.default_par_path = default_path;
        task.current_par_path = current_path;
        task.scrunch_par_path = scrunch_path;
        task.procedure = procedure;
        task.initialized = true;
        log::debug!("Initialized task '{}'", name);
        Ok(())
    }

    // --- Modes ---

    /// The task's mode with automatic mode resolved through its packages.
    pub fn effective_mode(&self, id: TaskId) -> String {
        self.resolve_mode(id, None)
    }

    fn resolve_mode(&self, id: TaskId, list: Option<&ParList>) -> String {
        let mut visited = HashSet::new();
        let mut current = id;
        let mut list = list;
        loop {
            if !visited.insert(current) {
                return "h".to_string();
            }
            let Some(task) = self.tasks.get(current.0) else {
                return "h".to_string();
            };
            let mode = list.or(task.current_list.as_ref()).and_then(ParList::mode);
            if let Some(mode) = mode.filter(|m| !m.starts_with('a')) {
                return mode;
            }
            if Some(current) == self.root {
                return "h".to_string();
            }
            if task.package.is_empty() {
                return "ql".to_string();
            }
            current = match (self.package_id(&task.package), self.root) {
                (Some(package), _) if package != current => package,
                (_, Some(root)) => root,
                _ => return "h".to_string(),
            };
            list = None;
        }
    }

    // --- Running ---

    /// Looks a task up by name and runs it.
    pub fn run(
        &mut self,
        name: &str,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
        options: &RunOptions,
    ) -> Result<RunReport, TaskError> {
        let id = self.find_task(name)?;
        self.run_task(id, args, keywords, options)
    }

    /// Runs a task by handle.
    pub fn run_task(
        &mut self,
        id: TaskId,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
        options: &RunOptions,
    ) -> Result<RunReport, TaskError> {
        let task = self.task(id)?;
        log::debug!("Running {} '{}'", task.kind.label(), task.name);
        match task.kind {
            TaskKind::Pset => Err(TaskError::PsetExecution(task.name.clone())),
            TaskKind::Foreign => self.run_foreign(id, args, keywords, options),
            TaskKind::Package if task.is_loaded() => {
                self.push_loaded(id);
                Ok(RunReport::default())
            }
            _ => self.run_managed(id, args, keywords, options),
        }
    }

    fn push_loaded(&mut self, id: TaskId) {
        if self.loaded_path.last() != Some(&id) {
            self.loaded_path.push(id);
        }
    }

    fn effective_redirection(&self, options: &RunOptions) -> Redirection {
        let base = self.redirections.last().cloned().unwrap_or_default();
        let redirect = options.redirect.over(&base);
        if options.hush {
            redirect.hushed()
        } else {
            redirect
        }
    }

    fn run_foreign(
        &mut self,
        id: TaskId,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
        options: &RunOptions,
    ) -> Result<RunReport, TaskError> {
        let name = self.task(id)?.name.clone();
        if !keywords.is_empty() {
            return Err(TaskError::ForeignKeywords {
                task: name,
                keys: keywords.iter().map(|(k, _)| k.clone()).collect(),
            });
        }
        self.init_task(id)?;
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let command = self.task(id)?.foreign_command_line(&args, &self.vars)?;
        let redirect = self.effective_redirection(options);
        self.spawn(&name, &command, &redirect)?;
        Ok(RunReport::default())
    }

    fn spawn(&mut self, task: &str, command: &str, redirect: &Redirection) -> Result<(), TaskError> {
        let status = self
            .runner
            .run(command, &self.vars, redirect)
            .map_err(|e| TaskError::Execution {
                task: task.to_string(),
                source: e,
            })?;
        if status != 0 {
            return Err(TaskError::NonZeroExit {
                task: task.to_string(),
                status,
            });
        }
        Ok(())
    }

    /// Executable, script and first-time package runs.
    fn run_managed(
        &mut self,
        id: TaskId,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
        options: &RunOptions,
    ) -> Result<RunReport, TaskError> {
        self.init_task(id)?;
        let task = self.task(id)?;
        let (name, is_package) = (task.name.clone(), task.is_package());
        if is_package {
            self.set_loaded(id, true);
            self.loaded_path.push(id);
        }

        let run_list = match self.execute_in_frame(id, args, keywords, options) {
            Ok(list) => list,
            Err(e) => {
                if is_package {
                    self.set_loaded(id, false);
                    if let Some(pos) = self.loaded_path.iter().rposition(|p| *p == id) {
                        self.loaded_path.remove(pos);
                    }
                }
                log::debug!("Task '{}' failed: {}", name, e);
                return Err(e);
            }
        };

        let changed = self
            .task_mut(id)?
            .current_list
            .as_mut()
            .is_some_and(|current| current.merge_from(&run_list));
        let saved = if changed && !options.nosave {
            self.save_task(id)?
        } else {
            None
        };
        if is_package {
            self.push_loaded(id);
        }
        log::debug!("Successful task termination for '{}'", name);
        Ok(RunReport { changed, saved })
    }

    fn set_loaded(&mut self, id: TaskId, loaded: bool) {
        if let Some(members) = self.tasks.get_mut(id.0).and_then(|t| t.members.as_mut()) {
            members.loaded = loaded;
        }
    }

    /// Copy of the current list with call arguments applied and automatic modes resolved.
    fn prepare_run_list(
        &self,
        id: TaskId,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
    ) -> Result<ParList, TaskError> {
        let task = self.task(id)?;
        let mut list = match &task.current_list {
            Some(list) => list.clone(),
            None => ParList::from_params(task.name.as_str(), Vec::new())?,
        };
        list.clear_flags();
        list.set_par_list(args, keywords)?;
        let mode = self.resolve_mode(id, Some(&list));
        list.apply_auto_mode(&mode);
        Ok(list)
    }

    /// Runs the task body against a pushed frame and returns the frame's list.
    ///
    /// The frame and the redirection are popped on every exit path.
    fn execute_in_frame(
        &mut self,
        id: TaskId,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
        options: &RunOptions,
    ) -> Result<ParList, TaskError> {
        let list = self.prepare_run_list(id, args, keywords)?;
        let redirect = self.effective_redirection(options);
        let frame_depth = self.frames.len();
        let redirect_depth = self.redirections.len();
        self.frames.push(Frame { task: id, list });
        self.redirections.push(redirect);

        let mut session = scopeguard::guard(&mut *self, move |s| {
            s.frames.truncate(frame_depth);
            s.redirections.truncate(redirect_depth);
        });
        session.invoke(id, frame_depth)?;
        session.frames.truncate(frame_depth + 1);
        session
            .frames
            .pop()
            .map(|frame| frame.list)
            .ok_or(TaskError::InactiveFrame(frame_depth))
    }

    fn invoke(&mut self, id: TaskId, frame: usize) -> Result<(), TaskError> {
        let task = self.task(id)?;
        let name = task.name.clone();
        if task.kind == TaskKind::Executable {
            let path = task.full_path.clone().ok_or_else(|| TaskError::NoFilename {
                task: name.clone(),
                filename: task.filename.clone(),
            })?;
            let program = shlex::try_quote(&path).map_err(|_| TaskError::Execution {
                task: name.clone(),
                source: ExecutionError::CommandParse(path.clone()),
            })?;
            let command = format!("{} {}", program, name);
            let redirect = self.redirections.last().cloned().unwrap_or_default();
            return self.spawn(&name, &command, &redirect);
        }

        let procedure = task.procedure.clone().ok_or_else(|| TaskError::Compile {
            task: name.clone(),
            source: anyhow::anyhow!("no procedure was compiled for this task"),
        })?;
        let mut ctx = TaskContext {
            session: self,
            task: id,
            frame,
        };
        procedure
            .invoke(&mut ctx)
            .map_err(|e| match e.downcast::<TaskError>() {
                Ok(e) => e,
                Err(e) => TaskError::Procedure(e),
            })
    }

    // --- Persistence ---

    /// Writes the current list to the task's uparm file, if it has one.
    pub fn save_task(&mut self, id: TaskId) -> Result<Option<PathBuf>, TaskError> {
        self.init_task(id)?;
        let task = self.task(id)?;
        if !task.has_par_file {
            return Ok(None);
        }
        let Some(path) = task.scrunch_par_path.clone() else {
            log::warn!("Unable to save parameters for task {}", task.name);
            return Ok(None);
        };
        self.save_task_to(id, &path).map(Some)
    }

    /// Writes the current list to `path` and remembers it as the current file.
    pub fn save_task_to(&mut self, id: TaskId, path: &Path) -> Result<PathBuf, TaskError> {
        self.init_task(id)?;
        let task = self.task_mut(id)?;
        let list = task
            .current_list
            .as_ref()
            .ok_or_else(|| TaskError::NoParameters(task.name.clone()))?;
        list.save(path)?;
        task.current_par_path = Some(path.to_path_buf());
        Ok(path.to_path_buf())
    }

    /// Resets the current list to the defaults.
    pub fn unlearn(&mut self, id: TaskId) -> Result<(), TaskError> {
        self.init_task(id)?;
        let task = self.task_mut(id)?;
        let Some(defaults) = task.default_list.clone() else {
            return Err(TaskError::NoParameters(task.name.clone()));
        };
        task.current_list = Some(defaults);
        task.current_par_path = task.default_par_path.clone();
        log::debug!("Unlearned parameters for '{}'", task.name);
        Ok(())
    }

    fn listed(&mut self, id: TaskId) -> Result<&ParList, TaskError> {
        self.init_task(id)?;
        let task = self.task(id)?;
        task.current_list
            .as_ref()
            .filter(|list| list.params().iter().any(|p| p.name() != NARGS_PARAM))
            .ok_or_else(|| TaskError::NoParameters(task.name.clone()))
    }

    /// `lpar`-style listing of the current list.
    pub fn lpar(&mut self, id: TaskId, verbose: bool) -> Result<String, TaskError> {
        Ok(self.listed(id)?.lpar(verbose))
    }

    /// `dpar`-style listing: one `task.param = value` line per parameter.
    pub fn dpar(&mut self, id: TaskId) -> Result<String, TaskError> {
        let name = self.task(id)?.name.clone();
        Ok(self.listed(id)?.dpar(&name))
    }
}

/// What a running procedure sees: its own parameters plus the session.
pub struct TaskContext<'a> {
    pub(crate) session: &'a mut Session,
    pub(crate) task: TaskId,
    pub(crate) frame: usize,
}

impl fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("frame", &self.frame)
            .finish_non_exhaustive()
    }
}

impl<'a> TaskContext<'a> {
    /// The running task.
    pub fn task(&self) -> TaskId {
        self.task
    }

    /// Name of the running task.
    pub fn task_name(&self) -> &str {
        self.session.tasks.get(self.task.0).map_or("", |t| t.name.as_str())
    }

    /// The run's own parameter copy.
    pub fn params(&self) -> Result<&ParList, TaskError> {
        self.session
            .frames
            .get(self.frame)
            .map(|f| &f.list)
            .ok_or(TaskError::InactiveFrame(self.frame))
    }

    /// Mutable access to the run's own parameter copy.
    pub fn params_mut(&mut self) -> Result<&mut ParList, TaskError> {
        self.session
            .frames
            .get_mut(self.frame)
            .map(|f| &mut f.list)
            .ok_or(TaskError::InactiveFrame(self.frame))
    }

    /// Resolves a (qualified) parameter through this run's scope chain.
    pub fn get(&mut self, name: &str) -> Result<NativeValue, TaskError> {
        self.session.frame_get(self.frame, name)
    }

    /// Like [`TaskContext::get`], formatted as text.
    pub fn get_string(&mut self, name: &str) -> Result<String, TaskError> {
        self.session.frame_get_string(self.frame, name)
    }

    /// Assigns a (qualified) parameter through this run's scope chain.
    pub fn set(&mut self, name: &str, value: impl Into<NativeValue>) -> Result<(), TaskError> {
        self.session.frame_set(self.frame, name, &value.into())
    }

    /// Runs another task as a nested run.
    pub fn run(
        &mut self,
        task: &str,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
    ) -> Result<RunReport, TaskError> {
        self.session.run(task, args, keywords, &RunOptions::default())
    }

    /// Nested run with explicit options.
    pub fn run_with(
        &mut self,
        task: &str,
        args: &[NativeValue],
        keywords: &[(String, NativeValue)],
        options: &RunOptions,
    ) -> Result<RunReport, TaskError> {
        self.session.run(task, args, keywords, options)
    }

    /// Declares a task; inside a package's procedure it becomes a package member.
    pub fn declare(&mut self, decl: TaskDecl) -> Result<TaskId, TaskError> {
        self.session.declare(decl)
    }

    /// The redirection in effect for this run.
    pub fn redirection(&self) -> Option<&Redirection> {
        self.session.redirections.last()
    }

    /// The whole session.
    pub fn session(&mut self) -> &mut Session {
        self.session
    }
}
