// src/system/procedure.rs

//! Collaborators that turn script and package tasks into runnable procedures.

use crate::core::par_list::ParList;
use crate::core::session::TaskContext;
use anyhow::{Result, bail};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A compiled command-language procedure.
pub trait Procedure {
    /// Runs the body against the task's run context.
    fn invoke(&self, ctx: &mut TaskContext<'_>) -> Result<()>;
}

impl<F> Procedure for F
where
    F: Fn(&mut TaskContext<'_>) -> Result<()>,
{
    fn invoke(&self, ctx: &mut TaskContext<'_>) -> Result<()> {
        self(ctx)
    }
}

/// What compiling a script yields.
pub struct CompiledScript {
    /// The runnable body.
    pub procedure: Arc<dyn Procedure>,
    /// Parameters declared by the script itself; replaces the default list when present.
    pub par_list: Option<ParList>,
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("par_list", &self.par_list)
            .finish_non_exhaustive()
    }
}

/// Turns a script file into a procedure.
pub trait ScriptCompiler {
    /// Compiles `path` for `task`; `defaults` is the task's par file, if any.
    fn compile(
        &mut self,
        task: &str,
        path: &Path,
        defaults: Option<&ParList>,
    ) -> Result<CompiledScript>;
}

/// Compiler backed by procedures registered in code, keyed by task name.
#[derive(Default)]
pub struct ProcedureTable {
    entries: HashMap<String, (Arc<dyn Procedure>, Option<ParList>)>,
}

impl ProcedureTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a procedure that uses the task's par file.
    pub fn register<F>(self, task: &str, procedure: F) -> Self
    where
        F: Fn(&mut TaskContext<'_>) -> Result<()> + 'static,
    {
        self.register_with_params(task, procedure, None)
    }

    /// Registers a procedure that declares its own parameters.
    pub fn register_with_params<F>(
        mut self,
        task: &str,
        procedure: F,
        par_list: Option<ParList>,
    ) -> Self
    where
        F: Fn(&mut TaskContext<'_>) -> Result<()> + 'static,
    {
        let procedure: Arc<dyn Procedure> = Arc::new(procedure);
        self.entries.insert(task.to_string(), (procedure, par_list));
        self
    }

    /// True when `task` has a registered procedure.
    pub fn contains(&self, task: &str) -> bool {
        self.entries.contains_key(task)
    }
}

impl ScriptCompiler for ProcedureTable {
    fn compile(
        &mut self,
        task: &str,
        path: &Path,
        _defaults: Option<&ParList>,
    ) -> Result<CompiledScript> {
        let Some((procedure, par_list)) = self.entries.get(task) else {
            bail!(
                "No procedure is available for script task '{}' ({})",
                task,
                path.display()
            );
        };
        log::debug!("Using registered procedure for '{}'", task);
        Ok(CompiledScript {
            procedure: Arc::clone(procedure),
            par_list: par_list.clone(),
        })
    }
}

impl std::fmt::Debug for ProcedureTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("ProcedureTable").field("tasks", &names).finish()
    }
}
