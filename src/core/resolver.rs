// src/core/resolver.rs

//! Qualified-name resolution through a task's scope chain.
//!
//! The chain is the task itself, then the loaded packages (most recent
//! first, each once, empty ones skipped), then the root package.

use crate::constants::{MAX_INDIRECTION_DEPTH, NARGS_PARAM};
use crate::core::par_list::{GetOptions, ParList, ParListError};
use crate::core::qualified_name::QualifiedName;
use crate::core::session::Session;
use crate::core::task::{TaskError, TaskId};
use crate::core::value::NativeValue;
use std::collections::HashSet;

/// Where a parameter list lives: an in-progress run or a task's current list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Frame(usize),
    Current(TaskId),
}

enum Located {
    /// Found in this scope under its full name.
    Here(Scope, String),
    /// Belongs to another task; resolve the local part there.
    Task(TaskId, String),
}

fn has_user_params(list: &ParList) -> bool {
    list.params().iter().any(|p| p.name() != NARGS_PARAM)
}

fn into_string(value: NativeValue) -> String {
    match value {
        NativeValue::Str(text) => text,
        other => other.to_string(),
    }
}

impl Session {
    /// The innermost run of `id`, or its current list when it is not running.
    pub(crate) fn scope_of(&self, id: TaskId) -> Scope {
        match self.frames.iter().rposition(|f| f.task == id) {
            Some(frame) => Scope::Frame(frame),
            None => Scope::Current(id),
        }
    }

    fn scope_task(&self, scope: Scope) -> Result<TaskId, TaskError> {
        match scope {
            Scope::Frame(frame) => self
                .frames
                .get(frame)
                .map(|f| f.task)
                .ok_or(TaskError::InactiveFrame(frame)),
            Scope::Current(id) => Ok(id),
        }
    }

    fn scope_list(&self, scope: Scope) -> Option<&ParList> {
        match scope {
            Scope::Frame(frame) => self.frames.get(frame).map(|f| &f.list),
            Scope::Current(id) => self.tasks.get(id.0).and_then(|t| t.current_list.as_ref()),
        }
    }

    fn scope_list_mut(&mut self, scope: Scope) -> Option<&mut ParList> {
        match scope {
            Scope::Frame(frame) => self.frames.get_mut(frame).map(|f| &mut f.list),
            Scope::Current(id) => self
                .tasks
                .get_mut(id.0)
                .and_then(|t| t.current_list.as_mut()),
        }
    }

    fn scope_chain(&self, origin: Scope) -> Result<Vec<(String, Scope)>, TaskError> {
        let origin_task = self.scope_task(origin)?;
        let mut seen = HashSet::from([origin_task]);
        let mut chain = vec![(self.task(origin_task)?.name.clone(), origin)];

        for &package in self.loaded_path.iter().rev().chain(self.root.iter()) {
            if !seen.insert(package) {
                continue;
            }
            let scope = self.scope_of(package);
            if self.scope_list(scope).is_some_and(has_user_params) {
                chain.push((self.task(package)?.name.clone(), scope));
            }
        }
        log::trace!(
            "Scope chain: {:?}",
            chain.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>()
        );
        Ok(chain)
    }

    /// Names of the lists searched for bare names from `id`, in order.
    pub fn scope_names(&self, id: TaskId) -> Result<Vec<String>, TaskError> {
        let chain = self.scope_chain(self.scope_of(id))?;
        Ok(chain.into_iter().map(|(name, _)| name).collect())
    }

    fn locate(&self, origin: Scope, name: &QualifiedName, text: &str) -> Result<Located, TaskError> {
        let chain = self.scope_chain(origin)?;

        let Some(task) = &name.task else {
            for (_, scope) in &chain {
                if self.scope_list(*scope).is_some_and(|l| l.has_param(&name.param)) {
                    return Ok(Located::Here(*scope, name.param.clone()));
                }
            }
            for (_, scope) in &chain {
                let Some(list) = self.scope_list(*scope) else {
                    continue;
                };
                match list.lookup(&name.param) {
                    Ok(par) => return Ok(Located::Here(*scope, par.name().to_string())),
                    Err(ParListError::AmbiguousParameter { candidates, .. }) => {
                        return Err(TaskError::AmbiguousParameter {
                            name: text.to_string(),
                            candidates,
                        });
                    }
                    Err(_) => continue,
                }
            }
            return Err(TaskError::UnknownParameter(text.to_string()));
        };

        let task = if task == "_" {
            self.task(self.scope_task(origin)?)?.package.clone()
        } else {
            task.clone()
        };

        if name.package.is_none()
            && let Some((_, scope)) = chain.iter().find(|(n, _)| *n == task)
        {
            let list = self
                .scope_list(*scope)
                .ok_or_else(|| TaskError::UnknownParameter(text.to_string()))?;
            return match list.lookup(&name.param) {
                Ok(par) => Ok(Located::Here(*scope, par.name().to_string())),
                Err(ParListError::AmbiguousParameter { candidates, .. }) => {
                    Err(TaskError::AmbiguousParameter {
                        name: text.to_string(),
                        candidates,
                    })
                }
                Err(_) => Err(TaskError::UnknownParameter(text.to_string())),
            };
        }

        let reference = match &name.package {
            Some(package) => format!("{}.{}", package, task),
            None => task,
        };
        let id = self.find_task(&reference).map_err(|e| match e {
            TaskError::UnknownTask(_) => TaskError::TaskForParameter {
                task: reference.clone(),
                name: text.to_string(),
            },
            other => other,
        })?;
        Ok(Located::Task(id, name.local_part()))
    }

    /// Reads a parameter, following `)name` indirections from `origin`.
    ///
    /// `trail` holds the slots already visited through indirection.
    fn read_param(
        &mut self,
        origin: Scope,
        text: &str,
        native: bool,
        trail: &mut Vec<String>,
    ) -> Result<NativeValue, TaskError> {
        let name = QualifiedName::parse(text)?;
        let (scope, param) = match self.locate(origin, &name, text)? {
            Located::Task(id, local) => {
                self.init_task(id)?;
                let scope = self.scope_of(id);
                return self.read_param(scope, &local, native, trail);
            }
            Located::Here(scope, param) => (scope, param),
        };

        let target = self
            .scope_list(scope)
            .and_then(|l| l.param(&param))
            .ok_or_else(|| TaskError::UnknownParameter(text.to_string()))?
            .indirection(name.field.as_deref(), name.index)?
            .map(str::to_string);
        if let Some(target) = target {
            let slot = format!(
                "{}.{}",
                self.task(self.scope_task(scope)?)?.name,
                QualifiedName {
                    param: param.clone(),
                    ..name.clone()
                }
                .local_part()
            );
            let first = trail.first().cloned().unwrap_or_else(|| slot.clone());
            if trail.contains(&slot) {
                trail.push(slot);
                return Err(TaskError::IndirectionCycle {
                    name: first,
                    chain: trail.join(" -> "),
                });
            }
            if trail.len() >= MAX_INDIRECTION_DEPTH {
                return Err(TaskError::IndirectionDepth {
                    name: first,
                    limit: MAX_INDIRECTION_DEPTH,
                });
            }
            trail.push(slot);
            log::trace!("Following indirection {} -> {}", text, target);
            return self.read_param(origin, &target, native, trail);
        }

        let options = GetOptions {
            field: name.field.as_deref(),
            index: name.index,
            prompt: self.options.prompting,
        };
        let Session {
            frames,
            tasks,
            interaction,
            ..
        } = self;
        let list = match scope {
            Scope::Frame(frame) => frames.get_mut(frame).map(|f| &mut f.list),
            Scope::Current(id) => tasks.get_mut(id.0).and_then(|t| t.current_list.as_mut()),
        }
        .ok_or_else(|| TaskError::UnknownParameter(text.to_string()))?;
        if native {
            Ok(list.get_native(&param, options, Some(interaction))?)
        } else {
            Ok(NativeValue::Str(list.get(&param, options, Some(interaction))?))
        }
    }

    fn write_param(
        &mut self,
        origin: Scope,
        text: &str,
        value: &NativeValue,
        check: bool,
    ) -> Result<(), TaskError> {
        let name = QualifiedName::parse(text)?;
        match self.locate(origin, &name, text)? {
            Located::Task(id, local) => {
                self.init_task(id)?;
                let scope = self.scope_of(id);
                self.write_param(scope, &local, value, check)
            }
            Located::Here(scope, param) => {
                let list = self
                    .scope_list_mut(scope)
                    .ok_or_else(|| TaskError::UnknownParameter(text.to_string()))?;
                list.set(&param, value, name.field.as_deref(), name.index, check)?;
                Ok(())
            }
        }
    }

    /// Reads `name` as seen from task `id`, formatted as text.
    pub fn get_param(&mut self, id: TaskId, name: &str) -> Result<String, TaskError> {
        self.init_task(id)?;
        let scope = self.scope_of(id);
        self.read_param(scope, name, false, &mut Vec::new())
            .map(into_string)
    }

    /// Reads `name` as seen from task `id`, as a typed value.
    pub fn get_param_native(&mut self, id: TaskId, name: &str) -> Result<NativeValue, TaskError> {
        self.init_task(id)?;
        let scope = self.scope_of(id);
        self.read_param(scope, name, true, &mut Vec::new())
    }

    /// Sets `name` as seen from task `id`. Indirections are not followed.
    pub fn set_param(
        &mut self,
        id: TaskId,
        name: &str,
        value: &NativeValue,
        check: bool,
    ) -> Result<(), TaskError> {
        self.init_task(id)?;
        let scope = self.scope_of(id);
        self.write_param(scope, name, value, check)
    }

    pub(crate) fn frame_get(&mut self, frame: usize, name: &str) -> Result<NativeValue, TaskError> {
        self.read_param(Scope::Frame(frame), name, true, &mut Vec::new())
    }

    pub(crate) fn frame_get_string(&mut self, frame: usize, name: &str) -> Result<String, TaskError> {
        self.read_param(Scope::Frame(frame), name, false, &mut Vec::new())
            .map(into_string)
    }

    pub(crate) fn frame_set(
        &mut self,
        frame: usize,
        name: &str,
        value: &NativeValue,
    ) -> Result<(), TaskError> {
        self.write_param(Scope::Frame(frame), name, value, true)
    }
}
