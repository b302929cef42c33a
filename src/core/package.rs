// src/core/package.rs

//! Package namespaces: membership, loading and member lookup.

use crate::core::minmatch::{MinMatch, min_match};
use crate::core::session::{RunOptions, RunReport, Session};
use crate::core::task::{TaskError, TaskId};
use crate::core::value::NativeValue;
use std::collections::{BTreeMap, HashSet};

/// Members declared into a package, and whether its init has run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageState {
    pub(crate) loaded: bool,
    pub(crate) tasks: BTreeMap<String, TaskId>,
    pub(crate) packages: BTreeMap<String, TaskId>,
}

impl PackageState {
    /// True once the package init ran successfully.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Member task names, sorted.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// Member packages.
    pub fn subpackages(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.packages.values().copied()
    }
}

/// Result of looking a name up inside a package.
#[derive(Debug, Clone, PartialEq)]
pub enum PackageMember {
    /// A package parameter and its value.
    Param(NativeValue),
    /// A member task.
    Task(TaskId),
}

impl Session {
    /// Runs a package's init, or just makes it current again if it is loaded.
    pub fn load_package(&mut self, name: &str, options: &RunOptions) -> Result<RunReport, TaskError> {
        let id = self.find_task(name)?;
        if !self.task(id)?.is_package() {
            return Err(TaskError::NotAPackage(name.to_string()));
        }
        self.run_task(id, &[], &[], options)
    }

    /// Leaves the current package.
    pub fn bye(&mut self) -> Result<TaskId, TaskError> {
        let id = self.loaded_path.pop().ok_or(TaskError::NothingLoaded)?;
        log::debug!("Leaving package '{}'", self.task(id)?.name);
        Ok(id)
    }

    /// Looks `name` up as a package parameter, then as a member task, then in
    /// loaded subpackages.
    pub fn find_in_package(&mut self, package: TaskId, name: &str) -> Result<PackageMember, TaskError> {
        let task = self.task(package)?;
        if !task.is_package() {
            return Err(TaskError::NotAPackage(task.name.clone()));
        }
        if !task.is_loaded() {
            return Err(TaskError::PackageNotLoaded(task.name.clone()));
        }
        let mut tried = HashSet::new();
        self.find_member(package, name, &mut tried)?
            .ok_or_else(|| TaskError::UnknownParameter(name.to_string()))
    }

    fn find_member(
        &mut self,
        package: TaskId,
        name: &str,
        tried: &mut HashSet<TaskId>,
    ) -> Result<Option<PackageMember>, TaskError> {
        tried.insert(package);
        self.init_task(package)?;
        let task = self.task(package)?;
        if let Some(par) = task.current_list.as_ref().and_then(|l| l.param(name)) {
            return Ok(Some(PackageMember::Param(par.get_native(None, None)?)));
        }
        let Some(members) = task.members.as_ref() else {
            return Ok(None);
        };
        match min_match(name, members.task_names()) {
            MinMatch::Unique(found) => {
                if let Some(&id) = members.tasks.get(found) {
                    return Ok(Some(PackageMember::Task(id)));
                }
            }
            MinMatch::Ambiguous(hits) => {
                return Err(TaskError::AmbiguousTask {
                    name: name.to_string(),
                    candidates: hits.into_iter().map(String::from).collect(),
                });
            }
            MinMatch::NoMatch => {}
        }

        let subpackages: Vec<TaskId> = members.subpackages().collect();
        for sub in subpackages {
            if tried.contains(&sub) || !self.task(sub)?.is_loaded() {
                continue;
            }
            if let Some(found) = self.find_member(sub, name, tried)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Member tasks of a package, hidden ones included.
    pub fn package_tasks(&self, package: TaskId) -> Vec<TaskId> {
        self.tasks
            .get(package.0)
            .and_then(|t| t.members.as_ref())
            .map(|m| m.tasks.values().copied().collect())
            .unwrap_or_default()
    }
}
