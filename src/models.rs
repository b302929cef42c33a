// src/models.rs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// --- `clpar.toml` MODELS (What is read from the session configuration file) ---

/// What kind of executable unit a task is.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A managed executable with a structured parameter file.
    #[default]
    Executable,
    /// A parameter set that cannot be executed.
    Pset,
    /// A compiled command-language procedure.
    Script,
    /// An arbitrary external command.
    Foreign,
    /// A script that owns a namespace of tasks.
    Package,
}

impl TaskKind {
    /// Script-like kinds run a compiled procedure rather than a process.
    pub fn is_script(self) -> bool {
        matches!(self, TaskKind::Script | TaskKind::Package)
    }

    /// Lower-case name used in log and error messages.
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Executable => "task",
            TaskKind::Pset => "pset",
            TaskKind::Script => "script task",
            TaskKind::Foreign => "foreign task",
            TaskKind::Package => "package",
        }
    }
}

/// One task declaration, either read from the config file or built in code.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct TaskDecl {
    /// Task name; `$name` marks a task with no par file.
    pub name: String,
    /// Owning package; defaults to the most recently loaded package.
    pub package: Option<String>,
    /// Executable, script or parameter-file template, or a `$command` for foreign tasks.
    #[serde(default)]
    pub file: String,
    /// Inferred from `file` when absent.
    pub kind: Option<TaskKind>,
    /// Declared without parameters.
    #[serde(default)]
    pub no_par_file: bool,
    /// `tb` marks a task that takes the terminal.
    pub suffix: Option<String>,
    /// Directories searched for the executable; inherited from the package when empty.
    #[serde(default)]
    pub binaries: Vec<String>,
    /// Left out of package listings.
    #[serde(default)]
    pub hidden: bool,
}

impl TaskDecl {
    /// A declaration with everything else defaulted.
    pub fn new(name: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            ..Self::default()
        }
    }

    /// Sets the owning package.
    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = Some(package.into());
        self
    }

    /// Sets the kind instead of inferring it.
    pub fn kind(mut self, kind: TaskKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Marks the task as having no par file.
    pub fn without_par_file(mut self) -> Self {
        self.no_par_file = true;
        self
    }

    /// Sets the binary directories.
    pub fn with_binaries<I, S>(mut self, binaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binaries = binaries.into_iter().map(Into::into).collect();
        self
    }

    /// The declared kind, or the one implied by the file name.
    pub fn resolved_kind(&self) -> TaskKind {
        if let Some(kind) = self.kind {
            return kind;
        }
        let file = self.file.trim();
        if file.starts_with('$') {
            TaskKind::Foreign
        } else if file.ends_with(".cl") {
            TaskKind::Script
        } else if file.ends_with(".par") {
            TaskKind::Pset
        } else {
            TaskKind::Executable
        }
    }
}

fn default_prompting() -> bool {
    true
}

/// Represents the deserialized structure of a `clpar.toml` file.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct SessionConfig {
    /// Name of the root package whose parameters form the global scope.
    pub root: Option<String>,
    /// Reject legacy par-file syntax.
    #[serde(default)]
    pub strict: bool,
    /// Prompt for query-mode parameters.
    #[serde(default = "default_prompting")]
    pub prompting: bool,
    /// Variables for `var$path` expansion (`uparm`, `bin`, ...).
    #[serde(default)]
    pub vars: HashMap<String, String>,
    /// Task declarations, registered in file order.
    #[serde(default)]
    pub tasks: Vec<TaskDecl>,
    /// Packages loaded at start-up, in order.
    #[serde(default)]
    pub load: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_inferred_from_file() {
        assert_eq!(TaskDecl::new("ls", "$ls -l").resolved_kind(), TaskKind::Foreign);
        assert_eq!(TaskDecl::new("demo", "home$demo.cl").resolved_kind(), TaskKind::Script);
        assert_eq!(TaskDecl::new("pars", "home$pars.par").resolved_kind(), TaskKind::Pset);
        assert_eq!(TaskDecl::new("imstat", "bin$x_images.e").resolved_kind(), TaskKind::Executable);
        assert_eq!(
            TaskDecl::new("images", "images$images.cl").kind(TaskKind::Package).resolved_kind(),
            TaskKind::Package
        );
    }

    #[test]
    fn test_session_config_from_toml() {
        let text = r#"
            root = "cl"
            load = ["images"]

            [vars]
            uparm = "/tmp/uparm/"

            [[tasks]]
            name = "cl"
            file = "cl.cl"
            kind = "package"

            [[tasks]]
            name = "ls"
            package = "cl"
            file = "$ls"
        "#;
        let config: SessionConfig = toml::from_str(text).unwrap();
        assert_eq!(config.root.as_deref(), Some("cl"));
        assert!(config.prompting);
        assert!(!config.strict);
        assert_eq!(config.tasks.len(), 2);
        assert_eq!(config.tasks[0].kind, Some(TaskKind::Package));
        assert_eq!(config.tasks[1].resolved_kind(), TaskKind::Foreign);
        assert_eq!(config.vars["uparm"], "/tmp/uparm/");
    }
}
