//! The metadata store interface the recipe parser produces.

use std::collections::BTreeMap;
use std::path::PathBuf;

use kiln_common::{FileDepend, Mtime};
use serde::{Deserialize, Serialize};

/// Task-level dependency information recorded by the parser.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDeps {
    /// Task names in definition order.
    pub tasks: Vec<String>,
    /// For each task, the tasks it runs after.
    pub parents: BTreeMap<String, Vec<String>>,
}

/// A fully evaluated variable store for one recipe variant.
///
/// The cache only ever reads from a store, apart from recording the merged
/// file-dependency set on the base variant.
pub trait MetadataStore {
    /// Returns the expanded value of `name`, or `None` if unset.
    fn get(&self, name: &str) -> Option<String>;

    /// Returns every file read while producing this store, with its mtime.
    fn file_depends(&self) -> Vec<FileDepend>;

    /// Replaces the recorded file-dependency set.
    fn set_file_depends(&mut self, depends: Vec<FileDepend>);

    /// Returns the task dependency graph, if the parser recorded one.
    fn task_deps(&self) -> Option<TaskDeps> {
        None
    }
}

/// A [`MetadataStore`] over plain string values.
#[derive(Clone, Debug, Default)]
pub struct MapStore {
    vars: BTreeMap<String, String>,
    depends: Vec<FileDepend>,
    task_deps: Option<TaskDeps>,
}

impl MapStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a variable.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    /// Builder form of [`set`](Self::set).
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Records a file the store was produced from.
    pub fn with_depend(mut self, path: impl Into<PathBuf>, mtime: Mtime) -> Self {
        self.depends.push(FileDepend::new(path, mtime));
        self
    }

    /// Attaches a task dependency graph.
    pub fn with_task_deps(mut self, task_deps: TaskDeps) -> Self {
        self.task_deps = Some(task_deps);
        self
    }
}

impl MetadataStore for MapStore {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn file_depends(&self) -> Vec<FileDepend> {
        self.depends.clone()
    }

    fn set_file_depends(&mut self, depends: Vec<FileDepend>) {
        self.depends = depends;
    }

    fn task_deps(&self) -> Option<TaskDeps> {
        self.task_deps.clone()
    }
}
