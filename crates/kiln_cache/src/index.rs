//! Cross-reference tables built from recipe snapshots for the resolver.
//!
//! Every list keeps insertion order, which encodes provider priority for the
//! resolver, and never holds the same entry twice. Runtime dependency tables
//! are the exception: they are replaced per (file, package) on re-aggregation.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use kiln_common::VirtualName;

use crate::metadata::TaskDeps;
use crate::snapshot::RecipeSnapshot;

/// The `(epoch, version, revision)` triple of one recipe file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecipeVersion {
    /// Epoch (`PE`).
    pub epoch: String,
    /// Version (`PV`).
    pub version: String,
    /// Revision (`PR`).
    pub revision: String,
}

/// A list that ignores repeated entries, in first-seen order.
#[derive(Clone, Debug)]
struct UniqueList<T> {
    items: Vec<T>,
    seen: HashSet<T>,
}

impl<T> Default for UniqueList<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
        }
    }
}

impl<T: Clone + Eq + Hash> UniqueList<T> {
    fn push(&mut self, item: T) {
        if self.seen.insert(item.clone()) {
            self.items.push(item);
        }
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

/// Per-package runtime lists of one file.
pub type PackageLists = HashMap<String, Vec<String>>;

/// Aggregated indices over every valid snapshot of a run.
#[derive(Debug, Default)]
pub struct IndexBuilder {
    task_deps: HashMap<VirtualName, TaskDeps>,
    recipe_name: HashMap<VirtualName, String>,
    recipe_files: HashMap<String, Vec<VirtualName>>,
    versions: HashMap<VirtualName, RecipeVersion>,
    preference: HashMap<VirtualName, i64>,
    stamps: HashMap<VirtualName, String>,

    file_provides: HashMap<VirtualName, Vec<String>>,
    providers: HashMap<String, Vec<VirtualName>>,
    name_provides: HashMap<String, Vec<String>>,
    build_deps: HashMap<VirtualName, Vec<String>>,
    all_depends: UniqueList<String>,

    packages: HashMap<String, Vec<VirtualName>>,
    packages_dynamic: HashMap<String, Vec<VirtualName>>,
    rproviders: HashMap<String, Vec<VirtualName>>,
    rundeps: HashMap<VirtualName, PackageLists>,
    runrecs: HashMap<VirtualName, PackageLists>,

    possible_world: UniqueList<VirtualName>,
}

impl IndexBuilder {
    /// Creates empty indices.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one snapshot under its virtual filename.
    pub fn add_from_snapshot(&mut self, name: &VirtualName, info: &RecipeSnapshot) {
        self.task_deps.insert(name.clone(), info.task_deps.clone());
        self.recipe_name.insert(name.clone(), info.name.clone());
        push_unique(
            self.recipe_files.entry(info.name.clone()).or_default(),
            name.clone(),
        );
        self.versions.insert(
            name.clone(),
            RecipeVersion {
                epoch: info.epoch.clone(),
                version: info.version.clone(),
                revision: info.revision.clone(),
            },
        );
        self.preference.insert(name.clone(), info.default_preference);
        self.stamps.insert(name.clone(), info.stamp.clone());

        let mut provides = vec![info.name.clone()];
        for provide in &info.provides {
            push_unique(&mut provides, provide.clone());
        }
        for provide in &provides {
            push_unique(
                self.providers.entry(provide.clone()).or_default(),
                name.clone(),
            );
            push_unique(
                self.name_provides.entry(info.name.clone()).or_default(),
                provide.clone(),
            );
        }
        self.file_provides.insert(name.clone(), provides);

        let deps = self.build_deps.entry(name.clone()).or_default();
        for dep in &info.depends {
            push_unique(deps, dep.clone());
            self.all_depends.push(dep.clone());
        }

        let mut rprovides = info.rprovides.clone();
        for package in &info.packages {
            push_unique(
                self.packages.entry(package.clone()).or_default(),
                name.clone(),
            );
            if let Some(extra) = info.rprovides_pkg.get(package) {
                rprovides.extend(extra.iter().cloned());
            }
        }
        for pattern in &info.packages_dynamic {
            push_unique(
                self.packages_dynamic.entry(pattern.clone()).or_default(),
                name.clone(),
            );
        }
        for rprovide in rprovides {
            push_unique(self.rproviders.entry(rprovide).or_default(), name.clone());
        }

        let rundeps = self.rundeps.entry(name.clone()).or_default();
        let runrecs = self.runrecs.entry(name.clone()).or_default();
        for package in info.packages.iter().chain(std::iter::once(&info.name)) {
            rundeps.insert(package.clone(), info.runtime_depends(package));
            runrecs.insert(package.clone(), info.runtime_recommends(package));
        }

        if !info.broken && !info.not_world {
            self.possible_world.push(name.clone());
        }
    }

    /// Files providing `provide`, in aggregation order.
    pub fn providers(&self, provide: &str) -> &[VirtualName] {
        self.providers.get(provide).map(Vec::as_slice).unwrap_or_default()
    }

    /// Files runtime-providing `rprovide`, in aggregation order.
    pub fn rproviders(&self, rprovide: &str) -> &[VirtualName] {
        self.rproviders.get(rprovide).map(Vec::as_slice).unwrap_or_default()
    }

    /// Files producing output package `package`.
    pub fn package_files(&self, package: &str) -> &[VirtualName] {
        self.packages.get(package).map(Vec::as_slice).unwrap_or_default()
    }

    /// Files declaring dynamic package pattern `pattern`.
    pub fn dynamic_package_files(&self, pattern: &str) -> &[VirtualName] {
        self.packages_dynamic.get(pattern).map(Vec::as_slice).unwrap_or_default()
    }

    /// Files of recipe `name` (one per variant and version).
    pub fn recipe_files(&self, name: &str) -> &[VirtualName] {
        self.recipe_files.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Everything recipe `name` provides across all of its files.
    pub fn name_provides(&self, name: &str) -> &[String] {
        self.name_provides.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// What one file provides: its recipe name, then its declared provides.
    pub fn file_provides(&self, file: &VirtualName) -> &[String] {
        self.file_provides.get(file).map(Vec::as_slice).unwrap_or_default()
    }

    /// Build-time dependencies of one file.
    pub fn build_deps(&self, file: &VirtualName) -> &[String] {
        self.build_deps.get(file).map(Vec::as_slice).unwrap_or_default()
    }

    /// Every build-time dependency seen, in first-seen order.
    pub fn all_depends(&self) -> &[String] {
        &self.all_depends.items
    }

    /// Runtime dependencies of `package` in `file`.
    pub fn rundeps(&self, file: &VirtualName, package: &str) -> Option<&[String]> {
        self.rundeps.get(file)?.get(package).map(Vec::as_slice)
    }

    /// Runtime recommendations of `package` in `file`.
    pub fn runrecs(&self, file: &VirtualName, package: &str) -> Option<&[String]> {
        self.runrecs.get(file)?.get(package).map(Vec::as_slice)
    }

    /// All per-package runtime dependency lists of `file`.
    pub fn file_rundeps(&self, file: &VirtualName) -> Option<&PackageLists> {
        self.rundeps.get(file)
    }

    /// All per-package runtime recommendation lists of `file`.
    pub fn file_runrecs(&self, file: &VirtualName) -> Option<&PackageLists> {
        self.runrecs.get(file)
    }

    /// Candidate files for a build-everything request.
    pub fn possible_world(&self) -> &[VirtualName] {
        &self.possible_world.items
    }

    /// The recipe name a file belongs to.
    pub fn recipe_name(&self, file: &VirtualName) -> Option<&str> {
        self.recipe_name.get(file).map(String::as_str)
    }

    /// Epoch, version and revision of a file.
    pub fn version(&self, file: &VirtualName) -> Option<&RecipeVersion> {
        self.versions.get(file)
    }

    /// Provider preference of a file.
    pub fn default_preference(&self, file: &VirtualName) -> Option<i64> {
        self.preference.get(file).copied()
    }

    /// Stamp prefix of a file.
    pub fn stamp(&self, file: &VirtualName) -> Option<&str> {
        self.stamps.get(file).map(String::as_str)
    }

    /// Task dependency graph of a file.
    pub fn task_deps(&self, file: &VirtualName) -> Option<&TaskDeps> {
        self.task_deps.get(file)
    }

    /// Number of files aggregated.
    pub fn len(&self) -> usize {
        self.recipe_name.len()
    }

    /// Returns `true` if nothing has been aggregated.
    pub fn is_empty(&self) -> bool {
        self.recipe_name.is_empty()
    }
}
