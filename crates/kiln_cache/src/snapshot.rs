//! Cached per-variant recipe facts and their extraction from a metadata store.

use std::collections::BTreeMap;
use std::path::Path;

use kiln_common::{explode_deps, FileDepend, Mtime, MtimeSource};
use serde::{Deserialize, Serialize};

use crate::metadata::{MetadataStore, TaskDeps};

/// Marker left in a version string whose source revision is still being
/// resolved. Such snapshots are never persisted.
pub const UNRESOLVED_REVISION: &str = "SRCREVINACTION";

/// The metadata variables a snapshot is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    /// Recipe name (`PN`).
    Name,
    /// Version (`PV`).
    Version,
    /// Revision (`PR`).
    Revision,
    /// Epoch (`PE`).
    Epoch,
    /// Provider preference (`DEFAULT_PREFERENCE`).
    DefaultPreference,
    /// Build-time dependencies (`DEPENDS`).
    Depends,
    /// Build-time provides (`PROVIDES`).
    Provides,
    /// Runtime dependencies (`RDEPENDS`, per package `RDEPENDS_<pkg>`).
    RDepends,
    /// Runtime provides (`RPROVIDES`, per package `RPROVIDES_<pkg>`).
    RProvides,
    /// Runtime recommendations (`RRECOMMENDS`, per package `RRECOMMENDS_<pkg>`).
    RRecommends,
    /// Output packages (`PACKAGES`).
    Packages,
    /// Dynamic package patterns (`PACKAGES_DYNAMIC`).
    PackagesDynamic,
    /// Stamp file prefix (`STAMP`).
    Stamp,
    /// Recipe is known broken (`BROKEN`).
    Broken,
    /// Recipe is excluded from world builds (`EXCLUDE_FROM_WORLD`).
    NotWorld,
    /// Snapshot must not be persisted (`__BB_DONT_CACHE`).
    NoCache,
    /// Reason the parser skipped the recipe (`__SKIPPED`).
    Skipped,
    /// Variant tags produced from the same file (`__VARIANTS`).
    Variants,
}

impl Field {
    /// The metadata variable this field is read from.
    pub const fn var(self) -> &'static str {
        match self {
            Field::Name => "PN",
            Field::Version => "PV",
            Field::Revision => "PR",
            Field::Epoch => "PE",
            Field::DefaultPreference => "DEFAULT_PREFERENCE",
            Field::Depends => "DEPENDS",
            Field::Provides => "PROVIDES",
            Field::RDepends => "RDEPENDS",
            Field::RProvides => "RPROVIDES",
            Field::RRecommends => "RRECOMMENDS",
            Field::Packages => "PACKAGES",
            Field::PackagesDynamic => "PACKAGES_DYNAMIC",
            Field::Stamp => "STAMP",
            Field::Broken => "BROKEN",
            Field::NotWorld => "EXCLUDE_FROM_WORLD",
            Field::NoCache => "__BB_DONT_CACHE",
            Field::Skipped => "__SKIPPED",
            Field::Variants => "__VARIANTS",
        }
    }

    /// Reads the raw value, empty when unset.
    fn string<S: MetadataStore + ?Sized>(self, store: &S) -> String {
        store.get(self.var()).unwrap_or_default()
    }

    fn list<S: MetadataStore + ?Sized>(self, store: &S) -> Vec<String> {
        self.string(store)
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    fn int<S: MetadataStore + ?Sized>(self, store: &S) -> i64 {
        let raw = self.string(store);
        let raw = raw.trim();
        if raw.is_empty() {
            return 0;
        }
        raw.parse().unwrap_or_else(|_| {
            tracing::debug!("{} = {raw:?} is not an integer, using 0", self.var());
            0
        })
    }

    fn deps<S: MetadataStore + ?Sized>(self, store: &S) -> Vec<String> {
        explode_deps(&self.string(store))
    }

    fn flag<S: MetadataStore + ?Sized>(self, store: &S) -> bool {
        !self.string(store).trim().is_empty()
    }

    fn optional<S: MetadataStore + ?Sized>(self, store: &S) -> Option<String> {
        Some(self.string(store)).filter(|s| !s.trim().is_empty())
    }

    /// Reads `<VAR>_<package>` for every package.
    fn per_package<S: MetadataStore + ?Sized>(
        self,
        store: &S,
        packages: &[String],
    ) -> BTreeMap<String, Vec<String>> {
        packages
            .iter()
            .map(|pkg| {
                let value = store
                    .get(&format!("{}_{pkg}", self.var()))
                    .unwrap_or_default();
                (pkg.clone(), explode_deps(&value))
            })
            .collect()
    }
}

/// Every recipe-derived fact the cache keeps for one (file, variant) pair.
///
/// Created once per parse and never mutated; a re-parse replaces it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSnapshot {
    /// Recipe name.
    pub name: String,
    /// Recipe version.
    pub version: String,
    /// Recipe revision.
    pub revision: String,
    /// Recipe epoch.
    pub epoch: String,
    /// Provider preference; higher wins ties.
    pub default_preference: i64,
    /// Task dependency graph.
    pub task_deps: TaskDeps,
    /// Stamp file prefix.
    pub stamp: String,

    /// Build-time dependencies.
    pub depends: Vec<String>,
    /// Build-time provides.
    pub provides: Vec<String>,
    /// Recipe-level runtime dependencies.
    pub rdepends: Vec<String>,
    /// Recipe-level runtime provides.
    pub rprovides: Vec<String>,
    /// Recipe-level runtime recommendations.
    pub rrecommends: Vec<String>,
    /// Per-package runtime dependency overrides.
    pub rdepends_pkg: BTreeMap<String, Vec<String>>,
    /// Per-package runtime provides.
    pub rprovides_pkg: BTreeMap<String, Vec<String>>,
    /// Per-package runtime recommendation overrides.
    pub rrecommends_pkg: BTreeMap<String, Vec<String>>,

    /// Output packages.
    pub packages: Vec<String>,
    /// Dynamic package name patterns.
    pub packages_dynamic: Vec<String>,

    /// Never persist this snapshot.
    pub nocache: bool,
    /// Recipe is known broken.
    pub broken: bool,
    /// Recipe is excluded from world builds.
    pub not_world: bool,
    /// Why the parser skipped the recipe, if it did.
    pub skipped: Option<String>,

    /// Modification time of the physical file when parsed.
    pub timestamp: Mtime,
    /// Every file read while parsing, with its mtime at the time.
    pub file_depends: Vec<FileDepend>,
    /// Variant tags produced from the same physical file, including `""`.
    pub variants: Vec<String>,
}

impl RecipeSnapshot {
    /// Extracts a snapshot from one variant's metadata store.
    ///
    /// Missing numbers read as 0 and missing lists as empty. The timestamp is
    /// the current mtime of `real_path`.
    pub fn from_metadata<S: MetadataStore + ?Sized>(
        real_path: &Path,
        store: &S,
        mtimes: &dyn MtimeSource,
    ) -> Self {
        let packages = Field::Packages.list(store);
        let mut variants = Field::Variants.list(store);
        variants.push(String::new());

        Self {
            name: Field::Name.string(store),
            version: Field::Version.string(store),
            revision: Field::Revision.string(store),
            epoch: Field::Epoch.string(store),
            default_preference: Field::DefaultPreference.int(store),
            task_deps: store.task_deps().unwrap_or_default(),
            stamp: Field::Stamp.string(store),
            depends: Field::Depends.deps(store),
            provides: Field::Provides.deps(store),
            rdepends: Field::RDepends.deps(store),
            rprovides: Field::RProvides.deps(store),
            rrecommends: Field::RRecommends.deps(store),
            rdepends_pkg: Field::RDepends.per_package(store, &packages),
            rprovides_pkg: Field::RProvides.per_package(store, &packages),
            rrecommends_pkg: Field::RRecommends.per_package(store, &packages),
            packages_dynamic: Field::PackagesDynamic.list(store),
            packages,
            nocache: Field::NoCache.flag(store),
            broken: Field::Broken.flag(store),
            not_world: Field::NotWorld.flag(store),
            skipped: Field::Skipped.optional(store),
            timestamp: mtimes.mtime(real_path),
            file_depends: store.file_depends(),
            variants,
        }
    }

    /// Returns `true` if the parser skipped this recipe.
    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Returns `true` if the version still carries the unresolved-revision marker.
    pub fn has_unresolved_revision(&self) -> bool {
        self.version.contains(UNRESOLVED_REVISION)
    }

    /// Effective runtime dependencies of `package`: the recipe-level list,
    /// plus the package's own list when it is an output package.
    pub fn runtime_depends(&self, package: &str) -> Vec<String> {
        Self::effective(&self.rdepends, &self.rdepends_pkg, package)
    }

    /// Effective runtime recommendations of `package`.
    pub fn runtime_recommends(&self, package: &str) -> Vec<String> {
        Self::effective(&self.rrecommends, &self.rrecommends_pkg, package)
    }

    fn effective(
        recipe_level: &[String],
        per_package: &BTreeMap<String, Vec<String>>,
        package: &str,
    ) -> Vec<String> {
        let mut out = recipe_level.to_vec();
        if let Some(extra) = per_package.get(package) {
            out.extend(extra.iter().cloned());
        }
        out
    }
}
