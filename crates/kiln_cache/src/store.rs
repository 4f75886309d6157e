//! The snapshot table and its per-run validity bookkeeping.
//!
//! A [`ValidityStore`] owns every cached [`RecipeSnapshot`], loads the
//! persisted table at construction, decides from modification times whether a
//! snapshot can still be trusted, and writes the table back when it changed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_common::{Mtime, MtimeSource, VirtualName};
use kiln_config::ConfigData;
use tracing::{debug, error, info, warn};

use crate::error::CacheError;
use crate::persist::{decode_payload, encode_payload, CacheTarget, FileTarget, VersionTag};
use crate::snapshot::{RecipeSnapshot, UNRESOLVED_REVISION};

/// Why a cached snapshot failed the thorough check.
enum Staleness {
    NotCached,
    FileMissing,
    FileChanged,
    DependRemoved(PathBuf),
    DependChanged(PathBuf),
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Staleness::NotCached => f.write_str("is not cached"),
            Staleness::FileMissing => f.write_str("no longer exists"),
            Staleness::FileChanged => f.write_str("changed"),
            Staleness::DependRemoved(p) => write!(f, "dependency {} was removed", p.display()),
            Staleness::DependChanged(p) => write!(f, "dependency {} changed", p.display()),
        }
    }
}

/// Cache of recipe snapshots keyed by virtual filename.
///
/// `clean` and `checked` live only for the current run: once a base file has
/// been thoroughly checked its verdict is memoized, even if files change
/// afterwards. Dropping a store that has unsaved changes saves it.
pub struct ValidityStore {
    has_cache: bool,
    target: Option<Box<dyn CacheTarget>>,
    version: VersionTag,
    mtimes: Arc<dyn MtimeSource>,

    table: HashMap<VirtualName, RecipeSnapshot>,
    clean: HashSet<VirtualName>,
    checked: HashSet<VirtualName>,
    dirty: bool,
}

impl ValidityStore {
    /// Opens the store configured by `config`.
    ///
    /// Without a cache directory the store is disabled: every file is invalid
    /// and nothing is persisted.
    pub fn open(config: &ConfigData, mtimes: Arc<dyn MtimeSource>, tool_version: &str) -> Self {
        match config.cache_dir() {
            Some(dir) => {
                debug!("Using cache in '{}'", dir.display());
                Self::with_target(
                    Box::new(FileTarget::new(&dir)),
                    config.newest_depend(),
                    mtimes,
                    tool_version,
                )
            }
            None => {
                info!("Not using a cache. Set [cache] dir in kiln.toml to enable.");
                Self::disabled(mtimes, tool_version)
            }
        }
    }

    /// Creates a store that never considers anything valid and never saves.
    pub fn disabled(mtimes: Arc<dyn MtimeSource>, tool_version: &str) -> Self {
        Self {
            has_cache: false,
            target: None,
            version: VersionTag::new(tool_version),
            mtimes,
            table: HashMap::new(),
            clean: HashSet::new(),
            checked: HashSet::new(),
            dirty: false,
        }
    }

    /// Creates a store persisted to `target`, loading its table.
    ///
    /// Loading is skipped when `newest_config`, the newest mtime among the
    /// configuration files, is newer than the persisted file. An unreadable,
    /// truncated, corrupt or version-mismatched file yields an empty table.
    pub fn with_target(
        target: Box<dyn CacheTarget>,
        newest_config: Mtime,
        mtimes: Arc<dyn MtimeSource>,
        tool_version: &str,
    ) -> Self {
        let version = VersionTag::new(tool_version);
        let table = load_table(target.as_ref(), newest_config, &version);
        Self {
            has_cache: true,
            target: Some(target),
            version,
            mtimes,
            table,
            clean: HashSet::new(),
            checked: HashSet::new(),
            dirty: false,
        }
    }

    /// Returns `true` if caching is enabled.
    pub fn has_cache(&self) -> bool {
        self.has_cache
    }

    /// Returns `true` if the table changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns `true` if the thorough check already ran for `name` this run.
    pub fn is_checked(&self, name: &VirtualName) -> bool {
        self.checked.contains(name)
    }

    /// Returns the snapshot stored for `name`.
    pub fn get(&self, name: &VirtualName) -> Option<&RecipeSnapshot> {
        self.table.get(name)
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if no snapshots are stored.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The mtime source used for validation and new snapshots.
    pub fn mtimes(&self) -> &dyn MtimeSource {
        self.mtimes.as_ref()
    }

    /// Fast validity check: no timestamps, only this run's verdicts.
    pub fn cache_valid(&self, name: &VirtualName) -> bool {
        self.has_cache && self.clean.contains(name)
    }

    /// Thorough validity check of a base file and its declared variants.
    ///
    /// The file is marked clean before checking so that lookups made during
    /// the check see it as valid; a failed check revokes the mark. A stale
    /// file or dependency evicts the snapshot. A declared variant without a
    /// snapshot invalidates the whole sibling group in this run, but leaves
    /// the base snapshot stored.
    pub fn cache_valid_update(&mut self, name: &VirtualName) -> bool {
        if !self.has_cache {
            return false;
        }

        self.checked.insert(name.clone());
        self.clean.insert(name.clone());

        let verdict = match self.table.get(name) {
            None => Some(Staleness::NotCached),
            Some(info) => self.stale_files(name, info),
        };
        if let Some(reason) = verdict {
            debug!("Cache: {name} {reason}");
            self.remove(name);
            return false;
        }

        let variants = self
            .table
            .get(name)
            .map(|info| info.variants.clone())
            .unwrap_or_default();

        let mut invalid = false;
        for variant in &variants {
            match name.with_variant(variant) {
                Ok(virtual_name) => {
                    if !self.table.contains_key(&virtual_name) {
                        debug!("Cache: {virtual_name} is not cached");
                        invalid = true;
                    }
                    self.clean.insert(virtual_name);
                }
                Err(e) => {
                    debug!("Cache: {name} declares an unusable variant: {e}");
                    invalid = true;
                }
            }
        }

        // Variants come from one parse; a partial set is not trusted.
        if invalid {
            for virtual_name in variants.iter().filter_map(|v| name.with_variant(v).ok()) {
                if self.clean.remove(&virtual_name) {
                    debug!("Cache: Removing {virtual_name} from clean set");
                }
            }
            if self.clean.remove(name) {
                debug!("Cache: Marking {name} as not clean");
            }
            return false;
        }

        true
    }

    fn stale_files(&self, name: &VirtualName, info: &RecipeSnapshot) -> Option<Staleness> {
        let mtime = self.mtimes.mtime(Path::new(name.real_path()));
        if mtime == 0 {
            return Some(Staleness::FileMissing);
        }
        if mtime != info.timestamp {
            return Some(Staleness::FileChanged);
        }

        for dep in &info.file_depends {
            let current = self.mtimes.mtime(&dep.path);
            if dep.mtime != 0 && current == 0 {
                return Some(Staleness::DependRemoved(dep.path.clone()));
            }
            if current != dep.mtime {
                return Some(Staleness::DependChanged(dep.path.clone()));
            }
        }
        None
    }

    /// Evicts exactly one snapshot and its clean mark. Does not cascade.
    pub fn remove(&mut self, name: &VirtualName) {
        if self.table.remove(name).is_some() {
            debug!("Removing {name} from cache");
        }
        if self.clean.remove(name) {
            debug!("Marking {name} as unclean");
        }
    }

    /// Stores a freshly parsed snapshot, replacing any previous one.
    ///
    /// Marks the table as needing a save unless the snapshot is `nocache`.
    pub fn insert(&mut self, name: VirtualName, snapshot: RecipeSnapshot) {
        if !snapshot.nocache {
            self.dirty = true;
        }
        self.table.insert(name, snapshot);
    }

    /// Saves the table if it changed.
    ///
    /// `nocache` snapshots are left out, as are snapshots whose version still
    /// carries the unresolved-revision marker (logged as an error).
    pub fn sync(&mut self) -> Result<(), CacheError> {
        if !self.has_cache {
            return Ok(());
        }
        if !self.dirty {
            debug!("Cache is clean, not saving.");
            return Ok(());
        }
        let Some(target) = self.target.as_mut() else {
            return Ok(());
        };

        let mut persisted = BTreeMap::new();
        for (name, info) in &self.table {
            if info.nocache {
                debug!("Not caching {name}, marked as not cacheable");
                continue;
            }
            if info.has_unresolved_revision() {
                error!(
                    "Not caching {name} as it had {UNRESOLVED_REVISION} in its version. \
                     Please report this bug"
                );
                continue;
            }
            persisted.insert(name.encode(), info);
        }

        let bytes = encode_payload(&persisted, &self.version)?;
        target.write(&bytes)?;
        debug!(
            "Saved {} snapshots to '{}'",
            persisted.len(),
            target.location().display()
        );
        self.dirty = false;
        Ok(())
    }
}

impl Drop for ValidityStore {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.sync() {
                warn!("Failed to save recipe cache: {e}");
            }
        }
    }
}

fn load_table(
    target: &dyn CacheTarget,
    newest_config: Mtime,
    version: &VersionTag,
) -> HashMap<VirtualName, RecipeSnapshot> {
    let cache_mtime = target.mtime();
    if cache_mtime == 0 {
        debug!("No cache at '{}'", target.location().display());
        return HashMap::new();
    }
    // Configuration newer than the cache means nothing in it can be trusted.
    if cache_mtime < newest_config {
        info!("Out of date cache found, rebuilding...");
        return HashMap::new();
    }

    match target.read().and_then(|raw| decode_payload(&raw, version)) {
        Ok(table) => {
            debug!("Loaded {} snapshots from cache", table.len());
            table
                .into_iter()
                .map(|(key, info)| (VirtualName::decode(&key), info))
                .collect()
        }
        Err(e) => {
            info!("Invalid cache found, rebuilding... ({e})");
            HashMap::new()
        }
    }
}
