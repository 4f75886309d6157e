//! Configuration types deserialized from `kiln.toml`.

use kiln_common::{newest_mtime, FileDepend, Mtime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The contents of one configuration file.
#[derive(Debug, Default, Deserialize)]
pub struct KilnConfig {
    /// Additional configuration files, relative to the project directory.
    #[serde(default)]
    pub include: Vec<String>,
    /// Recipe cache settings. Only allowed in the top-level `kiln.toml`.
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    /// Global variables handed to the recipe parser.
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// The `[cache]` table.
#[derive(Debug, Default, Deserialize)]
pub struct CacheConfig {
    /// Directory holding the persisted cache. Absent or empty disables caching.
    #[serde(default)]
    pub dir: Option<String>,
}

/// A fully loaded configuration: the main file, its includes, and the files
/// it was read from.
#[derive(Debug, Default)]
pub struct ConfigData {
    /// Directory containing `kiln.toml`; relative paths resolve against it.
    pub project_dir: PathBuf,
    /// The parsed top-level file.
    pub config: KilnConfig,
    /// Global variables after merging includes (the top-level file wins).
    pub vars: BTreeMap<String, String>,
    /// Every configuration file read, with its mtime at load time.
    pub depends: Vec<FileDepend>,
}

impl ConfigData {
    /// Returns the cache directory, or `None` if caching is disabled.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        let dir = self.config.cache.as_ref()?.dir.as_deref()?.trim();
        if dir.is_empty() {
            return None;
        }
        Some(self.project_dir.join(dir))
    }

    /// Looks up a merged global variable.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Returns the newest mtime among the configuration's own files.
    pub fn newest_depend(&self) -> Mtime {
        newest_mtime(&self.depends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_cache(dir: Option<&str>) -> ConfigData {
        ConfigData {
            project_dir: PathBuf::from("/work/build"),
            config: KilnConfig {
                cache: Some(CacheConfig {
                    dir: dir.map(str::to_string),
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn cache_dir_resolves_against_project() {
        let data = with_cache(Some("cache"));
        assert_eq!(data.cache_dir(), Some(PathBuf::from("/work/build/cache")));
    }

    #[test]
    fn absolute_cache_dir_is_kept() {
        let data = with_cache(Some("/var/cache/kiln"));
        assert_eq!(data.cache_dir(), Some(PathBuf::from("/var/cache/kiln")));
    }

    #[test]
    fn empty_cache_dir_disables() {
        assert!(with_cache(Some("")).cache_dir().is_none());
        assert!(with_cache(Some("  ")).cache_dir().is_none());
        assert!(with_cache(None).cache_dir().is_none());
        assert!(ConfigData::default().cache_dir().is_none());
    }

    #[test]
    fn newest_depend_over_files() {
        let data = ConfigData {
            depends: vec![FileDepend::new("kiln.toml", 10), FileDepend::new("a.toml", 30)],
            ..Default::default()
        };
        assert_eq!(data.newest_depend(), 30);
    }
}
