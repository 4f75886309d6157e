//! File modification times, the sole validity signal of the recipe cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

/// A modification time in nanoseconds since the Unix epoch.
///
/// `0` means the file does not exist (or could not be stat'ed).
pub type Mtime = u64;

/// A file read while producing some derived data, with its mtime at the time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDepend {
    /// Path of the file that was read (or looked for).
    pub path: PathBuf,
    /// Its modification time when recorded, `0` if it did not exist.
    pub mtime: Mtime,
}

impl FileDepend {
    /// Creates a dependency record.
    pub fn new(path: impl Into<PathBuf>, mtime: Mtime) -> Self {
        Self {
            path: path.into(),
            mtime,
        }
    }
}

/// Returns the current modification time of `path`, or `0` if it cannot be read.
pub fn file_mtime(path: &Path) -> Mtime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Returns the newest recorded mtime in a dependency set, `0` when empty.
pub fn newest_mtime(depends: &[FileDepend]) -> Mtime {
    depends.iter().map(|d| d.mtime).max().unwrap_or(0)
}

/// A source of current modification times.
///
/// The cache consults this for every file and dependency it validates, so
/// tests can substitute a deterministic in-memory table.
pub trait MtimeSource: Send + Sync {
    /// Returns the current mtime of `path`, `0` if it does not exist.
    fn mtime(&self, path: &Path) -> Mtime;
}

/// Filesystem-backed [`MtimeSource`] that stats each path once per process.
///
/// A file modified after its first lookup keeps reporting the old time until
/// [`forget`](Self::forget) is called for it.
#[derive(Default)]
pub struct FsMtimes {
    memo: Mutex<HashMap<PathBuf, Mtime>>,
}

impl FsMtimes {
    /// Creates an empty lookup table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the memoized time for `path` so the next lookup stats it again.
    pub fn forget(&self, path: &Path) {
        self.memo
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
    }
}

impl MtimeSource for FsMtimes {
    fn mtime(&self, path: &Path) -> Mtime {
        let mut memo = self.memo.lock().unwrap_or_else(|e| e.into_inner());
        *memo
            .entry(path.to_path_buf())
            .or_insert_with(|| file_mtime(path))
    }
}
