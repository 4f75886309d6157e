//! On-disk representation of the snapshot table.
//!
//! The cache file is a 4-byte little-endian header length, a bincode
//! header carrying magic bytes, the [`VersionTag`] and a checksum of
//! the payload, then the bincode-encoded table keyed by encoded virtual
//! filename. A reader that finds anything unexpected discards the whole file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kiln_common::{file_mtime, ContentHash, Mtime};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::snapshot::RecipeSnapshot;

/// Name of the cache file within the cache directory.
pub const CACHE_FILE: &str = "kiln_cache.dat";

/// Version of the persisted layout. Bump on any change to [`RecipeSnapshot`]
/// or the header.
pub const CACHE_FORMAT_VERSION: &str = "1";

/// Magic bytes identifying a kiln cache file.
const CACHE_MAGIC: [u8; 4] = *b"KILN";

/// The persisted table: encoded virtual filename to snapshot.
pub type SnapshotTable = BTreeMap<String, RecipeSnapshot>;

/// Versions a cache file was written with. Both must match to load it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionTag {
    /// Layout version of the cache file.
    pub cache_version: String,
    /// Version of the tool that wrote it.
    pub tool_version: String,
}

impl VersionTag {
    /// Tag for the current layout written by `tool_version`.
    pub fn new(tool_version: &str) -> Self {
        Self {
            cache_version: CACHE_FORMAT_VERSION.to_string(),
            tool_version: tool_version.to_string(),
        }
    }
}

/// Header prepended to the table for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheHeader {
    magic: [u8; 4],
    version: VersionTag,
    checksum: ContentHash,
}

/// Where the cache file lives.
///
/// `Send` so a store owning its target can be handed to another thread.
pub trait CacheTarget: Send {
    /// Human-readable location, for logging.
    fn location(&self) -> &Path;

    /// Modification time of the persisted file, `0` if absent.
    fn mtime(&self) -> Mtime;

    /// Reads the whole persisted file.
    fn read(&self) -> Result<Vec<u8>, CacheError>;

    /// Replaces the persisted file with `bytes` in one step.
    fn write(&mut self, bytes: &[u8]) -> Result<(), CacheError>;
}

/// The cache file inside a cache directory.
#[derive(Debug, Clone)]
pub struct FileTarget {
    path: PathBuf,
}

impl FileTarget {
    /// Targets `<cache_dir>/kiln_cache.dat`.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            path: cache_dir.join(CACHE_FILE),
        }
    }
}

impl CacheTarget for FileTarget {
    fn location(&self) -> &Path {
        &self.path
    }

    fn mtime(&self) -> Mtime {
        file_mtime(&self.path)
    }

    fn read(&self) -> Result<Vec<u8>, CacheError> {
        std::fs::read(&self.path).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), CacheError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| CacheError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        // Write beside the target and rename over it so readers never see a
        // partially written file.
        let tmp = self.path.with_extension("dat.tmp");
        std::fs::write(&tmp, bytes).map_err(|e| CacheError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CacheError::Io {
            path: self.path.clone(),
            source: e,
        })
    }
}

/// Encodes a table and its version tag into cache-file bytes.
///
/// Takes borrowed snapshots so saving does not copy the table; the bytes
/// decode as a [`SnapshotTable`].
pub fn encode_payload(
    table: &BTreeMap<String, &RecipeSnapshot>,
    version: &VersionTag,
) -> Result<Vec<u8>, CacheError> {
    let payload = bincode::serde::encode_to_vec(table, bincode::config::standard()).map_err(|e| {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    })?;

    let header = CacheHeader {
        magic: CACHE_MAGIC,
        version: version.clone(),
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = u32::try_from(header_bytes.len()).map_err(|_| CacheError::Serialization {
        reason: "cache header too large".to_string(),
    })?;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decodes cache-file bytes written with the `expected` version tag.
///
/// Every failure (short input, bad magic, version mismatch, checksum
/// mismatch, undecodable payload) is [`CacheError::Unusable`].
pub fn decode_payload(raw: &[u8], expected: &VersionTag) -> Result<SnapshotTable, CacheError> {
    let unusable = |reason: &str| CacheError::Unusable {
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| unusable("truncated cache file"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = 4usize
        .checked_add(header_len)
        .filter(|end| *end <= raw.len())
        .ok_or_else(|| unusable("truncated cache header"))?;

    let (header, _): (CacheHeader, usize) =
        bincode::serde::decode_from_slice(&raw[4..header_end], bincode::config::standard())
            .map_err(|e| unusable(&format!("invalid cache header: {e}")))?;

    if header.magic != CACHE_MAGIC {
        return Err(unusable("not a kiln cache file"));
    }
    if header.version.cache_version != expected.cache_version {
        return Err(unusable(&format!(
            "cache version mismatch: expected {}, found {}",
            expected.cache_version, header.version.cache_version
        )));
    }
    if header.version.tool_version != expected.tool_version {
        return Err(unusable(&format!(
            "tool version mismatch: expected {}, found {}",
            expected.tool_version, header.version.tool_version
        )));
    }

    let payload = &raw[header_end..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(unusable(&format!(
            "checksum mismatch: expected {}, found {actual}",
            header.checksum
        )));
    }

    let (table, _): (SnapshotTable, usize) =
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map_err(|e| unusable(&format!("invalid cache payload: {e}")))?;
    Ok(table)
}
