//! Cache persistence: per-artifact-type manifests and the symbol-reference cache.
//!
//! Every cache file lives under the build-local cache directory and is
//! replaced atomically, so an interrupted build never leaves a truncated file
//! for the next build to trust. Unreadable cache files are treated as empty.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::error::Error;
use crate::types::ContentHash;

/// Independently invalidated cache files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Copied generated files (`sync`).
    CopyToOutput,
    /// Rewritten application sources.
    GeneratedSources,
    /// Fingerprint of the last metabase generation request.
    Metabase,
    /// Serialized references map of the last build.
    SymbolReferences,
}

impl CacheKind {
    /// File name of this cache inside the cache directory.
    pub const fn file_name(self) -> &'static str {
        return match self {
            CacheKind::CopyToOutput => "copy_manifest.json",
            CacheKind::GeneratedSources => "sources_manifest.json",
            CacheKind::Metabase => "metabase_manifest.json",
            CacheKind::SymbolReferences => "symbol_references.json",
        };
    }

    /// Full path of this cache inside `cache_dir`.
    pub fn path(self, cache_dir: &Path) -> PathBuf {
        return cache_dir.join(self.file_name());
    }
}

/// Size, modification time, and content hash of one tracked artifact.
/// Always written as a unit; never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Content hash of the source at the time it was recorded.
    pub hash: ContentHash,
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime: u64,
    /// Size in bytes.
    pub size: u64,
}

/// Relative path -> entry, for one artifact type. Sorted so the serialized
/// form is stable across builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Tracked entries keyed by path relative to their root.
    pub files: BTreeMap<String, CacheEntry>,
}

impl Manifest {
    /// Load a manifest. Missing or corrupt files yield an empty manifest,
    /// which forces full regeneration rather than failing the build.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("ignoring unreadable cache {}: {e}", path.display());
                return Self::default();
            },
            Ok(c) => c,
        };
        return match serde_json::from_str(&content) {
            Err(e) => {
                warn!("ignoring corrupt cache {}: {e}", path.display());
                Self::default()
            },
            Ok(manifest) => manifest,
        };
    }

    /// Previously recorded entry for `relative`.
    pub fn get(&self, relative: &str) -> Option<&CacheEntry> {
        return self.files.get(relative);
    }

    /// Record or replace the entry for `relative`.
    pub fn insert(&mut self, relative: String, entry: CacheEntry) {
        self.files.insert(relative, entry);
    }

    /// Atomically write the manifest to `path`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` on serialization failure, or `Error::CacheWrite`.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        return write_atomic(path, json.as_bytes());
    }
}

/// Fingerprint of the last metabase generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetabaseStamp {
    /// Hash over includes, SDK metadata, and extension sources.
    pub fingerprint: ContentHash,
}

impl MetabaseStamp {
    /// Load the stamp; `None` if missing or unreadable.
    pub fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        return serde_json::from_str(&content).ok();
    }

    /// Atomically write the stamp.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` or `Error::CacheWrite`.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(self)?;
        return write_atomic(path, json.as_bytes());
    }
}

/// Result of comparing this build's references map to the previous build's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolCacheStatus {
    /// Identical serialization; wrappers may be reused.
    UpToDate,
    /// Missing or different; wrappers must be regenerated.
    Changed,
}

/// Compare `references` (serialized as pretty JSON) byte-for-byte to the
/// stored symbol-reference cache, without touching it.
///
/// Any difference forces wrapper regeneration: a change in one file's
/// references can alter which wrappers are needed overall.
///
/// # Errors
///
/// Returns `Error::Json` if `references` can't be serialized.
pub fn check_symbol_references<T: Serialize>(
    cache_dir: &Path,
    references: &T,
) -> Result<SymbolCacheStatus, Error> {
    let json = serde_json::to_string_pretty(references)?;
    let previous = std::fs::read_to_string(CacheKind::SymbolReferences.path(cache_dir)).ok();
    if previous.as_deref() == Some(json.as_str()) {
        trace!("symbol references up-to-date");
        return Ok(SymbolCacheStatus::UpToDate);
    }
    trace!("symbol references changed, forcing wrapper regeneration");
    return Ok(SymbolCacheStatus::Changed);
}

/// Like [`check_symbol_references`], then store the new form when it differs.
///
/// # Errors
///
/// Returns `Error::Json` or `Error::CacheWrite` if the new cache can't be stored.
pub fn refresh_symbol_references<T: Serialize>(
    cache_dir: &Path,
    references: &T,
) -> Result<SymbolCacheStatus, Error> {
    let status = check_symbol_references(cache_dir, references)?;
    if status == SymbolCacheStatus::Changed {
        let json = serde_json::to_string_pretty(references)?;
        write_atomic(&CacheKind::SymbolReferences.path(cache_dir), json.as_bytes())?;
    }
    return Ok(status);
}

/// Write `bytes` to a temp file beside `path`, then rename it into place.
///
/// # Errors
///
/// Returns `Error::CacheWrite` naming `path` on any failure.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let cache_write = |reason: String| {
        return Error::CacheWrite { path: path.to_path_buf(), reason };
    };

    let dir = path.parent().filter(|p| return !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| return cache_write(e.to_string()))?;

    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| return cache_write(e.to_string()))?;
    temp.write_all(bytes).map_err(|e| return cache_write(e.to_string()))?;
    temp.as_file().sync_all().map_err(|e| return cache_write(e.to_string()))?;
    temp.persist(path).map_err(|e| return cache_write(e.error.to_string()))?;
    return Ok(());
}
