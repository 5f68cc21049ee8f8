//! Regeneration decisions for tracked artifacts and for the metabase itself.
//!
//! Content hash is the source of truth. Size and mtime only decide how a
//! difference is classified: a file whose mtime moved but whose bytes hash the
//! same is `Touched`, which refreshes its manifest entry without regenerating.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::{debug, trace};

use crate::cache::{CacheEntry, MetabaseStamp};
use crate::error::Error;
use crate::hasher;
use crate::metabase::{ExtensionSource, MetabaseMetadata};
use crate::types::ContentHash;

/// How a source compares to its manifest entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Content differs from the recorded hash.
    Changed,
    /// Size, mtime, and hash all match.
    Fresh,
    /// No manifest entry exists.
    New,
    /// Only the mtime moved; content hashes the same.
    Touched,
}

/// Whether the metabase generator has to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetabaseDecision {
    /// Inputs differ from the last generation, or a rebuild was forced.
    Generate,
    /// Same includes, metadata, and no extension sources: reuse the last one.
    Reuse,
}

impl Freshness {
    /// Whether the derived artifact must be regenerated.
    pub const fn needs_regeneration(self) -> bool {
        return matches!(self, Freshness::Changed | Freshness::New);
    }

    /// Whether the manifest entry must be rewritten.
    pub const fn needs_manifest_update(self) -> bool {
        return !matches!(self, Freshness::Fresh);
    }
}

/// Classify the live triple of a source against its previous entry.
pub fn classify(current: &CacheEntry, previous: Option<&CacheEntry>) -> Freshness {
    let Some(previous) = previous else {
        return Freshness::New;
    };
    if current.hash != previous.hash || current.size != previous.size {
        return Freshness::Changed;
    }
    if current.mtime != previous.mtime {
        return Freshness::Touched;
    }
    return Freshness::Fresh;
}

/// Whether `output`, derived from a source in state `freshness`, must be
/// written again. A missing output is always rewritten.
pub fn should_regenerate(freshness: Freshness, output: &Path) -> bool {
    return freshness.needs_regeneration() || !output.exists();
}

/// Live `(size, mtime, hash)` of a file. When the caller passes the bytes it
/// already derived output from, size and hash describe those bytes rather
/// than whatever is on disk now.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file is missing, or `Error::Io`.
pub fn current_entry(path: &Path, contents: Option<&[u8]>) -> Result<CacheEntry, Error> {
    let metadata = match std::fs::metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path: path.to_path_buf() });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(m) => m,
    };

    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| return u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0);

    let (hash, size) = match contents {
        Some(bytes) => (hasher::hash_bytes(bytes), u64::try_from(bytes.len()).unwrap_or(u64::MAX)),
        None => (hasher::hash_file(path)?, metadata.len()),
    };

    return Ok(CacheEntry { hash, mtime, size });
}

/// Evaluate a file on disk against its previous entry. Returns the decision
/// and the fresh entry to record (all three fields together).
///
/// # Errors
///
/// Returns errors from reading file metadata or contents.
pub fn evaluate(
    path: &Path,
    contents: Option<&[u8]>,
    previous: Option<&CacheEntry>,
) -> Result<(Freshness, CacheEntry), Error> {
    let current = current_entry(path, contents)?;
    let freshness = classify(&current, previous);
    trace!(path = %path.display(), ?freshness, "evaluated");
    return Ok((freshness, current));
}

/// Fingerprint of a metabase generation request.
pub fn metabase_fingerprint(
    includes: &BTreeSet<String>,
    metadata: Option<&MetabaseMetadata>,
    extensions: &[ExtensionSource],
) -> ContentHash {
    let mut parts: Vec<String> = Vec::new();
    if let Some(m) = metadata {
        parts.push(m.sdk_type.clone());
        parts.push(m.sdk_path.clone());
        parts.push(m.min_version.clone());
    }
    parts.push(String::from("--includes--"));
    parts.extend(includes.iter().cloned());
    parts.push(String::from("--extensions--"));
    for extension in extensions {
        parts.push(extension.package.clone());
        parts.push(extension.metabase.to_string_lossy().into_owned());
    }
    return hasher::hash_strings(&parts);
}

/// Decide whether metabase generation may be skipped.
pub fn decide_metabase(
    stamp_path: &Path,
    fingerprint: &ContentHash,
    has_extensions: bool,
    force: bool,
) -> MetabaseDecision {
    if force {
        debug!("forcing a metabase rebuild");
        return MetabaseDecision::Generate;
    }
    let cached = MetabaseStamp::load(stamp_path).is_some_and(|s| return &s.fingerprint == fingerprint);
    if cached && !has_extensions {
        return MetabaseDecision::Reuse;
    }
    return MetabaseDecision::Generate;
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn entry(hash: &str, mtime: u64, size: u64) -> CacheEntry {
        return CacheEntry { hash: ContentHash(hash.to_string()), mtime, size };
    }

    #[test]
    fn missing_entry_is_new() {
        assert_eq!(classify(&entry("h1", 1, 100), None), Freshness::New);
        assert!(Freshness::New.needs_regeneration());
    }

    #[test]
    fn identical_triple_is_fresh() {
        let e = entry("h1", 1, 100);
        assert_eq!(classify(&e, Some(&e)), Freshness::Fresh);
        assert!(!Freshness::Fresh.needs_manifest_update());
    }

    #[test]
    fn mtime_only_change_refreshes_manifest_without_regenerating() {
        let previous = entry("h1", 1, 100);
        let current = entry("h1", 2, 100);
        let freshness = classify(&current, Some(&previous));
        assert_eq!(freshness, Freshness::Touched);
        assert!(!freshness.needs_regeneration());
        assert!(freshness.needs_manifest_update());
    }

    #[test]
    fn content_or_size_change_regenerates() {
        let previous = entry("h1", 1, 100);
        assert_eq!(classify(&entry("h2", 1, 100), Some(&previous)), Freshness::Changed);
        assert_eq!(classify(&entry("h1", 1, 101), Some(&previous)), Freshness::Changed);
    }

    #[test]
    fn missing_output_regenerates_even_when_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("app.js");
        assert!(should_regenerate(Freshness::Fresh, &output));
        assert!(should_regenerate(Freshness::Touched, &output));

        std::fs::write(&output, "out").unwrap();
        assert!(!should_regenerate(Freshness::Fresh, &output));
        assert!(!should_regenerate(Freshness::Touched, &output));
        assert!(should_regenerate(Freshness::Changed, &output));
    }

    #[test]
    fn entry_describes_the_bytes_that_were_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "edited later").unwrap();
        let recorded = current_entry(&path, Some(b"abc")).unwrap();
        assert_eq!(recorded.hash, hasher::hash_bytes(b"abc"));
        assert_eq!(recorded.size, 3);

        let (freshness, _) = evaluate(&path, None, Some(&recorded)).unwrap();
        assert_eq!(freshness, Freshness::Changed);
    }

    #[test]
    fn evaluate_reads_disk_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.js");
        std::fs::write(&path, "abc").unwrap();
        let (freshness, recorded) = evaluate(&path, None, None).unwrap();
        assert_eq!(freshness, Freshness::New);
        assert_eq!(recorded.size, 3);
        assert_eq!(recorded.hash, hasher::hash_bytes(b"abc"));

        let (again, _) = evaluate(&path, Some(b"abc"), Some(&recorded)).unwrap();
        assert_eq!(again, Freshness::Fresh);
    }

    #[test]
    fn metabase_reused_only_when_fingerprint_matches() {
        let dir = tempfile::tempdir().unwrap();
        let stamp = dir.path().join("metabase_manifest.json");
        let mut includes = BTreeSet::new();
        includes.insert("<UIKit/UIKit.h>".to_string());
        let fingerprint = metabase_fingerprint(&includes, None, &[]);

        assert_eq!(decide_metabase(&stamp, &fingerprint, false, false), MetabaseDecision::Generate);
        MetabaseStamp { fingerprint: fingerprint.clone() }.save(&stamp).unwrap();
        assert_eq!(decide_metabase(&stamp, &fingerprint, false, false), MetabaseDecision::Reuse);
        assert_eq!(decide_metabase(&stamp, &fingerprint, true, false), MetabaseDecision::Generate);
        assert_eq!(decide_metabase(&stamp, &fingerprint, false, true), MetabaseDecision::Generate);

        includes.insert("<Foundation/Foundation.h>".to_string());
        let changed = metabase_fingerprint(&includes, None, &[]);
        assert_eq!(decide_metabase(&stamp, &changed, false, false), MetabaseDecision::Generate);
    }

    #[test]
    fn extensions_change_the_fingerprint() {
        let includes = BTreeSet::new();
        let extension = ExtensionSource {
            metabase: PathBuf::from("mykit.json"),
            package: "MyKit".to_string(),
        };
        assert_ne!(
            metabase_fingerprint(&includes, None, &[]),
            metabase_fingerprint(&includes, None, &[extension])
        );
    }
}
