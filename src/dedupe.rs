//! Content-hash deduplication of native dependency artifacts.
//!
//! Archives (configured extensions, `jar` by default) are hashed in parallel.
//! A hash seen before, under any name, means the same artifact pulled in
//! twice: later copies are dropped. Same basename with a different hash is
//! fatal, since linking both would yield duplicate-class errors downstream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::info;

use crate::config::ArtifactRules;
use crate::error::Error;
use crate::hasher;
use crate::types::ContentHash;

/// One dependency artifact as seen by the deduplicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyArtifact {
    /// File name, compared across artifacts.
    pub basename: String,
    /// Content hash; `None` for exempt names and non-archives.
    pub content_hash: Option<ContentHash>,
    /// Location on disk.
    pub path: PathBuf,
}

/// Outcome of one deduplication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupeReport {
    /// Dropped duplicates: `(dropped, kept)`.
    pub duplicates: Vec<(PathBuf, PathBuf)>,
    /// Artifacts removed by a compatibility override.
    pub overridden: Vec<PathBuf>,
    /// Surviving artifacts, in input order.
    pub unique: Vec<DependencyArtifact>,
}

impl DedupeReport {
    /// Paths of the surviving artifacts.
    pub fn paths(&self) -> Vec<&Path> {
        return self.unique.iter().map(|a| return a.path.as_path()).collect();
    }
}

impl ArtifactRules {
    /// Whether `path` takes part in hashing and the basename check.
    pub fn is_tracked(&self, path: &Path, basename: &str) -> bool {
        if self.exempt.iter().any(|e| return e == basename) {
            return false;
        }
        let Some(ext) = path.extension().and_then(|e| return e.to_str()) else {
            return false;
        };
        return self.extensions.iter().any(|e| return e.eq_ignore_ascii_case(ext));
    }
}

/// Deduplicate `paths` by content hash, then apply legacy overrides.
///
/// # Errors
///
/// Returns `Error::ArtifactConflict` naming both paths when two tracked
/// artifacts share a basename but differ in content, or the hashing error
/// for an unreadable artifact.
pub fn dedupe(paths: &[PathBuf], rules: &ArtifactRules) -> Result<DedupeReport, Error> {
    let artifacts: Vec<DependencyArtifact> =
        paths.par_iter().map(|path| return describe(path, rules)).collect::<Result<_, _>>()?;

    let mut report = DedupeReport::default();
    let mut by_hash: HashMap<ContentHash, PathBuf> = HashMap::new();
    let mut by_basename: HashMap<String, PathBuf> = HashMap::new();

    for artifact in artifacts {
        let Some(hash) = artifact.content_hash.clone() else {
            report.unique.push(artifact);
            continue;
        };

        if let Some(kept) = by_hash.get(&hash) {
            info!("skipping duplicate {} (same contents as {})", artifact.path.display(), kept.display());
            report.duplicates.push((artifact.path, kept.clone()));
            continue;
        }

        if let Some(first) = by_basename.get(&artifact.basename) {
            return Err(Error::ArtifactConflict {
                basename: artifact.basename,
                first: first.clone(),
                second: artifact.path,
            });
        }

        by_hash.insert(hash, artifact.path.clone());
        by_basename.insert(artifact.basename.clone(), artifact.path.clone());
        report.unique.push(artifact);
    }

    apply_overrides(&mut report, rules);
    return Ok(report);
}

/// Hash `path` if the rules track it.
fn describe(path: &Path, rules: &ArtifactRules) -> Result<DependencyArtifact, Error> {
    let basename = path
        .file_name()
        .map(|n| return n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let content_hash = if rules.is_tracked(path, &basename) {
        Some(hasher::hash_file(path)?)
    } else {
        None
    };
    return Ok(DependencyArtifact { basename, content_hash, path: path.to_path_buf() });
}

/// Drop each legacy artifact whose replacement survived deduplication.
fn apply_overrides(report: &mut DedupeReport, rules: &ArtifactRules) {
    for rule in &rules.overrides {
        let superseded = report.unique.iter().any(|a| return a.basename == rule.superseded_by);
        if !superseded {
            continue;
        }
        let (dropped, kept): (Vec<_>, Vec<_>) =
            std::mem::take(&mut report.unique).into_iter().partition(|a| return a.basename == rule.legacy);
        report.unique = kept;
        for artifact in dropped {
            info!("dropping {} in favor of {}", artifact.path.display(), rule.superseded_by);
            report.overridden.push(artifact.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, relative: &str, contents: &str) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        return path;
    }

    #[test]
    fn same_name_same_contents_keeps_one() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "one/a.jar", "H1");
        let second = write(dir.path(), "two/a.jar", "H1");

        let report = dedupe(&[first.clone(), second.clone()], &ArtifactRules::default()).unwrap();
        assert_eq!(report.paths(), vec![first.as_path()]);
        assert_eq!(report.duplicates, vec![(second, first)]);
    }

    #[test]
    fn same_name_different_contents_is_a_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let first = write(dir.path(), "one/a.jar", "H1");
        let second = write(dir.path(), "two/a.jar", "H2");

        let err = dedupe(&[first.clone(), second.clone()], &ArtifactRules::default()).unwrap_err();
        let Error::ArtifactConflict { basename, first: f, second: s } = err else {
            panic!("expected conflict");
        };
        assert_eq!(basename, "a.jar");
        assert_eq!(f, first);
        assert_eq!(s, second);
    }

    #[test]
    fn exempt_names_and_non_archives_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write(dir.path(), "x/classes.jar", "X"),
            write(dir.path(), "y/classes.jar", "Y"),
            write(dir.path(), "x/libfoo.so", "S"),
            write(dir.path(), "y/libfoo.so", "T"),
        ];
        let report = dedupe(&paths, &ArtifactRules::default()).unwrap();
        assert_eq!(report.unique.len(), 4);
        assert!(report.unique.iter().all(|a| a.content_hash.is_none()));
    }

    #[test]
    fn input_order_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            write(dir.path(), "c.jar", "C"),
            write(dir.path(), "a.jar", "A"),
            write(dir.path(), "b.jar", "B"),
        ];
        let report = dedupe(&paths, &ArtifactRules::default()).unwrap();
        let names: Vec<&str> = report.unique.iter().map(|a| a.basename.as_str()).collect();
        assert_eq!(names, vec!["c.jar", "a.jar", "b.jar"]);
    }

    #[test]
    fn legacy_artifact_dropped_when_superseded() {
        let dir = tempfile::tempdir().unwrap();
        let v4 = write(dir.path(), "android-support-v4.jar", "V4");
        let v13 = write(dir.path(), "android-support-v13.jar", "V13");

        let report = dedupe(&[v4.clone(), v13.clone()], &ArtifactRules::default()).unwrap();
        assert_eq!(report.paths(), vec![v13.as_path()]);
        assert_eq!(report.overridden, vec![v4.clone()]);

        let alone = dedupe(&[v4.clone()], &ArtifactRules::default()).unwrap();
        assert_eq!(alone.paths(), vec![v4.as_path()]);
    }

    #[test]
    fn missing_artifact_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = dedupe(&[dir.path().join("gone.jar")], &ArtifactRules::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
