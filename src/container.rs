//! Extraction of packaged native dependency containers (`.aar`-shaped zips).
//!
//! Each container gets an exclusive working directory named after its stem,
//! so independent containers are extracted in parallel.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::Error;

/// Manifest embedded in every container.
pub const MANIFEST_FILE: &str = "AndroidManifest.xml";

/// Archive always shipped at the container root.
pub const CLASSES_ARCHIVE: &str = "classes.jar";

/// `package` attribute of the root `<manifest>` element.
const PACKAGE_ATTRIBUTE: &str = r#"<manifest\b[^>]*?\bpackage\s*=\s*"([^"]+)""#;

/// What one extracted container contributes to the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContainer {
    /// Archives to link: `classes.jar` first, then `libs/**/*.jar` sorted.
    pub archives: Vec<PathBuf>,
    /// Embedded asset tree, if the container ships one.
    pub assets: Option<PathBuf>,
    /// The container that was extracted.
    pub container: PathBuf,
    /// Native shared objects under `jni/`, sorted.
    pub native_libraries: Vec<PathBuf>,
    /// Package identifier from the embedded manifest.
    pub package: String,
    /// Directory the container was extracted into.
    pub work_dir: PathBuf,
}

/// Whether `path` names a container rather than a plain artifact.
pub fn is_container(path: &Path) -> bool {
    return path.extension().is_some_and(|e| return e.eq_ignore_ascii_case("aar"));
}

/// Extract every container into `<work_root>/<stem>`, in parallel.
/// Results keep the input order.
///
/// # Errors
///
/// Returns `Error::ContainerCollision` if two containers share a stem, or the
/// first `Error::ContainerExtraction` encountered.
pub fn extract_all(containers: &[PathBuf], work_root: &Path) -> Result<Vec<ExtractedContainer>, Error> {
    let mut claimed: HashMap<PathBuf, &PathBuf> = HashMap::new();
    for container in containers {
        let dir = work_dir_for(container, work_root)?;
        if let Some(first) = claimed.insert(dir.clone(), container) {
            return Err(Error::ContainerCollision {
                first: first.clone(),
                second: container.clone(),
                work_dir: dir,
            });
        }
    }

    return containers.par_iter().map(|container| return extract(container, work_root)).collect();
}

/// Extract one container into `<work_root>/<stem>`, replacing whatever was
/// there, and enumerate what it ships.
///
/// # Errors
///
/// Returns `Error::ContainerExtraction` naming the container if it can't be
/// opened, unzipped, or carries no readable manifest package.
pub fn extract(container: &Path, work_root: &Path) -> Result<ExtractedContainer, Error> {
    let failed = |reason: String| {
        return Error::ContainerExtraction { container: container.to_path_buf(), reason };
    };

    let work_dir = work_dir_for(container, work_root)?;
    if work_dir.exists() {
        std::fs::remove_dir_all(&work_dir).map_err(|e| return failed(e.to_string()))?;
    }
    std::fs::create_dir_all(&work_dir).map_err(|e| return failed(e.to_string()))?;

    let file = File::open(container).map_err(|e| return failed(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| return failed(e.to_string()))?;
    archive.extract(&work_dir).map_err(|e| return failed(e.to_string()))?;
    debug!(container = %container.display(), entries = archive.len(), "extracted");

    let manifest = std::fs::read_to_string(work_dir.join(MANIFEST_FILE))
        .map_err(|e| return failed(format!("cannot read {MANIFEST_FILE}: {e}")))?;
    let package = manifest_package(&manifest)?
        .ok_or_else(|| return failed(format!("{MANIFEST_FILE} declares no package")))?;

    let mut archives = vec![work_dir.join(CLASSES_ARCHIVE)];
    archives.extend(files_with_extension(&work_dir.join("libs"), "jar"));
    let native_libraries = files_with_extension(&work_dir.join("jni"), "so");
    let assets = Some(work_dir.join("assets")).filter(|p| return p.is_dir());

    info!("extracted {} ({package})", container.display());
    return Ok(ExtractedContainer {
        archives,
        assets,
        container: container.to_path_buf(),
        native_libraries,
        package,
        work_dir,
    });
}

/// `package` attribute of the root `<manifest>` element, if declared.
///
/// # Errors
///
/// Returns `Error::Pattern` if the attribute pattern fails to compile.
pub fn manifest_package(manifest: &str) -> Result<Option<String>, Error> {
    let pattern = Regex::new(PACKAGE_ATTRIBUTE)?;
    return Ok(pattern
        .captures(manifest)
        .and_then(|c| return c.get(1))
        .map(|m| return m.as_str().to_string()));
}

/// Exclusive working directory for one container.
fn work_dir_for(container: &Path, work_root: &Path) -> Result<PathBuf, Error> {
    let Some(stem) = container.file_stem() else {
        return Err(Error::ContainerExtraction {
            container: container.to_path_buf(),
            reason: "path has no file name".to_string(),
        });
    };
    return Ok(work_root.join(stem));
}

/// Files under `dir` with extension `ext`, sorted. A missing `dir` is empty.
fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut found: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file())
        .filter(|e| return e.path().extension().is_some_and(|x| return x == ext))
        .map(walkdir::DirEntry::into_path)
        .collect();
    found.sort();
    return found;
}
