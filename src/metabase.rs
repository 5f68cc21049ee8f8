//! In-memory index of native packages, classes, and their includes.
//!
//! The index is produced by an external metabase generator as JSON shaped like
//! `{ "$metadata": {...}, "<package>": { "<class>": "<include>" } }` and is
//! read-only once a build session starts. Extension sources are folded in
//! order, each step producing a new index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::phonetic;

/// Reserved key holding SDK metadata rather than a package.
pub const METADATA_KEY: &str = "$metadata";

/// SDK information recorded alongside the packages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetabaseMetadata {
    /// Minimum supported platform version.
    #[serde(default)]
    pub min_version: String,
    /// Path to the platform SDK.
    #[serde(default)]
    pub sdk_path: String,
    /// SDK flavor, e.g. `iphonesimulator`.
    #[serde(default)]
    pub sdk_type: String,
}

/// One additional-source entry folded into the index after the broad pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExtensionSource {
    /// JSON fragment `{ class: include }` produced for that package.
    pub metabase: PathBuf,
    /// Package the fragment's classes belong to.
    pub package: String,
}

/// Package -> class -> include lookup table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetabaseIndex {
    metadata: Option<MetabaseMetadata>,
    packages: BTreeMap<String, BTreeMap<String, String>>,
}

impl MetabaseIndex {
    /// Build an index directly from package tables.
    #[cfg(test)]
    pub fn new(
        metadata: Option<MetabaseMetadata>,
        packages: BTreeMap<String, BTreeMap<String, String>>,
    ) -> Self {
        return Self { metadata, packages };
    }

    /// Read and validate a metabase JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the file is missing, `Error::Json` if it
    /// is not JSON, or `Error::MetabaseInvalid` if it is not shaped like a metabase.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::FileNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(path, &content);
    }

    /// Parse metabase JSON content. `origin` is only used in error messages.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` or `Error::MetabaseInvalid`.
    pub fn parse(origin: &Path, content: &str) -> Result<Self, Error> {
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)?;
        let mut metadata = None;
        let mut packages = BTreeMap::new();

        for (key, value) in raw {
            if key == METADATA_KEY {
                metadata = Some(serde_json::from_value(value)?);
                continue;
            }
            let classes = parse_class_table(origin, &key, value)?;
            packages.insert(key, classes);
        }

        debug!(packages = packages.len(), "loaded metabase {}", origin.display());
        return Ok(Self { metadata, packages });
    }

    /// SDK metadata, if the generator recorded it.
    pub const fn metadata(&self) -> Option<&MetabaseMetadata> {
        return self.metadata.as_ref();
    }

    /// Whether the package exists.
    pub fn has_package(&self, package: &str) -> bool {
        return self.packages.contains_key(package);
    }

    /// Include path for a class within a package.
    pub fn include_for(&self, package: &str, class: &str) -> Option<&str> {
        return self
            .packages
            .get(package)
            .and_then(|classes| return classes.get(class))
            .map(String::as_str);
    }

    /// Include of the package's umbrella class (`index[P][P]`).
    pub fn umbrella_include(&self, package: &str) -> Option<&str> {
        return self.include_for(package, package);
    }

    /// All package names, in lexical order.
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        return self.packages.keys().map(String::as_str);
    }

    /// First package (lexically) other than `except` that declares `class`.
    pub fn find_class_elsewhere(&self, class: &str, except: &str) -> Option<&str> {
        return self
            .packages
            .iter()
            .find(|(name, classes)| return name.as_str() != except && classes.contains_key(class))
            .map(|(name, _)| return name.as_str());
    }

    /// Package names whose phonetic code matches `name`, lexically ordered.
    pub fn phonetic_package_matches(&self, name: &str) -> Vec<String> {
        return phonetic::matches(name, self.package_names());
    }

    /// Number of packages.
    pub fn len(&self) -> usize {
        return self.packages.len();
    }

    /// New index with `classes` merged into `package`. Existing classes keep
    /// their include unless the fragment overrides them.
    #[must_use]
    pub fn extend(&self, package: &str, classes: BTreeMap<String, String>) -> Self {
        let mut next = self.clone();
        next.packages.entry(package.to_string()).or_default().extend(classes);
        return next;
    }

    /// Fold extension sources into the index in order, reading each fragment
    /// from disk. Each step consumes the previous step's index.
    ///
    /// # Errors
    ///
    /// Returns the first fragment load or validation error.
    pub fn fold_extensions(self, root: &Path, sources: &[ExtensionSource]) -> Result<Self, Error> {
        return sources.iter().try_fold(self, |index, source| {
            let path = root.join(&source.metabase);
            let content = match std::fs::read_to_string(&path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::FileNotFound { path });
                },
                Err(e) => return Err(Error::Io(e)),
                Ok(c) => c,
            };
            let value: serde_json::Value = serde_json::from_str(&content)?;
            let classes = parse_class_table(&path, &source.package, value)?;
            debug!(package = %source.package, classes = classes.len(), "folded extension metabase");
            return Ok(index.extend(&source.package, classes));
        });
    }
}

/// Validate one `{ class: include }` table.
///
/// # Errors
///
/// Returns `Error::MetabaseInvalid` if the value is not an object of strings.
fn parse_class_table(
    origin: &Path,
    package: &str,
    value: serde_json::Value,
) -> Result<BTreeMap<String, String>, Error> {
    let serde_json::Value::Object(entries) = value else {
        return Err(Error::MetabaseInvalid {
            path: origin.to_path_buf(),
            reason: format!("package `{package}` is not an object"),
        });
    };

    let mut classes = BTreeMap::new();
    for (class, include) in entries {
        let serde_json::Value::String(include) = include else {
            return Err(Error::MetabaseInvalid {
                path: origin.to_path_buf(),
                reason: format!("include for `{package}/{class}` is not a string"),
            });
        };
        classes.insert(class, include);
    }
    return Ok(classes);
}
