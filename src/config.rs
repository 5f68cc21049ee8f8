use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::metabase::ExtensionSource;

/// Config file name looked up in the project root.
pub const CONFIG_FILE: &str = ".nativeref.toml";

/// Project configuration loaded from `.nativeref.toml`.
/// Include/exclude patterns are path prefixes applied to source files
/// relative to the source root.
#[derive(Debug, Clone)]
pub struct Config {
    /// Dependency artifact rules.
    pub artifacts: ArtifactRules,
    /// Packages resolved without an index lookup.
    pub builtin_packages: Vec<String>,
    /// Build-local cache directory, relative to the project root.
    pub cache_dir: PathBuf,
    /// Methods whose zero-argument call form became property access.
    pub deprecated_methods: Vec<String>,
    /// Ordered extension metabase fragments.
    pub extensions: Vec<ExtensionSource>,
    /// Reserved package names that are never native references.
    pub local_packages: Vec<String>,
    /// Source file extensions to scan, without the dot.
    pub source_extensions: Vec<String>,
    exclude: Vec<String>,
    include: Vec<String>,
}

/// Rules for hashing and deduplicating native dependency artifacts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ArtifactRules {
    /// Basenames exempt from the basename-uniqueness check.
    #[serde(default = "default_exempt_names")]
    pub exempt: Vec<String>,
    /// Archive extensions that take part in deduplication.
    #[serde(default = "default_archive_extensions")]
    pub extensions: Vec<String>,
    /// Explicit compatibility overrides applied after deduplication.
    #[serde(default = "default_overrides")]
    pub overrides: Vec<LegacyOverride>,
}

/// Drop `legacy` whenever `superseded_by` is present as well.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct LegacyOverride {
    /// Basename of the artifact to drop.
    pub legacy: String,
    /// Basename of the artifact that replaces it.
    pub superseded_by: String,
}

/// Raw TOML structure for `.nativeref.toml`.
#[derive(serde::Deserialize)]
struct NativerefTomlConfig {
    artifacts: Option<ArtifactRules>,
    builtin_packages: Option<Vec<String>>,
    cache_dir: Option<PathBuf>,
    deprecated_methods: Option<Vec<String>>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    extensions: Vec<ExtensionSource>,
    #[serde(default)]
    include: Vec<String>,
    local_packages: Option<Vec<String>>,
    source_extensions: Option<Vec<String>>,
}

impl Default for ArtifactRules {
    fn default() -> Self {
        return Self {
            exempt: default_exempt_names(),
            extensions: default_archive_extensions(),
            overrides: default_overrides(),
        };
    }
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            artifacts: ArtifactRules::default(),
            builtin_packages: vec!["Titanium".to_string()],
            cache_dir: PathBuf::from("build/nativeref"),
            deprecated_methods: default_deprecated_methods(),
            extensions: Vec::new(),
            local_packages: vec!["alloy".to_string()],
            source_extensions: vec!["js".to_string()],
            exclude: Vec::new(),
            include: Vec::new(),
        };
    }
}

impl Config {
    /// Load config from `.nativeref.toml` in the given root directory.
    /// Returns defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed; never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// `Error::TomlDe` if the TOML is malformed, or `Error::ConfigInvalid`
    /// if an override names the same artifact on both sides.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::parse(&content);
    }

    /// Parse config from TOML content, filling unset keys with defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` or `Error::ConfigInvalid`.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: NativerefTomlConfig = toml::from_str(content)?;
        let defaults = Self::default();
        let config = Self {
            artifacts: raw.artifacts.unwrap_or(defaults.artifacts),
            builtin_packages: raw.builtin_packages.unwrap_or(defaults.builtin_packages),
            cache_dir: raw.cache_dir.unwrap_or(defaults.cache_dir),
            deprecated_methods: raw.deprecated_methods.unwrap_or(defaults.deprecated_methods),
            extensions: raw.extensions,
            local_packages: raw.local_packages.unwrap_or(defaults.local_packages),
            source_extensions: raw.source_extensions.unwrap_or(defaults.source_extensions),
            exclude: raw.exclude,
            include: raw.include,
        };
        config.validate()?;
        return Ok(config);
    }

    /// Reject overrides that would drop an artifact because of itself.
    fn validate(&self) -> Result<(), Error> {
        for rule in &self.artifacts.overrides {
            if rule.legacy == rule.superseded_by {
                return Err(Error::ConfigInvalid {
                    reason: format!("override `{}` supersedes itself", rule.legacy),
                });
            }
        }
        return Ok(());
    }

    /// Whether `package` is a builtin resolved without the index.
    pub fn is_builtin(&self, package: &str) -> bool {
        return self.builtin_packages.iter().any(|p| return p == package);
    }

    /// Check whether a source file should be scanned, by extension and prefix filters.
    ///
    /// A path is included if no include patterns are set (scan everything),
    /// or if the path starts with at least one include pattern.
    /// An included path is then excluded if it starts with any exclude pattern.
    pub fn should_scan(&self, relative_path: &Path) -> bool {
        let has_extension = relative_path
            .extension()
            .and_then(|e| return e.to_str())
            .is_some_and(|ext| return self.source_extensions.iter().any(|s| return s == ext));
        if !has_extension {
            return false;
        }

        let relative = relative_path.to_string_lossy();
        let included = self.include.is_empty()
            || self.include.iter().any(|p| return relative.starts_with(p.as_str()));
        if !included {
            return false;
        }

        return !self.exclude.iter().any(|p| return relative.starts_with(p.as_str()));
    }
}

fn default_archive_extensions() -> Vec<String> {
    return vec!["jar".to_string()];
}

fn default_deprecated_methods() -> Vec<String> {
    return [
        "currentDevice",
        "defaultCenter",
        "defaultManager",
        "generalPasteboard",
        "mainBundle",
        "mainScreen",
        "processInfo",
        "sharedApplication",
        "standardUserDefaults",
    ]
    .iter()
    .map(|s| return (*s).to_string())
    .collect();
}

fn default_exempt_names() -> Vec<String> {
    return vec!["classes.jar".to_string()];
}

fn default_overrides() -> Vec<LegacyOverride> {
    return vec![LegacyOverride {
        legacy: "android-support-v4.jar".to_string(),
        superseded_by: "android-support-v13.jar".to_string(),
    }];
}
