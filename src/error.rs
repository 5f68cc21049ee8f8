/// Crate-level error types for nativeref diagnostics.
use std::path::PathBuf;

use crate::types::Diagnostic;

/// All errors in nativeref carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, artifact, or container involved.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two dependency artifacts share a basename but differ in content.
    #[error(
        "conflicting artifacts: {} and {} are both named `{basename}` but have different contents",
        first.display(),
        second.display()
    )]
    ArtifactConflict {
        /// Shared file name.
        basename: String,
        /// Artifact seen first (kept until the conflict was found).
        first: PathBuf,
        /// Artifact that collided with it.
        second: PathBuf,
    },

    /// The manifest or symbol cache could not be persisted.
    #[error("cache write failed: {}: {reason}", path.display())]
    CacheWrite {
        /// Cache file that was being written.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Config file exists but holds values that make no sense.
    #[error("invalid config: {reason}")]
    ConfigInvalid {
        /// Description of the problem.
        reason: String,
    },

    /// Two containers would be extracted into the same working directory.
    #[error(
        "containers {} and {} both extract to {}",
        first.display(),
        second.display(),
        work_dir.display()
    )]
    ContainerCollision {
        /// First container claiming the directory.
        first: PathBuf,
        /// Second container claiming the directory.
        second: PathBuf,
        /// The shared working directory.
        work_dir: PathBuf,
    },

    /// A dependency container could not be extracted or its manifest read.
    #[error("failed to extract container {}: {reason}", container.display())]
    ContainerExtraction {
        /// The offending container.
        container: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A required input file does not exist on disk.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// The metabase input is not shaped like `{ package: { class: include } }`.
    #[error("invalid metabase {}: {reason}", path.display())]
    MetabaseInvalid {
        /// Metabase file that failed validation.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A scanning pattern built from config failed to compile.
    #[error("pattern: {0}")]
    Pattern(
        /// The wrapped regex error.
        #[from]
        regex::Error,
    ),

    /// A reference failed resolution in a way that must stop the build.
    #[error("{diagnostic}")]
    Resolution {
        /// The fatal diagnostic.
        diagnostic: Box<Diagnostic>,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),
}

impl From<Diagnostic> for Error {
    fn from(diagnostic: Diagnostic) -> Self {
        return Error::Resolution { diagnostic: Box::new(diagnostic) };
    }
}
