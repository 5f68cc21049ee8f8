/// Core domain types for native references, diagnostics, and content hashes.
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

/// Root segment of every canonical wrapper path.
pub const CANONICAL_ROOT: &str = "hyperloop";

/// A `(package, class)` pair extracted from a `require()` token by the scanner.
/// Immutable once created; resolution produces a separate `ResolvedReference`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Class name. Equals `package` for umbrella imports such as `require("UIKit")`.
    pub class: String,
    /// Package (framework) name. Never empty.
    pub package: String,
    /// The exact matched substring, e.g. `require("UIKit/UIView")`.
    pub raw_token: String,
    /// Source file containing the token.
    pub source_file: PathBuf,
    /// One-based line number of the token.
    pub source_line: u32,
    /// Byte range of `raw_token` within the file contents.
    pub span: Range<usize>,
}

impl Reference {
    /// Whether the token named only a package, with no class sub-path.
    pub fn is_umbrella(&self) -> bool {
        return self.class == self.package;
    }

    /// Normalized lower-case wrapper path, e.g. `hyperloop/uikit/uiview`.
    pub fn canonical_path(&self) -> String {
        return format!(
            "{CANONICAL_ROOT}/{}/{}",
            self.package.to_lowercase(),
            self.class.to_lowercase()
        );
    }
}

/// Output of successful resolution: what the token becomes and what it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference {
    /// Lower-case canonical wrapper path registered in the references map.
    pub canonical_path: String,
    /// Native include needed to generate the wrapper, if the index records one.
    pub include: Option<String>,
    /// Whether the package was a builtin (resolved without an index lookup).
    pub is_builtin: bool,
    /// Package the reference resolved in.
    pub package: String,
    /// Replacement text for the original token.
    pub rewritten: String,
}

/// A content digest: 64 lowercase hex chars of SHA-256.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ContentHash(
    /// The hex-encoded digest string.
    pub String,
);

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f.write_str(&self.0);
    }
}

/// A deprecated zero-argument call that became a property access,
/// e.g. `UIScreen.mainScreen()` -> `UIScreen.mainScreen`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationToken {
    /// The deprecated method.
    pub method_name: String,
    /// Receiver expression text before the dot.
    pub object_name: String,
    /// One-based line number of the call.
    pub source_line: u32,
    /// Byte range of the call expression within the file contents.
    pub span: Range<usize>,
}

impl MigrationToken {
    /// The call form found in source: `obj.method()`.
    pub fn call_expression(&self) -> String {
        return format!("{}.{}()", self.object_name, self.method_name);
    }

    /// The property form the call migrates to: `obj.method`.
    pub fn member_expression(&self) -> String {
        return format!("{}.{}", self.object_name, self.method_name);
    }
}

/// Which resolution check produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The class exists, but in a different package. Always fatal.
    MisplacedClass,
    /// The package exists but does not contain the class. Always fatal.
    UnknownClass,
    /// No such package in the index. Recoverable: the token is left as written.
    UnknownPackage,
}

impl DiagnosticKind {
    /// Stable kebab-case label.
    pub const fn label(self) -> &'static str {
        return match self {
            DiagnosticKind::MisplacedClass => "misplaced-class",
            DiagnosticKind::UnknownClass => "unknown-class",
            DiagnosticKind::UnknownPackage => "unknown-package",
        };
    }
}

/// A structured resolution diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What kind of failure this is.
    pub kind: DiagnosticKind,
    /// Human-readable sentence, without location.
    pub message: String,
    /// The offending `require()` token.
    pub offending_token: String,
    /// File the token came from.
    pub source_file: PathBuf,
    /// One-based line of the token.
    pub source_line: u32,
    /// Suggested alternative names, lexically ordered.
    pub suggestions: Vec<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(
            f,
            "{} ({}:{})",
            self.message,
            self.source_file.display(),
            self.source_line
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(package: &str, class: &str) -> Reference {
        return Reference {
            class: class.to_string(),
            package: package.to_string(),
            raw_token: format!("require(\"{package}/{class}\")"),
            source_file: PathBuf::from("app.js"),
            source_line: 1,
            span: 0..0,
        };
    }

    #[test]
    fn canonical_path_is_lower_case() {
        assert_eq!(reference("UIKit", "UIView").canonical_path(), "hyperloop/uikit/uiview");
    }

    #[test]
    fn umbrella_when_class_equals_package() {
        assert!(reference("UIKit", "UIKit").is_umbrella());
        assert!(!reference("UIKit", "UIView").is_umbrella());
    }

    #[test]
    fn migration_expressions() {
        let token = MigrationToken {
            method_name: "mainScreen".to_string(),
            object_name: "UIScreen".to_string(),
            source_line: 3,
            span: 0..21,
        };
        assert_eq!(token.call_expression(), "UIScreen.mainScreen()");
        assert_eq!(token.member_expression(), "UIScreen.mainScreen");
    }
}
