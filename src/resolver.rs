use crate::config::Config;
use crate::metabase::MetabaseIndex;
use crate::types::{Diagnostic, DiagnosticKind, Reference, ResolvedReference};

/// Non-fatal outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The reference maps to a wrapper; its token gets rewritten.
    Resolved(ResolvedReference),
    /// The package is unknown. The token stays as written. `warning` is set
    /// only when a phonetically similar package exists to suggest.
    Unresolved {
        /// Recoverable diagnostic to surface, if any.
        warning: Option<Diagnostic>,
    },
}

/// Resolve one scanned reference against the index.
///
/// # Errors
///
/// Returns a fatal `Diagnostic` when the package exists but the class cannot be
/// found in it: `MisplacedClass` if another package declares the class,
/// `UnknownClass` otherwise (with phonetic package suggestions when available).
pub fn resolve(
    reference: &Reference,
    index: &MetabaseIndex,
    config: &Config,
) -> Result<Resolution, Diagnostic> {
    let package = reference.package.as_str();
    let class = reference.class.as_str();

    if config.is_builtin(package) {
        return Ok(Resolution::Resolved(resolved(reference, index.include_for(package, class), true)));
    }

    if !index.has_package(package) {
        return Ok(Resolution::Unresolved { warning: unknown_package_warning(reference, index) });
    }

    if let Some(include) = index.include_for(package, class) {
        return Ok(Resolution::Resolved(resolved(reference, Some(include), false)));
    }

    if reference.is_umbrella() {
        return Ok(Resolution::Resolved(resolved(reference, index.umbrella_include(package), false)));
    }

    return Err(missing_class_diagnostic(reference, index));
}

/// Canonical replacement for a resolved token.
pub fn rewritten_token(canonical_path: &str) -> String {
    return format!("require('/{canonical_path}')");
}

fn resolved(reference: &Reference, include: Option<&str>, is_builtin: bool) -> ResolvedReference {
    let canonical_path = reference.canonical_path();
    return ResolvedReference {
        rewritten: rewritten_token(&canonical_path),
        canonical_path,
        include: include.map(String::from),
        is_builtin,
        package: reference.package.clone(),
    };
}

/// "Did you mean" warning for an unknown package, or `None` when nothing sounds alike.
fn unknown_package_warning(reference: &Reference, index: &MetabaseIndex) -> Option<Diagnostic> {
    let suggestions = index.phonetic_package_matches(&reference.package);
    if suggestions.is_empty() {
        return None;
    }
    let message = format!(
        "The native package \"{}\" could not be found. Are you trying to use {} instead?",
        reference.package,
        quoted_alternatives(&suggestions)
    );
    return Some(diagnostic(reference, DiagnosticKind::UnknownPackage, message, suggestions));
}

/// Fatal diagnostic for a class absent from an existing package.
/// Checks, in order: the class in another package, a package whose name
/// sounds like the class, then plain not-found.
fn missing_class_diagnostic(reference: &Reference, index: &MetabaseIndex) -> Diagnostic {
    let package = &reference.package;
    let class = &reference.class;

    if let Some(actual) = index.find_class_elsewhere(class, package) {
        let message = format!(
            "Are you trying to use the native class \"{class}\" located in the package \"{actual}\", not in \"{package}\"?"
        );
        return diagnostic(
            reference,
            DiagnosticKind::MisplacedClass,
            message,
            vec![format!("{actual}/{class}")],
        );
    }

    let suggestions = index.phonetic_package_matches(class);
    let mut message =
        format!("The native class \"{class}\" could not be found in the package \"{package}\".");
    if !suggestions.is_empty() {
        message.push_str(&format!(" Are you trying to use {} instead?", quoted_alternatives(&suggestions)));
    }
    return diagnostic(reference, DiagnosticKind::UnknownClass, message, suggestions);
}

fn diagnostic(
    reference: &Reference,
    kind: DiagnosticKind,
    message: String,
    suggestions: Vec<String>,
) -> Diagnostic {
    return Diagnostic {
        kind,
        message,
        offending_token: reference.raw_token.clone(),
        source_file: reference.source_file.clone(),
        source_line: reference.source_line,
        suggestions,
    };
}

/// `"A" or "B"`.
fn quoted_alternatives(names: &[String]) -> String {
    return names.iter().map(|n| return format!("\"{n}\"")).collect::<Vec<_>>().join(" or ");
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use super::*;

    fn index() -> MetabaseIndex {
        let mut packages = BTreeMap::new();
        let mut uikit = BTreeMap::new();
        uikit.insert("UIView".to_string(), "<UIKit/UIKit.h>".to_string());
        uikit.insert("UIKit".to_string(), "<UIKit/UIKit.h>".to_string());
        packages.insert("UIKit".to_string(), uikit);
        let mut foundation = BTreeMap::new();
        foundation.insert("NSString".to_string(), "<Foundation/NSString.h>".to_string());
        packages.insert("Foundation".to_string(), foundation);
        packages.insert("CoreGraphics".to_string(), BTreeMap::new());
        return MetabaseIndex::new(None, packages);
    }

    fn reference(package: &str, class: &str) -> Reference {
        let raw_token = format!("require('{package}/{class}')");
        return Reference {
            class: class.to_string(),
            package: package.to_string(),
            span: 0..raw_token.len(),
            raw_token,
            source_file: PathBuf::from("app.js"),
            source_line: 7,
        };
    }

    fn resolve_ok(package: &str, class: &str) -> Resolution {
        return resolve(&reference(package, class), &index(), &Config::default()).unwrap();
    }

    #[test]
    fn every_indexed_pair_round_trips_its_include() {
        let index = index();
        let config = Config::default();
        for package in index.package_names() {
            for class in ["UIView", "UIKit", "NSString"] {
                let Some(expected) = index.include_for(package, class) else { continue };
                let Ok(Resolution::Resolved(resolved)) =
                    resolve(&reference(package, class), &index, &config)
                else {
                    panic!("{package}/{class} did not resolve");
                };
                assert_eq!(resolved.include.as_deref(), Some(expected));
            }
        }
    }

    #[test]
    fn resolves_to_canonical_rewrite() {
        let Resolution::Resolved(resolved) = resolve_ok("UIKit", "UIView") else {
            panic!("expected resolution");
        };
        assert_eq!(resolved.canonical_path, "hyperloop/uikit/uiview");
        assert_eq!(resolved.rewritten, "require('/hyperloop/uikit/uiview')");
        assert_eq!(resolved.include.as_deref(), Some("<UIKit/UIKit.h>"));
    }

    #[test]
    fn umbrella_without_umbrella_class_still_resolves() {
        let Resolution::Resolved(resolved) = resolve_ok("CoreGraphics", "CoreGraphics") else {
            panic!("expected resolution");
        };
        assert_eq!(resolved.include, None);
        assert_eq!(resolved.canonical_path, "hyperloop/coregraphics/coregraphics");
    }

    #[test]
    fn typo_package_warns_with_suggestion() {
        let Resolution::Unresolved { warning: Some(warning) } = resolve_ok("UIKit2", "UIView") else {
            panic!("expected warning");
        };
        assert_eq!(warning.kind, DiagnosticKind::UnknownPackage);
        assert_eq!(warning.suggestions, vec!["UIKit".to_string()]);
        assert!(warning.message.contains("\"UIKit\""));
    }

    #[test]
    fn unknown_package_without_match_is_silent() {
        assert_eq!(resolve_ok("Zebra", "Stripe"), Resolution::Unresolved { warning: None });
    }

    #[test]
    fn builtin_resolves_without_index() {
        let Resolution::Resolved(resolved) = resolve_ok("Titanium", "UI") else {
            panic!("expected resolution");
        };
        assert!(resolved.is_builtin);
        assert_eq!(resolved.include, None);
    }

    #[test]
    fn class_in_wrong_package_is_fatal() {
        let err = resolve(&reference("UIKit", "NSString"), &index(), &Config::default()).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::MisplacedClass);
        assert!(err.message.contains("\"Foundation\""));
        assert_eq!(err.source_line, 7);
    }

    #[test]
    fn class_sounding_like_package_is_fatal_with_suggestion() {
        let err = resolve(&reference("UIKit", "Fundation"), &index(), &Config::default()).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::UnknownClass);
        assert_eq!(err.suggestions, vec!["Foundation".to_string()]);
    }

    #[test]
    fn missing_class_is_fatal() {
        let err = resolve(&reference("UIKit", "UIWidget"), &index(), &Config::default()).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::UnknownClass);
        assert!(err.suggestions.is_empty());
    }
}
