use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::{Diagnostic, DiagnosticKind, MigrationToken};

const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Print markdown to stderr with bold headings.
fn print_markdown(md: &str) {
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_markdown(&render_error(e));
}

/// Print a recoverable diagnostic to stderr, independent of the log filter.
pub fn print_warning(diagnostic: &Diagnostic) {
    eprintln!("{}", render_warning(diagnostic));
}

/// Print end-of-build migration guidance, if any call sites were recorded.
pub fn print_migration_guidance(migrations: &BTreeMap<PathBuf, Vec<MigrationToken>>) {
    if let Some(md) = render_migration_guidance(migrations) {
        print_markdown(&md);
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened and, where the user can
/// act on it, how to fix it.
pub fn render_error(e: &Error) -> String {
    match e {
        Error::Resolution { diagnostic } => render_resolution(diagnostic),
        Error::ArtifactConflict { basename, first, second } => render_artifact_conflict(basename, first, second),
        Error::ContainerCollision { first, second, work_dir } => {
            render_container_collision(first, second, work_dir)
        },
        Error::ContainerExtraction { container, reason } => render_container_extraction(container, reason),
        Error::MetabaseInvalid { path, reason } => render_metabase_invalid(path, reason),
        _ => render_generic(e),
    }
}

/// Render a recoverable diagnostic as a one-line warning with suggestions.
pub fn render_warning(diagnostic: &Diagnostic) -> String {
    let mut out = format!(
        "{}:{}: warning[{}]: {}",
        diagnostic.source_file.display(),
        diagnostic.source_line,
        diagnostic.kind.label(),
        diagnostic.message
    );
    if !diagnostic.suggestions.is_empty() {
        let _ = write!(out, " (did you mean {}?)", backticked(&diagnostic.suggestions));
    }
    out
}

/// Render the list of deprecated call sites that were patched in the build
/// output but remain in the original sources. `None` when there are none.
pub fn render_migration_guidance(migrations: &BTreeMap<PathBuf, Vec<MigrationToken>>) -> Option<String> {
    if migrations.values().all(Vec::is_empty) {
        return None;
    }

    let mut out = String::from("\
# Code Migration Required

Some zero-argument method calls became property access. The build output was
patched automatically; your original sources were not touched. Update them:
");
    for (file, tokens) in migrations {
        if tokens.is_empty() {
            continue;
        }
        let _ = write!(out, "\n## {}\n\n", file.display());
        for token in tokens {
            let _ = writeln!(
                out,
                "- Line {}: `{}` -> `{}`",
                token.source_line,
                token.call_expression(),
                token.member_expression()
            );
        }
    }
    Some(out)
}

fn render_resolution(diagnostic: &Diagnostic) -> String {
    let heading = match diagnostic.kind {
        DiagnosticKind::MisplacedClass => "Native Class In Wrong Package",
        DiagnosticKind::UnknownClass => "Native Class Not Found",
        DiagnosticKind::UnknownPackage => "Native Package Not Found",
    };
    let mut out = format!("\
# Error: {heading}

{}

## Referenced from

- {}:{}
  {}
",
        diagnostic.message,
        diagnostic.source_file.display(),
        diagnostic.source_line,
        diagnostic.offending_token
    );

    if let Some(first) = diagnostic.suggestions.first() {
        let _ = write!(out, "\n## Did you mean `{first}`?\n");
        if diagnostic.kind == DiagnosticKind::MisplacedClass {
            let _ = write!(out, "\n    require('{first}')\n");
        } else if diagnostic.suggestions.len() > 1 {
            out.push_str("\n## Other candidates\n\n");
            for s in diagnostic.suggestions.iter().skip(1) {
                let _ = writeln!(out, "- `{s}`");
            }
        }
    }
    out
}

fn render_artifact_conflict(basename: &str, first: &Path, second: &Path) -> String {
    format!("\
# Error: Conflicting Artifacts

Two dependency artifacts are named `{basename}` but have different contents:

- {}
- {}

## Fix

Delete one of them, or rename one if you are certain they are not duplicates.
", first.display(), second.display())
}

fn render_container_collision(first: &Path, second: &Path, work_dir: &Path) -> String {
    format!("\
# Error: Container Collision

`{}` and `{}` would both extract into `{}`.

## Fix

Rename one of the containers.
", first.display(), second.display(), work_dir.display())
}

fn render_container_extraction(container: &Path, reason: &str) -> String {
    format!("\
# Error: Container Extraction Failed

Could not extract `{}`: {reason}

## Fix

Check that the container is a valid archive with an `AndroidManifest.xml`
declaring a `package`.
", container.display())
}

fn render_metabase_invalid(path: &Path, reason: &str) -> String {
    format!("\
# Error: Invalid Metabase

`{}`: {reason}

The metabase must be a JSON object of the form
`{{ \"<package>\": {{ \"<class>\": \"<include>\" }} }}`.
", path.display())
}

fn render_generic(e: &Error) -> String {
    match e {
        Error::FileNotFound { path } => format!("\
# Error: File Not Found

`{}` does not exist.
", path.display()),

        Error::ConfigInvalid { reason } => format!("\
# Error: Invalid Config

{reason}

## Fix

Correct the value in `.nativeref.toml`.
"),

        Error::CacheWrite { path, reason } => format!("\
# Error: Cache Write Failed

Could not write `{}`: {reason}

The previous cache was left in place.
", path.display()),

        Error::Io(e) => format!("\
# Error: I/O

{e}
"),
        Error::TomlDe(e) => format!("\
# Error: Invalid TOML

{e}
"),
        Error::Json(e) => format!("\
# Error: JSON

{e}
"),
        // Already handled in render_error, but need exhaustive match.
        _ => format!("\
# Error

{e}
"),
    }
}

/// `` `A` or `B` ``.
fn backticked(names: &[String]) -> String {
    names.iter().map(|n| format!("`{n}`")).collect::<Vec<_>>().join(" or ")
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    fn diagnostic(kind: DiagnosticKind, suggestions: &[&str]) -> Diagnostic {
        Diagnostic {
            kind,
            message: "The native class \"NSString\" could not be found.".to_string(),
            offending_token: "require('UIKit/NSString')".to_string(),
            source_file: PathBuf::from("app.js"),
            source_line: 3,
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn resolution_error_names_file_and_line() {
        let e = Error::from(diagnostic(DiagnosticKind::MisplacedClass, &["Foundation/NSString"]));
        let md = render_error(&e);
        assert!(md.starts_with("# Error: Native Class In Wrong Package"));
        assert!(md.contains("- app.js:3"));
        assert!(md.contains("require('Foundation/NSString')"));
    }

    #[test]
    fn warning_lists_suggestions() {
        let line = render_warning(&diagnostic(DiagnosticKind::UnknownPackage, &["UIKit", "UIKitCore"]));
        assert!(line.starts_with("app.js:3: warning[unknown-package]:"));
        assert!(line.ends_with("(did you mean `UIKit` or `UIKitCore`?)"));
    }

    #[test]
    fn conflict_lists_both_paths() {
        let md = render_error(&Error::ArtifactConflict {
            basename: "a.jar".to_string(),
            first: PathBuf::from("one/a.jar"),
            second: PathBuf::from("two/a.jar"),
        });
        assert!(md.contains("- one/a.jar"));
        assert!(md.contains("- two/a.jar"));
    }

    #[test]
    fn migration_guidance_lists_each_call_site() {
        let mut migrations = BTreeMap::new();
        migrations.insert(PathBuf::from("app.js"), vec![MigrationToken {
            method_name: "mainScreen".to_string(),
            object_name: "UIScreen".to_string(),
            source_line: 12,
            span: 0..21,
        }]);
        let md = render_migration_guidance(&migrations).unwrap();
        assert!(md.contains("## app.js"));
        assert!(md.contains("- Line 12: `UIScreen.mainScreen()` -> `UIScreen.mainScreen`"));
    }

    #[test]
    fn no_migrations_means_no_guidance() {
        assert_eq!(render_migration_guidance(&BTreeMap::new()), None);
    }
}
