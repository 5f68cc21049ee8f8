//! Build session: scans sources, resolves references, and accumulates what
//! the external code generator needs.
//!
//! The session owns the references/packages/includes maps for exactly one
//! build. They are mutated only while files are resolved; `finish()` hands
//! them out by value and the session is gone.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::metabase::MetabaseIndex;
use crate::resolver::{self, Resolution};
use crate::scanner::{self, Grammar, ScannedFile, Substitution};
use crate::types::{Diagnostic, MigrationToken};

/// What the external code generator consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationInput {
    /// Native includes required for forward declarations to resolve.
    pub includes: BTreeSet<String>,
    /// Packages used by resolved references: `name -> 1`.
    pub packages: BTreeMap<String, u8>,
    /// Canonical wrapper paths: `canonical_path -> 1`.
    pub references: BTreeMap<String, u8>,
}

/// One source file after resolution and rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedFile {
    /// Source text as it was scanned.
    pub contents: String,
    /// Source file relative to the source root.
    pub path: PathBuf,
    /// Contents with resolved tokens and migrated calls rewritten.
    pub rewritten: String,
    /// Whether `rewritten` differs from the original.
    pub changed: bool,
}

/// Everything a finished session produced.
#[derive(Debug, Clone, Default)]
pub struct SessionOutput {
    /// Per-file results, sorted by path.
    pub files: Vec<ProcessedFile>,
    /// Maps handed to the code generator.
    pub input: GenerationInput,
    /// Deprecated call sites per file, for end-of-build guidance.
    pub migrations: BTreeMap<PathBuf, Vec<MigrationToken>>,
    /// Recoverable diagnostics, in file then line order.
    pub warnings: Vec<Diagnostic>,
}

/// Per-build resolution context. Never shared across builds.
pub struct BuildSession<'a> {
    config: &'a Config,
    index: &'a MetabaseIndex,
    output: SessionOutput,
}

impl GenerationInput {
    /// Whether any native usage was found at all.
    pub fn is_empty(&self) -> bool {
        return self.references.is_empty() && self.includes.is_empty();
    }
}

impl<'a> BuildSession<'a> {
    /// Start an empty session over a read-only index.
    pub fn new(index: &'a MetabaseIndex, config: &'a Config) -> Self {
        return Self {
            config,
            index,
            output: SessionOutput::default(),
        };
    }

    /// Resolve one scanned file, record what it requires, and rewrite it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Resolution` on the first fatal diagnostic; nothing from
    /// this file is recorded in that case.
    pub fn process(&mut self, scanned: ScannedFile) -> Result<(), Error> {
        debug!(
            file = %scanned.path.display(),
            references = scanned.unique_references().len(),
            "resolving"
        );
        let mut substitutions = Vec::new();
        let mut resolved = Vec::new();
        let mut warnings = Vec::new();

        for reference in &scanned.references {
            match resolver::resolve(reference, self.index, self.config)? {
                Resolution::Resolved(r) => {
                    substitutions.push(Substitution {
                        replacement: r.rewritten.clone(),
                        span: reference.span.clone(),
                    });
                    resolved.push(r);
                },
                Resolution::Unresolved { warning } => warnings.extend(warning),
            }
        }

        for token in &scanned.migrations {
            substitutions.push(Substitution {
                replacement: token.member_expression(),
                span: token.span.clone(),
            });
        }

        let rewritten = scanner::apply_substitutions(&scanned.contents, &substitutions);
        let changed = rewritten != scanned.contents;

        let input = &mut self.output.input;
        for r in resolved {
            input.references.insert(r.canonical_path, 1);
            if !r.is_builtin {
                input.packages.insert(r.package, 1);
            }
            if let Some(include) = r.include {
                input.includes.insert(include);
            }
        }

        if !scanned.migrations.is_empty() {
            self.output.migrations.insert(scanned.path.clone(), scanned.migrations);
        }
        self.output.warnings.extend(warnings);
        debug!(file = %scanned.path.display(), changed, "rewritten");
        self.output.files.push(ProcessedFile {
            contents: scanned.contents,
            path: scanned.path,
            rewritten,
            changed,
        });
        return Ok(());
    }

    /// Close the session: add umbrella includes for every used package so
    /// forward declarations resolve, and hand out the accumulated state.
    pub fn finish(mut self) -> SessionOutput {
        let umbrellas: Vec<String> = self
            .output
            .input
            .packages
            .keys()
            .filter_map(|package| return self.index.umbrella_include(package).map(String::from))
            .collect();
        self.output.input.includes.extend(umbrellas);
        self.output.files.sort_by(|a, b| return a.path.cmp(&b.path));
        return self.output;
    }
}

/// Scan `files` under `root` in parallel, then resolve them in path order.
///
/// # Errors
///
/// Returns the first read error, or the first fatal resolution error with
/// the offending file in its diagnostic.
pub fn run(
    root: &Path,
    files: &[PathBuf],
    index: &MetabaseIndex,
    config: &Config,
) -> Result<SessionOutput, Error> {
    let grammar = Grammar::new(config)?;
    let scanned = scanner::scan_all(root, files, &grammar)?;

    let mut session = BuildSession::new(index, config);
    for file in scanned {
        session.process(file)?;
    }
    return Ok(session.finish());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> MetabaseIndex {
        return MetabaseIndex::parse(
            Path::new("metabase.json"),
            r#"{
                "UIKit": { "UIKit": "<UIKit/UIKit.h>", "UIView": "<UIKit/UIView.h>" },
                "Foundation": { "NSString": "<Foundation/NSString.h>" }
            }"#,
        )
        .unwrap();
    }

    fn write_sources(files: &[(&str, &str)]) -> (tempfile::TempDir, Vec<PathBuf>) {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = Vec::new();
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents).unwrap();
            paths.push(PathBuf::from(name));
        }
        return (dir, paths);
    }

    #[test]
    fn resolves_and_rewrites_references() {
        let (dir, files) = write_sources(&[("app.js", "var V = require('UIKit/UIView');")]);
        let output = run(dir.path(), &files, &index(), &Config::default()).unwrap();

        assert_eq!(output.files[0].rewritten, "var V = require('/hyperloop/uikit/uiview');");
        assert!(output.files[0].changed);
        assert_eq!(output.input.references.get("hyperloop/uikit/uiview"), Some(&1));
        assert_eq!(output.input.packages.get("UIKit"), Some(&1));
        assert!(output.input.includes.contains("<UIKit/UIView.h>"));
        // Umbrella include added for the used package.
        assert!(output.input.includes.contains("<UIKit/UIKit.h>"));
    }

    #[test]
    fn typo_package_is_left_untouched_with_warning() {
        let source = "var V = require('UIKit2/UIView');";
        let (dir, files) = write_sources(&[("app.js", source)]);
        let output = run(dir.path(), &files, &index(), &Config::default()).unwrap();

        assert_eq!(output.files[0].rewritten, source);
        assert!(!output.files[0].changed);
        assert_eq!(output.warnings.len(), 1);
        assert_eq!(output.warnings[0].suggestions, vec!["UIKit".to_string()]);
        assert!(output.input.is_empty());
    }

    #[test]
    fn fatal_diagnostic_aborts_with_file() {
        let (dir, files) = write_sources(&[
            ("a.js", "require('UIKit/UIView');"),
            ("b.js", "require('UIKit/NSString');"),
        ]);
        let err = run(dir.path(), &files, &index(), &Config::default()).unwrap_err();
        let Error::Resolution { diagnostic } = err else {
            panic!("expected resolution error");
        };
        assert_eq!(diagnostic.source_file, PathBuf::from("b.js"));
    }

    #[test]
    fn migrations_are_patched_and_collected() {
        let (dir, files) = write_sources(&[(
            "app.js",
            "var UIScreen = require('UIKit/UIScreen');\nvar s = UIScreen.mainScreen();",
        )]);
        let mut packages = BTreeMap::new();
        let mut uikit = BTreeMap::new();
        uikit.insert("UIScreen".to_string(), "<UIKit/UIScreen.h>".to_string());
        packages.insert("UIKit".to_string(), uikit);
        let index = MetabaseIndex::new(None, packages);

        let output = run(dir.path(), &files, &index, &Config::default()).unwrap();
        assert_eq!(
            output.files[0].rewritten,
            "var UIScreen = require('/hyperloop/uikit/uiscreen');\nvar s = UIScreen.mainScreen;"
        );
        let tokens = output.migrations.get(Path::new("app.js")).unwrap();
        assert_eq!(tokens[0].source_line, 2);
    }

    #[test]
    fn second_run_over_unchanged_tree_is_identical() {
        let (dir, files) = write_sources(&[
            ("a.js", "require('UIKit');"),
            ("b.js", "require('Foundation/NSString');"),
        ]);
        let first = run(dir.path(), &files, &index(), &Config::default()).unwrap();
        let second = run(dir.path(), &files, &index(), &Config::default()).unwrap();
        assert_eq!(first.input, second.input);
        assert_eq!(first.files, second.files);
        assert_eq!(
            serde_json::to_string(&first.input).unwrap(),
            serde_json::to_string(&second.input).unwrap()
        );
    }
}
