use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use regex::{Captures, Regex, RegexBuilder};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Error;
use crate::types::{MigrationToken, Reference};

/// `require("Package/Class")`-shaped calls. Group 1 is the module path.
const REQUIRE_PATTERN: &str = r#"require\s*\(\s*[\\"']+([\w/\-\\.]+)[\\"']+\s*\)"#;

/// Compiled token grammars. Built once per session and shared across threads.
#[derive(Debug, Clone)]
pub struct Grammar {
    local_packages: Vec<String>,
    migration: Option<Regex>,
    require: Regex,
}

/// Everything the scan pass extracted from one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Original file contents.
    pub contents: String,
    /// Deprecated call sites, in order of appearance.
    pub migrations: Vec<MigrationToken>,
    /// Source file, relative to the source root.
    pub path: PathBuf,
    /// Every native-reference token, in order of appearance.
    pub references: Vec<Reference>,
}

/// A replacement of one byte range of a file's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// New text.
    pub replacement: String,
    /// Byte range being replaced.
    pub span: Range<usize>,
}

impl Grammar {
    /// Compile the grammars for a project config.
    ///
    /// # Errors
    ///
    /// Returns `Error::Pattern` if a deprecated method list produces an invalid pattern.
    pub fn new(config: &Config) -> Result<Self, Error> {
        let require = RegexBuilder::new(REQUIRE_PATTERN).case_insensitive(true).build()?;

        let migration = if config.deprecated_methods.is_empty() {
            None
        } else {
            let methods: Vec<String> =
                config.deprecated_methods.iter().map(|m| return regex::escape(m)).collect();
            let pattern = format!(r"([A-Za-z_$][\w$]*)\.({})\(\s*\)", methods.join("|"));
            Some(Regex::new(&pattern)?)
        };

        return Ok(Self {
            local_packages: config.local_packages.clone(),
            migration,
            require,
        });
    }
}

impl ScannedFile {
    /// Distinct `(package, class)` pairs referenced by this file.
    pub fn unique_references(&self) -> BTreeSet<(String, String)> {
        return self
            .references
            .iter()
            .map(|r| return (r.package.clone(), r.class.clone()))
            .collect();
    }
}

/// Collect source files under `root` that the config says to scan.
/// Returned paths are relative to `root` and sorted.
pub fn collect_sources(root: &Path, config: &Config) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file())
        .filter_map(|e| return e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .filter(|relative| return config.should_scan(relative))
        .collect();
    sources.sort();
    return sources;
}

/// Scan every file in parallel. Output is ordered by path regardless of
/// which thread finished first.
///
/// # Errors
///
/// Returns `Error::FileNotFound` or `Error::Io` for the first unreadable file.
pub fn scan_all(root: &Path, files: &[PathBuf], grammar: &Grammar) -> Result<Vec<ScannedFile>, Error> {
    let mut scanned = files
        .par_iter()
        .map(|relative| return scan_file(root, relative, grammar))
        .collect::<Result<Vec<_>, Error>>()?;
    scanned.sort_by(|a, b| return a.path.cmp(&b.path));
    debug!(files = scanned.len(), "scanned sources");
    return Ok(scanned);
}

/// Read and scan one file. Reads only; never writes.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file is missing, or `Error::Io`.
pub fn scan_file(root: &Path, relative: &Path, grammar: &Grammar) -> Result<ScannedFile, Error> {
    let full = root.join(relative);
    let contents = match std::fs::read_to_string(&full) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound { path: full });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };
    return Ok(scan_contents(relative, contents, grammar));
}

/// Extract references and migration tokens from file contents.
pub fn scan_contents(path: &Path, contents: String, grammar: &Grammar) -> ScannedFile {
    let lines = LineIndex::new(&contents);

    let references = grammar
        .require
        .captures_iter(&contents)
        .filter_map(|cap| return parse_require_capture(&cap, path, &lines, &grammar.local_packages))
        .collect();

    let migrations = grammar
        .migration
        .as_ref()
        .map(|pattern| {
            return pattern
                .captures_iter(&contents)
                .filter_map(|cap| return parse_migration_capture(&cap, &lines))
                .collect();
        })
        .unwrap_or_default();

    return ScannedFile {
        contents,
        migrations,
        path: path.to_path_buf(),
        references,
    };
}

/// Try to turn a `require()` match into a native reference.
/// Returns `None` for relative/absolute paths, reserved local packages,
/// or an empty package segment.
fn parse_require_capture(
    cap: &Captures<'_>,
    path: &Path,
    lines: &LineIndex,
    local_packages: &[String],
) -> Option<Reference> {
    let whole = cap.get(0)?;
    let module = cap.get(1)?.as_str();

    if module.starts_with('.') || module.starts_with('/') {
        trace!(module, "skipping local require");
        return None;
    }

    let mut segments = module.split('/');
    let package = segments.next().filter(|p| return !p.is_empty())?;
    if local_packages.iter().any(|p| return p == package) {
        return None;
    }

    // `require("UIKit")` is an umbrella import of `UIKit/UIKit`.
    let class = segments.next().filter(|c| return !c.is_empty()).unwrap_or(package);

    return Some(Reference {
        class: class.to_string(),
        package: package.to_string(),
        raw_token: whole.as_str().to_string(),
        source_file: path.to_path_buf(),
        source_line: lines.line_of(whole.start()),
        span: whole.range(),
    });
}

/// Turn a deprecated-call match into a migration token.
fn parse_migration_capture(cap: &Captures<'_>, lines: &LineIndex) -> Option<MigrationToken> {
    let whole = cap.get(0)?;
    return Some(MigrationToken {
        method_name: cap.get(2)?.as_str().to_string(),
        object_name: cap.get(1)?.as_str().to_string(),
        source_line: lines.line_of(whole.start()),
        span: whole.range(),
    });
}

/// Apply substitutions to `contents`. Substitutions may arrive in any order;
/// one that overlaps an earlier-starting substitution is dropped.
pub fn apply_substitutions(contents: &str, substitutions: &[Substitution]) -> String {
    let mut ordered: Vec<&Substitution> = substitutions.iter().collect();
    ordered.sort_by_key(|s| return (s.span.start, s.span.end));

    let mut output = String::with_capacity(contents.len());
    let mut cursor = 0_usize;
    for substitution in ordered {
        let Range { start, end } = substitution.span;
        if start < cursor || end > contents.len() {
            debug!(start, end, "dropping overlapping substitution");
            continue;
        }
        let (Some(before), true) = (contents.get(cursor..start), contents.is_char_boundary(end)) else {
            continue;
        };
        output.push_str(before);
        output.push_str(&substitution.replacement);
        cursor = end;
    }
    output.push_str(contents.get(cursor..).unwrap_or(""));
    return output;
}

/// Byte offsets of line starts, for offset -> line lookups.
struct LineIndex {
    /// Offset of the first byte of each line.
    starts: Vec<usize>,
}

impl LineIndex {
    /// Index the line starts of `contents`.
    fn new(contents: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(
            contents
                .bytes()
                .enumerate()
                .filter(|&(_, b)| return b == b'\n')
                .map(|(i, _)| return i.saturating_add(1)),
        );
        return Self { starts };
    }

    /// One-based line number containing `offset`.
    fn line_of(&self, offset: usize) -> u32 {
        let line = match self.starts.binary_search(&offset) {
            Ok(index) => index.saturating_add(1),
            Err(index) => index,
        };
        return u32::try_from(line).unwrap_or(u32::MAX);
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
mod tests {
    use super::*;

    fn grammar() -> Grammar {
        return Grammar::new(&Config::default()).unwrap();
    }

    fn scan(contents: &str) -> ScannedFile {
        return scan_contents(Path::new("app.js"), contents.to_string(), &grammar());
    }

    #[test]
    fn extracts_package_and_class() {
        let file = scan("var UIView = require('UIKit/UIView');");
        assert_eq!(file.references.len(), 1);
        let reference = &file.references[0];
        assert_eq!(reference.package, "UIKit");
        assert_eq!(reference.class, "UIView");
        assert_eq!(reference.raw_token, "require('UIKit/UIView')");
        assert_eq!(&file.contents[reference.span.clone()], reference.raw_token);
    }

    #[test]
    fn umbrella_import_defaults_class_to_package() {
        let file = scan(r#"const UIKit = require("UIKit");"#);
        assert_eq!(file.references[0].class, "UIKit");
        assert!(file.references[0].is_umbrella());
    }

    #[test]
    fn matches_case_insensitively_with_spacing() {
        let file = scan("x = REQUIRE ( \"Foundation/NSString\" )");
        assert_eq!(file.references.len(), 1);
        assert_eq!(file.references[0].package, "Foundation");
    }

    #[test]
    fn skips_local_and_reserved_packages() {
        let file = scan(
            "require('./util');\nrequire('/lib/x');\nrequire('alloy/moment');\nrequire('UIKit/UIColor');",
        );
        assert_eq!(file.references.len(), 1);
        assert_eq!(file.references[0].class, "UIColor");
        assert_eq!(file.references[0].source_line, 4);
    }

    #[test]
    fn unique_references_collapse_repeats() {
        let file = scan("require('UIKit/UIView');\nrequire('UIKit/UIView');\nrequire('UIKit');");
        assert_eq!(file.references.len(), 3);
        assert_eq!(file.unique_references().len(), 2);
    }

    #[test]
    fn finds_migration_tokens_with_lines() {
        let file = scan("var a = 1;\nvar s = UIScreen.mainScreen();\nvar b = UIScreen.mainScreen;");
        assert_eq!(file.migrations.len(), 1);
        let token = &file.migrations[0];
        assert_eq!(token.object_name, "UIScreen");
        assert_eq!(token.method_name, "mainScreen");
        assert_eq!(token.source_line, 2);
    }

    #[test]
    fn no_migration_pattern_without_methods() {
        let mut config = Config::default();
        config.deprecated_methods.clear();
        let grammar = Grammar::new(&config).unwrap();
        let file = scan_contents(Path::new("a.js"), "UIScreen.mainScreen()".to_string(), &grammar);
        assert!(file.migrations.is_empty());
    }

    #[test]
    fn scanning_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.js"), "require('UIKit/UIView');").unwrap();
        let first = scan_file(dir.path(), Path::new("app.js"), &grammar()).unwrap();
        let second = scan_file(dir.path(), Path::new("app.js"), &grammar()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn collects_sorted_sources_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b")).unwrap();
        std::fs::write(dir.path().join("b/z.js"), "").unwrap();
        std::fs::write(dir.path().join("a.js"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let sources = collect_sources(dir.path(), &Config::default());
        assert_eq!(sources, vec![PathBuf::from("a.js"), PathBuf::from("b/z.js")]);
    }

    #[test]
    fn substitutions_apply_in_span_order() {
        let contents = "aaa bbb ccc";
        let subs = vec![
            Substitution { replacement: "C".to_string(), span: 8..11 },
            Substitution { replacement: "A".to_string(), span: 0..3 },
        ];
        assert_eq!(apply_substitutions(contents, &subs), "A bbb C");
    }

    #[test]
    fn overlapping_substitution_is_dropped() {
        let subs = vec![
            Substitution { replacement: "X".to_string(), span: 0..5 },
            Substitution { replacement: "Y".to_string(), span: 3..7 },
        ];
        assert_eq!(apply_substitutions("0123456789", &subs), "X56789");
    }
}
