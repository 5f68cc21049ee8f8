//! CLI commands for nativeref: generate, dependencies, sync.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::cache::{self, CacheKind, Manifest, MetabaseStamp, SymbolCacheStatus};
use crate::config::{CONFIG_FILE, Config};
use crate::container;
use crate::dedupe;
use crate::diagnostics;
use crate::error::Error;
use crate::freshness::{self, MetabaseDecision};
use crate::metabase::MetabaseIndex;
use crate::scanner;
use crate::session::{self, GenerationInput, ProcessedFile};

/// File in the cache directory handed to the external code generator.
pub const GENERATION_INPUT_FILE: &str = "generation_input.json";

/// Manifest key prefix for inputs that affect every rewritten source.
const INPUT_KEY_PREFIX: &str = "@input/";

/// Arguments of `generate`.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Ignore the metabase and wrapper caches.
    pub force: bool,
    /// Externally generated metabase JSON.
    pub metabase: PathBuf,
    /// Where rewritten sources are written.
    pub out: PathBuf,
    /// Application source root.
    pub src: PathBuf,
}

/// What `generate` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    /// Whether the metabase generator must run.
    pub metabase: MetabaseDecision,
    /// `false` when no native usage was found and generation was skipped.
    pub native_usage: bool,
    /// Whether wrappers must be regenerated.
    pub regenerate_wrappers: bool,
    /// Per-file write counts.
    pub writes: WriteStats,
}

/// How many tracked files were written, only re-recorded, removed, or left alone.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteStats {
    /// Content unchanged, only the manifest entry moved (mtime touch).
    pub refreshed: usize,
    /// Outputs deleted because their source is gone.
    pub removed: usize,
    /// Nothing to do.
    pub skipped: usize,
    /// Output (re)written.
    pub written: usize,
}

/// Request written for the external code generator.
#[derive(Serialize)]
struct GenerationRequest<'a> {
    /// References, packages, and includes of this build.
    #[serde(flatten)]
    input: &'a GenerationInput,
    /// Metabase inputs changed since the last generation.
    regenerate_metabase: bool,
    /// The references map changed since the last generation.
    regenerate_wrappers: bool,
}

/// Artifact set handed back to the build driver by `dependencies`.
#[derive(Debug, Serialize)]
struct DependencySummary {
    /// Deduplicated archives, in link order.
    archives: Vec<PathBuf>,
    /// Asset trees shipped by containers.
    assets: Vec<PathBuf>,
    /// Native shared objects shipped by containers.
    native_libraries: Vec<PathBuf>,
    /// Container package identifiers.
    packages: Vec<String>,
}

impl WriteStats {
    /// Count one file by what happened to it.
    fn record(&mut self, written: bool, refreshed: bool) {
        if written {
            self.written = self.written.saturating_add(1);
        } else if refreshed {
            self.refreshed = self.refreshed.saturating_add(1);
        } else {
            self.skipped = self.skipped.saturating_add(1);
        }
    }
}

/// Resolve native references in the source tree, write rewritten sources,
/// and hand the generator its input. Caches are saved only after every
/// output was written, so a failed build leaves the previous state intact.
///
/// # Errors
///
/// Returns config, metabase, scan, fatal resolution, or write errors.
pub fn generate(root: &Path, options: &GenerateOptions) -> Result<GenerateReport, Error> {
    let config = Config::load(root)?;
    let cache_dir = root.join(&config.cache_dir);

    let index = MetabaseIndex::load(&options.metabase)?.fold_extensions(root, &config.extensions)?;
    let files = scanner::collect_sources(&options.src, &config);
    debug!(files = files.len(), packages = index.len(), "scanning sources");

    let output = session::run(&options.src, &files, &index, &config)?;
    for warning in &output.warnings {
        diagnostics::print_warning(warning);
    }

    let manifest_path = CacheKind::GeneratedSources.path(&cache_dir);
    let previous = Manifest::load(&manifest_path);
    let mut next = Manifest::default();

    let mut inputs = vec![options.metabase.clone()];
    inputs.extend(config.extensions.iter().map(|e| return root.join(&e.metabase)));
    let config_path = root.join(CONFIG_FILE);
    if config_path.is_file() {
        inputs.push(config_path);
    }
    let inputs_changed = track_inputs(&previous, &mut next, &inputs)?;

    let mut writes = write_sources(&options.src, &options.out, &output.files, &previous, &mut next, inputs_changed)?;
    writes.removed = remove_stale_outputs(&options.out, &previous, &next)?;

    let input_path = cache_dir.join(GENERATION_INPUT_FILE);
    if output.input.is_empty() {
        info!("no native usage found, skipping generation");
        match std::fs::remove_file(&input_path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(Error::Io(e)),
            Ok(()) => debug!("removed stale {}", input_path.display()),
        }
        next.save(&manifest_path)?;
        diagnostics::print_migration_guidance(&output.migrations);
        return Ok(GenerateReport {
            metabase: MetabaseDecision::Reuse,
            native_usage: false,
            regenerate_wrappers: false,
            writes,
        });
    }

    let fingerprint =
        freshness::metabase_fingerprint(&output.input.includes, index.metadata(), &config.extensions);
    let stamp_path = CacheKind::Metabase.path(&cache_dir);
    let metabase =
        freshness::decide_metabase(&stamp_path, &fingerprint, !config.extensions.is_empty(), options.force);
    let symbols = cache::check_symbol_references(&cache_dir, &output.input.references)?;
    let regenerate_wrappers = options.force || symbols == SymbolCacheStatus::Changed;

    let request = GenerationRequest {
        input: &output.input,
        regenerate_metabase: metabase == MetabaseDecision::Generate,
        regenerate_wrappers,
    };
    let json = serde_json::to_string_pretty(&request)?;
    cache::write_atomic(&input_path, json.as_bytes())?;

    next.save(&manifest_path)?;
    MetabaseStamp { fingerprint }.save(&stamp_path)?;
    cache::refresh_symbol_references(&cache_dir, &output.input.references)?;

    info!(
        "{} references, {} written, {} refreshed, {} removed, {} unchanged",
        output.input.references.len(),
        writes.written,
        writes.refreshed,
        writes.removed,
        writes.skipped
    );
    diagnostics::print_migration_guidance(&output.migrations);

    return Ok(GenerateReport {
        metabase,
        native_usage: true,
        regenerate_wrappers,
        writes,
    });
}

/// Extract containers among `paths`, deduplicate every archive, and print
/// the surviving artifact set as JSON on stdout.
///
/// # Errors
///
/// Returns container extraction errors or a fatal artifact conflict.
pub fn dependencies(root: &Path, work_dir: &Path, paths: &[PathBuf]) -> Result<(), Error> {
    let config = Config::load(root)?;
    let (containers, mut artifacts): (Vec<PathBuf>, Vec<PathBuf>) =
        paths.iter().cloned().partition(|p| return container::is_container(p));

    let extracted = container::extract_all(&containers, work_dir)?;
    for c in &extracted {
        artifacts.extend(c.archives.iter().cloned());
    }

    let report = dedupe::dedupe(&artifacts, &config.artifacts)?;
    let summary = DependencySummary {
        archives: report.paths().into_iter().map(Path::to_path_buf).collect(),
        assets: extracted.iter().filter_map(|c| return c.assets.clone()).collect(),
        native_libraries: extracted.iter().flat_map(|c| return c.native_libraries.iter().cloned()).collect(),
        packages: extracted.iter().map(|c| return c.package.clone()).collect(),
    };

    info!(
        "{} artifacts kept, {} duplicates skipped, {} overridden",
        summary.archives.len(),
        report.duplicates.len(),
        report.overridden.len()
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    return Ok(());
}

/// Copy generated files from `from` to `to`, skipping files whose contents
/// did not change since the last sync.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if `from` is missing, or copy/cache errors.
pub fn sync(root: &Path, from: &Path, to: &Path) -> Result<WriteStats, Error> {
    if !from.is_dir() {
        return Err(Error::FileNotFound { path: from.to_path_buf() });
    }
    let config = Config::load(root)?;
    let manifest_path = CacheKind::CopyToOutput.path(&root.join(&config.cache_dir));
    let previous = Manifest::load(&manifest_path);
    let mut next = Manifest::default();
    let mut stats = WriteStats::default();

    let mut files: Vec<PathBuf> = WalkDir::new(from)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| return e.file_type().is_file())
        .filter_map(|e| return e.path().strip_prefix(from).ok().map(Path::to_path_buf))
        .collect();
    files.sort();

    for relative in &files {
        let source = from.join(relative);
        let destination = to.join(relative);
        let key = manifest_key(relative);
        let (state, entry) = freshness::evaluate(&source, None, previous.get(&key))?;

        let copy = freshness::should_regenerate(state, &destination);
        if copy {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(&source, &destination)?;
        }
        stats.record(copy, state.needs_manifest_update());
        next.insert(key, entry);
    }
    stats.removed = remove_stale_outputs(to, &previous, &next)?;

    next.save(&manifest_path)?;
    info!(
        "synced {}: {} copied, {} removed, {} unchanged",
        to.display(),
        stats.written,
        stats.removed,
        stats.skipped
    );
    return Ok(stats);
}

/// Record every shared input in `next`. Returns whether any of them is new,
/// changed, or gone since the last build, which invalidates all rewritten
/// sources.
///
/// # Errors
///
/// Returns errors from reading an input.
fn track_inputs(previous: &Manifest, next: &mut Manifest, inputs: &[PathBuf]) -> Result<bool, Error> {
    let mut changed = false;
    for input in inputs {
        let key = format!("{INPUT_KEY_PREFIX}{}", manifest_key(input));
        let (state, entry) = freshness::evaluate(input, None, previous.get(&key))?;
        if state.needs_regeneration() {
            debug!(input = %input.display(), ?state, "shared input changed");
            changed = true;
        }
        next.insert(key, entry);
    }

    let removed = previous
        .files
        .keys()
        .filter(|key| return key.starts_with(INPUT_KEY_PREFIX) && next.get(key).is_none());
    for key in removed {
        debug!(input = %key, "shared input removed");
        changed = true;
    }
    return Ok(changed);
}

/// Write each rewritten file whose source changed, whose output is missing,
/// or when shared inputs changed. Touched-only sources just get their
/// manifest entry refreshed.
///
/// # Errors
///
/// Returns errors from reading a source or writing its output.
fn write_sources(
    src: &Path,
    out: &Path,
    files: &[ProcessedFile],
    previous: &Manifest,
    next: &mut Manifest,
    inputs_changed: bool,
) -> Result<WriteStats, Error> {
    let mut stats = WriteStats::default();
    for file in files {
        let key = manifest_key(&file.path);
        let (state, entry) =
            freshness::evaluate(&src.join(&file.path), Some(file.contents.as_bytes()), previous.get(&key))?;
        let destination = out.join(&file.path);

        let write = inputs_changed || freshness::should_regenerate(state, &destination);
        if write {
            cache::write_atomic(&destination, file.rewritten.as_bytes())?;
        }
        stats.record(write, state.needs_manifest_update());
        next.insert(key, entry);
    }
    return Ok(stats);
}

/// Delete outputs under `out` whose source was tracked in `previous` but is
/// no longer in `next`. Shared-input keys have no output.
///
/// # Errors
///
/// Returns errors from removing an output file.
fn remove_stale_outputs(out: &Path, previous: &Manifest, next: &Manifest) -> Result<usize, Error> {
    let mut removed = 0_usize;
    for key in previous.files.keys() {
        if key.starts_with(INPUT_KEY_PREFIX) || next.get(key).is_some() {
            continue;
        }
        let relative = Path::new(key);
        if !relative.components().all(|c| return matches!(c, Component::Normal(_))) {
            warn!("ignoring cache entry outside the output directory: {key}");
            continue;
        }
        let output = out.join(relative);
        match std::fs::remove_file(&output) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(Error::Io(e)),
            Ok(()) => {
                debug!(output = %output.display(), "removed output of deleted source");
                removed = removed.saturating_add(1);
            },
        }
    }
    return Ok(removed);
}

/// Manifest key for a path: forward slashes on every platform.
fn manifest_key(path: &Path) -> String {
    return path.to_string_lossy().replace('\\', "/");
}
