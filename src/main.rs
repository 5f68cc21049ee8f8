mod cache;
mod commands;
mod config;
mod container;
mod dedupe;
mod diagnostics;
mod error;
mod freshness;
mod hasher;
mod metabase;
mod phonetic;
mod resolver;
mod scanner;
mod session;
mod types;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

use crate::commands::GenerateOptions;

#[derive(Parser)]
#[command(
    name = "nativeref",
    version,
    about = "Native API reference resolution and incremental generation gating"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve native references in sources and prepare generator input
    Generate {
        /// Metabase JSON produced by the native symbol generator
        #[arg(long)]
        metabase: PathBuf,
        /// Application source root
        #[arg(long, default_value = "Resources")]
        src: PathBuf,
        /// Output directory for rewritten sources
        #[arg(long, default_value = "build/nativeref/Resources")]
        out: PathBuf,
        /// Ignore metabase and wrapper caches
        #[arg(long)]
        force: bool,
    },
    /// Extract dependency containers and deduplicate archives
    Dependencies {
        /// Directory containers are extracted into
        #[arg(long, default_value = "build/nativeref/containers")]
        work_dir: PathBuf,
        /// Archives and containers, in link order
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Copy generated files to the build output, skipping unchanged ones
    Sync {
        /// Generated files
        from: PathBuf,
        /// Build output directory
        to: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = Path::new(".");
    let result = match cli.command {
        Commands::Generate { metabase, src, out, force } => {
            let options = GenerateOptions { force, metabase, out, src };
            commands::generate(root, &options).map(|_report| return ())
        },
        Commands::Dependencies { work_dir, paths } => commands::dependencies(root, &work_dir, &paths),
        Commands::Sync { from, to } => commands::sync(root, &from, &to).map(|_stats| return ()),
    };

    return match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::FAILURE
        },
    };
}

/// Log to stderr. `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        return EnvFilter::new(format!("nativeref={level},warn"));
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
