// src/main.rs
//! Streamkeeper - CLI entry point

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use streamkeeper::{pipeline, prune, BuildOptions, CancelToken};
use tracing::{info, warn};

// =============================================================================
// CLI Definitions
// =============================================================================

#[derive(Parser)]
#[command(name = "streamkeeper")]
#[command(version)]
#[command(about = "Maintain a Simplestreams image repository on a local filesystem", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value = "text")]
    logformat: LogFormat,

    /// Minimum level of logged messages
    #[arg(long, global = true, value_enum, default_value = "info")]
    loglevel: LogLevel,

    /// Abort the invocation after this many seconds (0 = no timeout)
    #[arg(long, global = true, default_value_t = 0)]
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the simplestream catalogs and index on the given path
    Build {
        /// Repository root directory
        root: PathBuf,

        /// Stream version label under streams/
        #[arg(long, default_value = "v1")]
        stream_version: String,

        /// Image directory, relative to the root (repeatable)
        #[arg(long = "image-dir", short = 'd', default_value = "images")]
        image_dirs: Vec<String>,

        /// Maximum number of concurrent operations
        #[arg(long, default_value_t = default_workers())]
        workers: usize,
    },

    /// Prune obsolete or dangling product versions
    Prune {
        /// Repository root directory
        root: PathBuf,

        /// Stream version label under streams/
        #[arg(long, default_value = "v1")]
        stream_version: String,

        /// Image directory, relative to the root (repeatable)
        #[arg(long = "image-dir", short = 'd', default_value = "images")]
        image_dirs: Vec<String>,

        /// Number of newest complete versions to retain per product
        #[arg(long)]
        retain_builds: Option<usize>,

        /// Age-based retention in days (0 disables the policy)
        #[arg(long, default_value_t = 0)]
        retain_days: u64,

        /// Also remove aged versions the catalog does not reference
        #[arg(long)]
        dangling: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Default worker count: half the CPUs, at least one
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.logformat, cli.loglevel);

    let cancel = if cli.timeout > 0 {
        CancelToken::with_timeout(Duration::from_secs(cli.timeout))
    } else {
        CancelToken::new()
    };

    match cli.command {
        Commands::Build {
            root,
            stream_version,
            image_dirs,
            workers,
        } => {
            let options = BuildOptions {
                stream_version,
                streams: image_dirs,
                workers,
            };

            pipeline::build_index(&cancel, &root, &options)
                .with_context(|| format!("Failed to build index under {:?}", root))
        }

        Commands::Prune {
            root,
            stream_version,
            image_dirs,
            retain_builds,
            retain_days,
            dangling,
        } => cmd_prune(
            &root,
            &stream_version,
            &image_dirs,
            retain_builds,
            retain_days,
            dangling,
        ),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "streamkeeper", &mut io::stdout());
            Ok(())
        }
    }
}

fn init_logging(format: LogFormat, level: LogLevel) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter()));

    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

fn cmd_prune(
    root: &std::path::Path,
    stream_version: &str,
    image_dirs: &[String],
    retain_builds: Option<usize>,
    retain_days: u64,
    dangling: bool,
) -> Result<()> {
    if retain_days > 0 {
        warn!("--retain-days is accepted but age-based retention is not implemented yet");
    }

    if retain_builds.is_none() && !dangling {
        info!("No retention policy selected, nothing to do");
        return Ok(());
    }

    for stream_name in image_dirs {
        if let Some(keep) = retain_builds {
            prune::prune_stream_product_versions(root, stream_version, stream_name, keep)
                .with_context(|| format!("Failed to prune versions in stream {:?}", stream_name))?;
        }

        if dangling {
            prune::prune_dangling_product_versions(
                root,
                stream_version,
                stream_name,
                prune::DANGLING_FRESHNESS_WINDOW,
            )
            .with_context(|| {
                format!("Failed to prune dangling versions in stream {:?}", stream_name)
            })?;
        }
    }

    Ok(())
}
