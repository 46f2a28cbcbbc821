//! # Mirror Restore CLI (`mirror`)
//!
//! The `mirror` binary runs the restoration pipeline over a crawled mirror
//! and offers read-only views for checking a configuration first.
//!
//! ## Usage
//!
//! ```bash
//! mirror --config ./config/mirror.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mirror run` | Transform every page and write the output tree and search index |
//! | `mirror pages` | List the pages a run would process, in order |
//! | `mirror datasets` | Load each dataset and print its size or error |
//! | `mirror stages` | Show stage order and which stages are enabled |
//!
//! ## Examples
//!
//! ```bash
//! # Full run, JSON report for follow-up
//! mirror run --report ./reports/run.json
//!
//! # Only restore comments and music, without writing anything
//! mirror run --stages comments,music --dry-run
//!
//! # Verbose per-stage logging
//! RUST_LOG=mirror_restore=debug mirror run
//! ```
//!
//! Exit status is non-zero only when the run cannot start or finish: bad
//! configuration, missing source root, a dataset that fails to load, or an
//! unwritable output root. Per-page failures are reported, not fatal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use mirror_restore::config;
use mirror_restore::inspect;
use mirror_restore::pipeline::{run_pipeline, Pipeline, RunOptions};
use mirror_restore::progress::ProgressMode;

/// Mirror Restore: turn a crawled site mirror into a restored offline copy.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/mirror.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "mirror",
    about = "Mirror Restore: restore comments, music and fixes into a crawled site mirror",
    version,
    long_about = "Mirror Restore runs every page of a locally crawled site mirror through an \
    ordered list of idempotent stages (dark theme, archived comments, music links, author age, \
    ad stripping, UI fixes) and writes a self-contained offline copy plus a JSON search index."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/mirror.toml`.
    #[arg(long, global = true, default_value = "./config/mirror.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over the whole mirror.
    ///
    /// Writes transformed pages, copied assets and the search index under
    /// the output root, then prints a summary of succeeded, partially
    /// failed and failed pages.
    Run {
        /// Comma-separated stage names to enable for this run only.
        /// Execution order is always the registry order.
        #[arg(long, value_delimiter = ',')]
        stages: Option<Vec<String>>,

        /// Process every page but write nothing.
        #[arg(long)]
        dry_run: bool,

        /// Also write the run report as JSON to this file.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Progress on stderr: `off`, `human` or `json`.
        /// Defaults to `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },

    /// List discovered pages in processing order.
    Pages,

    /// Load each dataset and print record counts.
    Datasets,

    /// Show the stage registry.
    Stages,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            stages,
            dry_run,
            report,
            progress,
        } => {
            if let Some(stages) = stages {
                cfg.override_stages(stages)?;
            }
            let progress = match progress.as_deref() {
                None => ProgressMode::default_for_tty(),
                Some(value) => match ProgressMode::parse(value) {
                    Some(mode) => mode,
                    None => bail!("Unknown progress mode: '{}'. Available: off, human, json", value),
                },
            };

            let pipeline = Arc::new(Pipeline::load(&cfg)?);
            let run = run_pipeline(&cfg, pipeline, RunOptions { dry_run, progress }).await?;

            run.print_summary();
            if let Some(path) = report {
                run.write_json(&path)?;
                eprintln!("Report written to {}", path.display());
            }
            if dry_run {
                println!("dry run: nothing was written");
            }
        }
        Commands::Pages => {
            inspect::list_pages(&cfg)?;
        }
        Commands::Datasets => {
            inspect::list_datasets(&cfg)?;
        }
        Commands::Stages => {
            inspect::list_stages(&cfg)?;
        }
    }

    Ok(())
}
