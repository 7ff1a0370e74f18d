//! # spectra CLI
//!
//! Every command except `serve` builds the index once from the configured
//! corpus, runs one operation, and exits.
//!
//! ## Usage
//!
//! ```bash
//! spectra --config ./config/spectra.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `spectra search "<query>"` | Ranked paragraphs plus confidence margin |
//! | `spectra status` | Index summary |
//! | `spectra reindex` | Build the index and print build stats |
//! | `spectra duplicates` | Near-duplicate paragraph pairs |
//! | `spectra orphans` | Paragraphs with no close neighbor |
//! | `spectra coverage <group>` | How well a group's seeds are reached from its roots |
//! | `spectra similarity` | Vocabulary overlap between groups |
//! | `spectra serve` | HTTP API plus background watcher |
//!
//! ## Examples
//!
//! ```bash
//! spectra search "kafka replication" --mode retrieve --explain
//! spectra search "fog signals" --external ~/papers/lighthouses
//! spectra duplicates --threshold 0.8 --exclude-shared-names
//! spectra serve --config ./config/spectra.toml
//! ```

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use spectra::commands;
use spectra::config::load_config;
use spectra::engine::{Engine, ScopeOverride, SearchOptions};
use spectra::logging::{self, Verbosity};
use spectra::models::{ScopeMode, SearchMode};
use spectra::server;

/// spectra — paragraph-level retrieval with contrastive anchors.
#[derive(Parser)]
#[command(
    name = "spectra",
    about = "Paragraph-level retrieval engine with contrastive anchors and margin-based confidence",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/spectra.toml")]
    config: PathBuf,

    /// Debug-level logging on stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only on stderr.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the corpus.
    Search {
        query: String,

        /// Maximum number of results (defaults to `[retrieval].top_n`).
        #[arg(long)]
        top_n: Option<usize>,

        /// Scoring mode: `explore`, `retrieve`, or `auto`.
        #[arg(long, default_value = "auto")]
        mode: String,

        /// Only score paragraphs from this group (repeatable).
        #[arg(long = "group")]
        groups: Vec<String>,

        /// Boost this group in explore mode (repeatable).
        #[arg(long)]
        boost: Vec<String>,

        /// Index this scope instead of the default: `all`, `active`, or `explicit`.
        #[arg(long)]
        scope: Option<String>,

        /// Groups for `--scope explicit`, comma separated.
        #[arg(long, value_delimiter = ',')]
        scope_groups: Vec<String>,

        /// Index this directory or file instead of the configured corpus.
        #[arg(long)]
        external: Option<PathBuf>,

        /// Group name for files at the top of `--external`.
        #[arg(long)]
        name: Option<String>,

        /// Include a per-result scoring breakdown.
        #[arg(long)]
        explain: bool,
    },

    /// Show index status.
    Status,

    /// Build the index and print build stats.
    Reindex,

    /// List near-duplicate paragraph pairs across sources.
    Duplicates {
        /// Minimum similarity (defaults to `[maintenance].duplicate_threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        top_n: Option<usize>,

        /// Skip pairs whose files share a name across groups.
        #[arg(long)]
        exclude_shared_names: bool,
    },

    /// List paragraphs with no close neighbor.
    Orphans {
        /// Maximum similarity (defaults to `[maintenance].orphan_threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        #[arg(long)]
        top_n: Option<usize>,
    },

    /// Report seed-to-root coverage for a group.
    Coverage { group: String },

    /// Vocabulary similarity between every pair of groups.
    Similarity,

    /// Start the HTTP server and the watcher.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    let cfg = load_config(&cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Search {
            query,
            top_n,
            mode,
            groups,
            boost,
            scope,
            scope_groups,
            external,
            name,
            explain,
        } => {
            let mode: SearchMode = mode.parse().map_err(anyhow::Error::msg)?;
            let scope = scope
                .map(|s| parse_scope(&s, scope_groups))
                .transpose()?;

            let engine = match external {
                Some(path) => {
                    let engine = Engine::new(cfg)?;
                    engine.load_external(&path, name.as_deref())?;
                    engine
                }
                None => Engine::open(cfg)?,
            };

            let opts = SearchOptions {
                query,
                top_n,
                mode,
                scope,
                groups: (!groups.is_empty()).then_some(groups),
                boost,
                explain,
            };
            commands::run_search(&engine, &opts, json)?;
        }
        Commands::Status => {
            commands::run_status(&Engine::open(cfg)?, json)?;
        }
        Commands::Reindex => {
            let engine = Engine::new(cfg)?;
            let stats = engine.reindex(None)?;
            commands::print_stats(&stats, json)?;
        }
        Commands::Duplicates {
            threshold,
            top_n,
            exclude_shared_names,
        } => {
            commands::run_duplicates(&Engine::open(cfg)?, threshold, top_n, exclude_shared_names, json)?;
        }
        Commands::Orphans { threshold, top_n } => {
            commands::run_orphans(&Engine::open(cfg)?, threshold, top_n, json)?;
        }
        Commands::Coverage { group } => {
            commands::run_coverage(&Engine::open(cfg)?, &group, json)?;
        }
        Commands::Similarity => {
            commands::run_similarity(&Engine::open(cfg)?, json)?;
        }
    }

    Ok(())
}

fn parse_scope(mode: &str, groups: Vec<String>) -> Result<ScopeOverride> {
    let mode = match mode.to_ascii_lowercase().as_str() {
        "all" => ScopeMode::All,
        "active" => ScopeMode::Active,
        "explicit" => ScopeMode::Explicit,
        other => bail!("unknown scope '{}': expected all, active, or explicit", other),
    };
    Ok(ScopeOverride { mode, groups })
}
