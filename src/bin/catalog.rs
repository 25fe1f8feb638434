use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use game_catalog::cli::db_counts::{run as run_counts, DbCountsConfig};
use game_catalog::config::ImportConfig;
use game_catalog::database_ops::db::Db;
use game_catalog::database_ops::derive::derive_catalog;
use game_catalog::logging::init_tracing;
use game_catalog::orchestrator::{ImportOptions, ImportPipeline, PipelineError};
use game_catalog::source::fetcher::SourceFetcher;
use game_catalog::util::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "catalog", version, about = "Game-data catalog importer")]
struct Cli {
    /// Debug logging for this crate (RUST_LOG still wins)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Fetch the game-data documents, load the canonical catalog and derive the user catalog
    Import {
        /// Stop after fetching and caching the documents
        #[arg(long, default_value_t = false)]
        fetch_only: bool,
        /// Do not project into the user catalog
        #[arg(long, default_value_t = false)]
        skip_derive: bool,
        /// Print the run report as JSON instead of the text summary
        #[arg(long, default_value_t = false)]
        json: bool,
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
        /// Directory holding the cached documents
        #[arg(long)]
        cache_dir: Option<PathBuf>,
        /// In-flight upserts per dataset (defaults to IMPORT_CONCURRENCY or 1)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Fail a dataset instead of synthesizing a placeholder when nothing is available
        #[arg(long, default_value_t = false)]
        no_stub: bool,
    },
    /// Derive the user catalog from what is already stored
    Derive {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
    /// Print row counts for every catalog table
    Counts {
        /// Optional override for the database URL
        #[arg(long)]
        db_url: Option<String>,
    },
}

fn resolve_database_url(db_url: Option<String>, fallback: String) -> String {
    db_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .unwrap_or(fallback)
}

#[tokio::main]
async fn main() -> ExitCode {
    env::init_env();
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("{e}");
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "catalog command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Import {
            fetch_only,
            skip_derive,
            json,
            db_url,
            cache_dir,
            concurrency,
            no_stub,
        } => {
            let mut cfg = ImportConfig::from_env();
            if let Some(dir) = cache_dir {
                cfg.fetcher.cache_dir = dir;
            }
            if no_stub {
                cfg.fetcher.allow_stub = false;
            }
            let database_url = resolve_database_url(db_url, cfg.database_url.clone());
            let db = Db::connect(&database_url, cfg.max_connections).await?;
            let fetcher = SourceFetcher::new(cfg.fetcher.clone()).context("building http client")?;
            let pipeline = ImportPipeline::new(db, fetcher);
            let options = ImportOptions {
                fetch_only,
                skip_derive,
                concurrency: concurrency.unwrap_or(cfg.concurrency).max(1),
            };

            let report = match pipeline.run(&options).await {
                Ok(report) => report,
                Err(PipelineError::NoDatasets) => {
                    anyhow::bail!("no usable dataset for any type; nothing was imported")
                }
                Err(e) => return Err(e.into()),
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{report}");
            }
        }
        Commands::Derive { db_url } => {
            let database_url = resolve_database_url(db_url, env::db_url());
            let db = Db::connect(&database_url, 1).await?;
            let report = derive_catalog(&db).await?;
            info!(created = report.created(), "derive completed");
            println!(
                "derived {} items, {} buildings, {} recipes, {} recipe lines ({} dropped)",
                report.items_created,
                report.buildings_created,
                report.recipes_created,
                report.recipe_items_created,
                report.recipe_items_dropped
            );
        }
        Commands::Counts { db_url } => {
            run_counts(DbCountsConfig {
                database_url: db_url,
            })
            .await?;
        }
    }
    Ok(())
}
