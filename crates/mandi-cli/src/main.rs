use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mandi_storage::{PgPriceStore, ReportSource};
use mandi_sync::{
    calculate_trends, connect_store, list_current_trends, run_sync_once_from_env, JobRunReport,
    SyncConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mandi-cli")]
#[command(about = "Mandi price ingestion and trend tooling")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, parse, store, and trend one report.
    Sync {
        /// URL or local path; defaults to MANDI_SOURCE.
        #[arg(long)]
        source: Option<ReportSource>,
    },
    /// Ingest a local CSV or spreadsheet export.
    Import { path: PathBuf },
    /// Recompute trends from stored prices and print them.
    Trends,
    Migrate,
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync { source: None }) {
        Commands::Sync { source } => {
            let report = run_sync_once_from_env(source).await?;
            print_report(&report)?;
        }
        Commands::Import { path } => {
            let report = run_sync_once_from_env(Some(ReportSource::Path(path))).await?;
            print_report(&report)?;
        }
        Commands::Trends => {
            let config = SyncConfig::from_env();
            let store = connect_store(&config).await?;
            let updated = calculate_trends(store.as_ref(), config.trend_window).await?;
            println!("trends updated: {updated}");
            for trend in list_current_trends(store.as_ref()).await? {
                println!(
                    "{:<24} {:>10.2} {:>8.2}% {}",
                    trend.commodity, trend.current_price, trend.percentage_change, trend.trend_label
                );
            }
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let url = config
                .database_url
                .context("DATABASE_URL must be set to run migrations")?;
            let store = PgPriceStore::connect(&url).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Serve => {
            mandi_web::serve_from_env().await?;
        }
    }

    Ok(())
}

fn print_report(report: &JobRunReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    if !report.succeeded() {
        bail!(
            "run {} failed during {:?}: {}",
            report.run_id,
            report.failed_stage,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
