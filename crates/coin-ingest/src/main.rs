//! Coin Ingest - pricing file ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coin_common::logging::{init_logging, LogConfig, LogLevel};
use coin_ingest::{
    Backfill, IngestConfig, IngestSummary, IngestionOrchestrator, MemoryPriceStore, ObjectStore,
    PgPriceStore, PriceStore, S3Event, S3ObjectStore, SourceEnumerator,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "coin-ingest")]
#[command(author, version, about = "Coin pricing ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Write to an in-memory store instead of the database
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one pricing file
    Ingest {
        /// Object key, e.g. "2023-01-05/Lincoln Cents.csv"
        #[arg(short, long)]
        key: String,

        /// Bucket holding the file (defaults to S3_BUCKET)
        #[arg(short, long)]
        bucket: Option<String>,
    },

    /// Ingest the objects named by a notification payload
    Event {
        /// Path to the JSON payload, or "-" for stdin
        path: String,
    },

    /// List pricing files in the source bucket
    List,

    /// Ingest every pricing file in the source bucket
    Backfill,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("coin-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::load()?;
    info!(table = %config.table, max_concurrency = config.max_concurrency, "Loaded configuration");

    let objects: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(config.storage.clone()).await?);

    if let Command::List = cli.command {
        let enumerator = SourceEnumerator::new(objects, config.require_source_bucket()?);
        for key in enumerator.try_list_source_keys().await? {
            println!("{}", key);
        }
        return Ok(());
    }

    let prices = open_price_store(&config, cli.dry_run).await?;
    let orchestrator = Arc::new(IngestionOrchestrator::from_config(objects.clone(), prices, &config));

    match cli.command {
        Command::Ingest { key, bucket } => {
            let bucket = match bucket {
                Some(bucket) => bucket,
                None => config.require_source_bucket()?.to_string(),
            };
            let summary = orchestrator.ingest(&bucket, &key).await?;
            report(&summary);
        },
        Command::Event { path } => {
            let payload = read_payload(&path).await?;
            let event = S3Event::from_json(&payload)?;
            let outcome = orchestrator.ingest_event(&event).await?;

            for summary in &outcome.ingested {
                report(summary);
            }
            // Fail so the trigger redelivers
            outcome.into_result()?;
        },
        Command::Backfill => {
            let enumerator = SourceEnumerator::new(objects, config.require_source_bucket()?);
            let result = Backfill::new(enumerator, orchestrator).run().await?;

            for summary in &result.ingested {
                report(summary);
            }
            for (key, error) in &result.failed {
                warn!(key = %key, error = %error, "Not ingested");
            }
            if !result.failed.is_empty() {
                anyhow::bail!("{} of {} pricing files failed", result.failed.len(), result.keys_found);
            }
        },
        Command::List => {},
    }

    info!("Ingestion complete");
    Ok(())
}

async fn open_price_store(config: &IngestConfig, dry_run: bool) -> Result<Arc<dyn PriceStore>> {
    if dry_run {
        info!("Dry run: records are kept in memory");
        return Ok(Arc::new(MemoryPriceStore::new()));
    }

    let store = PgPriceStore::connect(&config.database.url, config.database.max_connections).await?;
    store.ensure_table(&config.table).await?;
    Ok(Arc::new(store))
}

async fn read_payload(path: &str) -> Result<String> {
    if path == "-" {
        let mut payload = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut tokio::io::stdin(), &mut payload)
            .await
            .context("Failed to read event from stdin")?;
        return Ok(payload);
    }

    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read event file {}", path))
}

fn report(summary: &IngestSummary) {
    println!(
        "{} ({}): {} stored, {} failed, {} rows rejected",
        summary.series,
        summary.as_of,
        summary.records_stored,
        summary.failures.len(),
        summary.rejected_rows.len()
    );
}
