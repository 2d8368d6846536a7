//! Coin Pricing Ingest Library
//!
//! Moves daily coin-pricing snapshots from an object store into a keyed price
//! table. Each pricing file is named `<YYYY-MM-DD>/<series>.csv`; every issue
//! row in it becomes one record keyed by `(series|name[|variety], date)`.
//!
//! # Pipeline
//!
//! - [`event`]: decode object-created notifications
//! - [`keys`]: derive the snapshot date, series and composite keys
//! - [`parser`]: read a pricing sheet into issue records
//! - [`orchestrator`]: fetch, parse and upsert one object
//! - [`enumerator`] / [`backfill`]: walk a whole bucket
//!
//! # Example
//!
//! ```no_run
//! use coin_ingest::{IngestionOrchestrator, MemoryPriceStore, S3ObjectStore, StorageConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let objects = Arc::new(S3ObjectStore::new(StorageConfig::from_env()).await?);
//!     let prices = Arc::new(MemoryPriceStore::new());
//!
//!     let orchestrator = IngestionOrchestrator::new(objects, prices, "coin_prices");
//!     let summary = orchestrator.ingest("coin-pricing", "2023-01-05/Lincoln Cents.csv").await?;
//!     println!("stored {} records", summary.records_stored);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod backfill;
pub mod config;
pub mod enumerator;
pub mod event;
pub mod keys;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod storage;
pub mod store;

pub use backfill::{Backfill, BackfillReport};
pub use config::IngestConfig;
pub use enumerator::SourceEnumerator;
pub use event::S3Event;
pub use models::{IssueRecord, PriceObservation, SeriesSnapshot, StoredPriceRecord};
pub use orchestrator::{EventOutcome, IngestSummary, IngestionOrchestrator};
pub use parser::PriceSheetParser;
pub use storage::{ObjectStore, S3ObjectStore, StorageConfig};
pub use store::{MemoryPriceStore, PgPriceStore, PriceStore};
