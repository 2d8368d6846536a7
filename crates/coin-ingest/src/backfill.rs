//! Backfill every pricing file in the source bucket
//!
//! Enumerates the bucket, then ingests each `.csv` key independently. One
//! bad file never stops the run; its error is kept in the report.

use coin_common::{PricingError, Result};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::enumerator::SourceEnumerator;
use crate::keys::SOURCE_SUFFIX;
use crate::orchestrator::{IngestSummary, IngestionOrchestrator};

/// Result of a backfill run
#[derive(Debug, Default)]
pub struct BackfillReport {
    /// Keys returned by enumeration
    pub keys_found: usize,
    /// Non-pricing keys that were not ingested
    pub skipped: Vec<String>,
    pub ingested: Vec<IngestSummary>,
    /// Keys whose ingestion aborted, with the fatal error
    pub failed: Vec<(String, PricingError)>,
}

impl BackfillReport {
    pub fn records_stored(&self) -> usize {
        self.ingested.iter().map(|s| s.records_stored).sum()
    }

    pub fn write_failures(&self) -> usize {
        self.ingested.iter().map(|s| s.failures.len()).sum()
    }

    pub fn rejected_rows(&self) -> usize {
        self.ingested.iter().map(|s| s.rejected_rows.len()).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.ingested.iter().all(IngestSummary::is_complete)
    }
}

pub struct Backfill {
    enumerator: SourceEnumerator,
    orchestrator: Arc<IngestionOrchestrator>,
}

impl Backfill {
    pub fn new(enumerator: SourceEnumerator, orchestrator: Arc<IngestionOrchestrator>) -> Self {
        Self {
            enumerator,
            orchestrator,
        }
    }

    /// Enumerate and ingest. Fails only when the listing itself fails.
    #[instrument(skip(self), fields(bucket = %self.enumerator.bucket()))]
    pub async fn run(&self) -> Result<BackfillReport> {
        let keys = self.enumerator.try_list_source_keys().await?;
        let bucket = self.enumerator.bucket();

        let mut report = BackfillReport {
            keys_found: keys.len(),
            ..Default::default()
        };

        for key in keys {
            if !key.ends_with(SOURCE_SUFFIX) {
                warn!(key = %key, "Skipping non-pricing object");
                report.skipped.push(key);
                continue;
            }

            match self.orchestrator.ingest(bucket, &key).await {
                Ok(summary) => report.ingested.push(summary),
                Err(e) => {
                    error!(key = %key, error = %e, "Backfill of pricing file failed");
                    report.failed.push((key, e));
                },
            }
        }

        info!(
            found = report.keys_found,
            ingested = report.ingested.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            stored = report.records_stored(),
            "Backfill complete"
        );

        Ok(report)
    }
}
