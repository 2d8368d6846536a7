//! Ingestion orchestrator
//!
//! Drives one source object through the pipeline:
//!
//! 1. Derive series name and snapshot date from the object key
//! 2. Fetch the pricing file from the object store
//! 3. Parse it into issue records
//! 4. Upsert one price record per issue into the keyed store
//!
//! A bad key or an unreadable object aborts the ingestion. Malformed rows and
//! failed upserts only cost the affected issue: they are logged with series,
//! date and issue identity, collected in the [`IngestSummary`], and the
//! remaining issues are still written. Nothing is retried here; re-ingesting
//! the same key later converges to the same stored state.

use chrono::NaiveDate;
use coin_common::{PricingError, Result};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::IngestConfig;
use crate::event::{S3Event, SourceObject};
use crate::keys::{derive_composite_key, SourceKey};
use crate::models::{IssueRecord, SeriesSnapshot, StoredPriceRecord, AS_OF_FORMAT};
use crate::parser::PriceSheetParser;
use crate::storage::ObjectStore;
use crate::store::PriceStore;

/// Outcome of ingesting one source object
#[derive(Debug)]
pub struct IngestSummary {
    pub bucket: String,
    pub key: String,
    pub series: String,
    pub as_of: NaiveDate,
    /// Issues accepted by the parser
    pub records_parsed: usize,
    pub records_stored: usize,
    /// `MalformedRecord` per rejected row
    pub rejected_rows: Vec<PricingError>,
    /// `StoreWriteFailure` per issue that could not be written
    pub failures: Vec<PricingError>,
}

impl IngestSummary {
    /// Every row parsed and every record written
    pub fn is_complete(&self) -> bool {
        self.rejected_rows.is_empty() && self.failures.is_empty()
    }
}

/// Outcome of ingesting every object of one notification event
#[derive(Debug, Default)]
pub struct EventOutcome {
    pub ingested: Vec<IngestSummary>,
    /// Objects whose ingestion aborted, with the fatal error
    pub failed: Vec<(SourceObject, PricingError)>,
}

impl EventOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Summaries if every object was ingested, otherwise the first fatal
    /// error so the trigger can redeliver
    pub fn into_result(self) -> Result<Vec<IngestSummary>> {
        match self.failed.into_iter().next() {
            Some((_, e)) => Err(e),
            None => Ok(self.ingested),
        }
    }
}

/// Runs the fetch, parse, derive and upsert steps for source objects
pub struct IngestionOrchestrator {
    objects: Arc<dyn ObjectStore>,
    prices: Arc<dyn PriceStore>,
    table: String,
    max_concurrency: usize,
    parser: PriceSheetParser,
}

impl IngestionOrchestrator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        prices: Arc<dyn PriceStore>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            objects,
            prices,
            table: table.into(),
            max_concurrency: 1,
            parser: PriceSheetParser::new(),
        }
    }

    pub fn from_config(
        objects: Arc<dyn ObjectStore>,
        prices: Arc<dyn PriceStore>,
        config: &IngestConfig,
    ) -> Self {
        Self::new(objects, prices, config.table.clone()).with_max_concurrency(config.max_concurrency)
    }

    /// Number of upserts allowed in flight at once (at least 1)
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Ingest one `<YYYY-MM-DD>/<series>.csv` object
    #[instrument(skip(self))]
    pub async fn ingest(&self, bucket: &str, key: &str) -> Result<IngestSummary> {
        let source = SourceKey::parse(key)?;

        let raw = self.objects.get(bucket, key).await.map_err(|e| {
            error!(bucket, key, error = %e, "Error reading pricing file");
            e
        })?;

        let content = String::from_utf8_lossy(&raw);
        let mut parsed = self.parser.parse(&content);
        let rejected = std::mem::take(&mut parsed.rejected);
        let snapshot = parsed.into_snapshot(&source.series_name, source.as_of);

        for row in &rejected {
            match row {
                PricingError::MalformedRecord {
                    line,
                    name,
                    variety,
                    reason,
                } => warn!(
                    series = %snapshot.series_name,
                    as_of = %source.as_of_string(),
                    line,
                    name = %name,
                    variety = %variety,
                    reason = %reason,
                    "Skipped malformed row"
                ),
                other => warn!(
                    series = %snapshot.series_name,
                    as_of = %source.as_of_string(),
                    error = %other,
                    "Skipped malformed row"
                ),
            }
        }

        debug!(
            series = %snapshot.series_name,
            issues = snapshot.issues.len(),
            "Parsed pricing file"
        );

        let outcomes: Vec<Result<()>> = stream::iter(
            snapshot
                .issues
                .iter()
                .map(|issue| self.store_issue(&snapshot, issue)),
        )
        .buffered(self.max_concurrency)
        .collect()
        .await;

        let records_parsed = outcomes.len();
        let failures: Vec<PricingError> = outcomes.into_iter().filter_map(|r| r.err()).collect();
        let records_stored = records_parsed - failures.len();

        info!(
            series = %snapshot.series_name,
            as_of = %source.as_of_string(),
            parsed = records_parsed,
            stored = records_stored,
            failed = failures.len(),
            rejected = rejected.len(),
            "Ingested pricing file"
        );

        Ok(IngestSummary {
            bucket: bucket.to_string(),
            key: key.to_string(),
            series: snapshot.series_name,
            as_of: snapshot.as_of,
            records_parsed,
            records_stored,
            rejected_rows: rejected,
            failures,
        })
    }

    /// Ingest every object named by a notification event.
    ///
    /// All objects are attempted in order. Only an undecodable event fails
    /// outright; per-object fatal errors land in [`EventOutcome::failed`].
    pub async fn ingest_event(&self, event: &S3Event) -> Result<EventOutcome> {
        let objects = event.source_objects()?;
        info!(objects = objects.len(), "Received event");

        let mut outcome = EventOutcome::default();

        for object in objects {
            match self.ingest(&object.bucket, &object.key).await {
                Ok(summary) => outcome.ingested.push(summary),
                Err(e) => {
                    error!(bucket = %object.bucket, key = %object.key, error = %e, "Ingestion failed");
                    outcome.failed.push((object, e));
                },
            }
        }

        Ok(outcome)
    }

    async fn store_issue(&self, snapshot: &SeriesSnapshot, issue: &IssueRecord) -> Result<()> {
        let composite_key = derive_composite_key(&snapshot.series_name, issue);
        let as_of = snapshot.as_of.format(AS_OF_FORMAT).to_string();

        let result = match StoredPriceRecord::new(composite_key.clone(), snapshot.as_of, &issue.price_map()) {
            Ok(record) => self.prices.put(&self.table, &record).await,
            Err(e) => Err(PricingError::Serialization(e)),
        };

        match result {
            Ok(()) => {
                debug!(coin = %composite_key, as_of = %as_of, "Stored price record");
                Ok(())
            },
            Err(e) => {
                error!(
                    series = %snapshot.series_name,
                    as_of = %as_of,
                    name = %issue.name,
                    variety = issue.variety().unwrap_or_default(),
                    coin = %composite_key,
                    error = %e,
                    "Error writing price record"
                );
                Err(as_write_failure(e, composite_key, as_of))
            },
        }
    }
}

fn as_write_failure(err: PricingError, composite_key: String, as_of: String) -> PricingError {
    match err {
        PricingError::StoreWriteFailure { .. } => err,
        other => PricingError::StoreWriteFailure {
            composite_key,
            as_of,
            reason: other.to_string(),
        },
    }
}
