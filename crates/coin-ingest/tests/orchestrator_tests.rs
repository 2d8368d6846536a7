//! Orchestrator tests
//!
//! Drive whole ingestions against in-memory collaborators and check what
//! ends up in the price table.

mod common;

use coin_common::PricingError;
use coin_ingest::{IngestionOrchestrator, MemoryPriceStore, S3Event};
use common::{init_tracing, FakeObjectStore, FlakyPriceStore, BUCKET, TABLE};
use std::sync::Arc;

const LINCOLN_KEY: &str = "2023-01-05/Lincoln Cents.csv";

const LINCOLN_SHEET: &str = "\
name,variety,63,64,65
1909-S,VDB,1400,1650,2100
1910,,12,18,30
1914-D,,250,300,420
";

fn orchestrator(
    objects: &Arc<FakeObjectStore>,
    prices: Arc<dyn coin_ingest::PriceStore>,
) -> IngestionOrchestrator {
    IngestionOrchestrator::new(objects.clone(), prices, TABLE)
}

fn lincoln_bucket() -> Arc<FakeObjectStore> {
    let objects = FakeObjectStore::new();
    objects.put(BUCKET, LINCOLN_KEY, LINCOLN_SHEET);
    Arc::new(objects)
}

#[tokio::test]
async fn test_ingest_stores_one_record_per_issue() {
    init_tracing();
    let objects = lincoln_bucket();
    let prices = Arc::new(MemoryPriceStore::new());

    let summary = orchestrator(&objects, prices.clone())
        .ingest(BUCKET, LINCOLN_KEY)
        .await
        .unwrap();

    assert_eq!(summary.series, "Lincoln Cents");
    assert_eq!(summary.as_of.to_string(), "2023-01-05");
    assert_eq!(summary.records_parsed, 3);
    assert_eq!(summary.records_stored, 3);
    assert!(summary.is_complete());

    let vdb = prices.get(TABLE, "Lincoln Cents|1909-S|VDB", "2023-01-05").unwrap();
    assert_eq!(vdb.prices, r#"{"63":1400,"64":1650,"65":2100}"#);

    let plain = prices.get(TABLE, "Lincoln Cents|1910", "2023-01-05").unwrap();
    assert_eq!(plain.price_map().unwrap().get(&65), Some(&30));

    assert_eq!(prices.len(), 3);
}

#[tokio::test]
async fn test_reingesting_is_idempotent() {
    init_tracing();
    let objects = lincoln_bucket();
    let prices = Arc::new(MemoryPriceStore::new());
    let orchestrator = orchestrator(&objects, prices.clone());

    orchestrator.ingest(BUCKET, LINCOLN_KEY).await.unwrap();
    let first = prices.records(TABLE);

    orchestrator.ingest(BUCKET, LINCOLN_KEY).await.unwrap();
    let second = prices.records(TABLE);

    assert_eq!(first, second);
    assert_eq!(prices.len(), 3);
    assert_eq!(prices.writes(), 6);
}

#[tokio::test]
async fn test_new_date_adds_records_without_touching_old_ones() {
    init_tracing();
    let objects = lincoln_bucket();
    objects.put(
        BUCKET,
        "2023-01-06/Lincoln Cents.csv",
        "name,variety,65\n1910,,35\n",
    );
    let prices = Arc::new(MemoryPriceStore::new());
    let orchestrator = orchestrator(&objects, prices.clone());

    orchestrator.ingest(BUCKET, LINCOLN_KEY).await.unwrap();
    orchestrator
        .ingest(BUCKET, "2023-01-06/Lincoln Cents.csv")
        .await
        .unwrap();

    let old = prices.get(TABLE, "Lincoln Cents|1910", "2023-01-05").unwrap();
    let new = prices.get(TABLE, "Lincoln Cents|1910", "2023-01-06").unwrap();
    assert_eq!(old.price_map().unwrap().get(&65), Some(&30));
    assert_eq!(new.prices, r#"{"65":35}"#);
    assert_eq!(prices.len(), 4);
}

#[tokio::test]
async fn test_failed_write_does_not_stop_the_rest() {
    init_tracing();
    let objects = lincoln_bucket();
    let prices = Arc::new(FlakyPriceStore::new().failing_call(2));

    let summary = orchestrator(&objects, prices.clone())
        .ingest(BUCKET, LINCOLN_KEY)
        .await
        .unwrap();

    assert_eq!(prices.calls(), 3);
    assert_eq!(summary.records_parsed, 3);
    assert_eq!(summary.records_stored, 2);
    assert!(!summary.is_complete());

    match &summary.failures[..] {
        [PricingError::StoreWriteFailure {
            composite_key,
            as_of,
            ..
        }] => {
            assert_eq!(composite_key, "Lincoln Cents|1910");
            assert_eq!(as_of, "2023-01-05");
        },
        other => panic!("expected one write failure, got {:?}", other),
    }

    assert!(prices
        .inner
        .get(TABLE, "Lincoln Cents|1909-S|VDB", "2023-01-05")
        .is_some());
    assert!(prices.inner.get(TABLE, "Lincoln Cents|1910", "2023-01-05").is_none());
    assert!(prices.inner.get(TABLE, "Lincoln Cents|1914-D", "2023-01-05").is_some());
}

#[tokio::test]
async fn test_unreadable_source_is_fatal() {
    init_tracing();
    let objects = lincoln_bucket();
    objects.make_unreadable(LINCOLN_KEY);
    let prices = Arc::new(MemoryPriceStore::new());

    let err = orchestrator(&objects, prices.clone())
        .ingest(BUCKET, LINCOLN_KEY)
        .await
        .unwrap_err();

    assert!(matches!(err, PricingError::SourceUnavailable { .. }));
    assert!(err.is_fatal());
    assert!(prices.is_empty());
}

#[tokio::test]
async fn test_missing_object_is_fatal() {
    init_tracing();
    let objects = Arc::new(FakeObjectStore::new());
    let prices = Arc::new(MemoryPriceStore::new());

    let err = orchestrator(&objects, prices)
        .ingest(BUCKET, LINCOLN_KEY)
        .await
        .unwrap_err();

    assert!(matches!(err, PricingError::SourceUnavailable { .. }));
}

#[tokio::test]
async fn test_invalid_key_is_rejected_before_fetching() {
    init_tracing();
    let objects = lincoln_bucket();
    objects.put(BUCKET, "serieslist.json", "[]");
    let prices = Arc::new(MemoryPriceStore::new());
    let orchestrator = orchestrator(&objects, prices.clone());

    for key in ["serieslist.json", "Lincoln Cents.csv", "2023-13-01/Lincoln Cents.csv"] {
        let err = orchestrator.ingest(BUCKET, key).await.unwrap_err();
        assert!(
            matches!(err, PricingError::InvalidSourceKey { .. }),
            "{key}: {err:?}"
        );
    }

    assert_eq!(objects.get_calls(), 0);
    assert!(prices.is_empty());
}

#[tokio::test]
async fn test_duplicate_grade_keeps_last_price() {
    init_tracing();
    let objects = Arc::new(FakeObjectStore::new());
    objects.put(
        BUCKET,
        "2023-01-05/Morgan Dollars.csv",
        "name,variety,65,65\n1881-S,,10,20\n",
    );
    let prices = Arc::new(MemoryPriceStore::new());

    orchestrator(&objects, prices.clone())
        .ingest(BUCKET, "2023-01-05/Morgan Dollars.csv")
        .await
        .unwrap();

    let record = prices.get(TABLE, "Morgan Dollars|1881-S", "2023-01-05").unwrap();
    assert_eq!(record.prices, r#"{"65":20}"#);
}

#[tokio::test]
async fn test_malformed_rows_are_reported_and_skipped() {
    init_tracing();
    let objects = Arc::new(FakeObjectStore::new());
    objects.put(
        BUCKET,
        LINCOLN_KEY,
        "name,variety,65\r\n1909,,10\r\n1910,,n/a\r\n1911,,\r\n\r\n1912,,40\r\n",
    );
    let prices = Arc::new(MemoryPriceStore::new());

    let summary = orchestrator(&objects, prices.clone())
        .ingest(BUCKET, LINCOLN_KEY)
        .await
        .unwrap();

    assert_eq!(summary.records_stored, 2);
    assert_eq!(summary.rejected_rows.len(), 2);
    assert!(summary
        .rejected_rows
        .iter()
        .all(|e| matches!(e, PricingError::MalformedRecord { .. })));
    match &summary.rejected_rows[0] {
        PricingError::MalformedRecord {
            line, name, variety, ..
        } => {
            assert_eq!(*line, 3);
            assert_eq!(name, "1910");
            assert_eq!(variety, "");
        },
        other => panic!("expected a malformed record, got {:?}", other),
    }
    assert!(summary.rejected_rows[1].to_string().contains("'1911'"));

    assert!(prices.get(TABLE, "Lincoln Cents|1909", "2023-01-05").is_some());
    assert!(prices.get(TABLE, "Lincoln Cents|1912", "2023-01-05").is_some());
}

#[tokio::test]
async fn test_empty_file_stores_nothing() {
    init_tracing();
    let objects = Arc::new(FakeObjectStore::new());
    objects.put(BUCKET, LINCOLN_KEY, "");
    objects.put(BUCKET, "2023-01-06/Lincoln Cents.csv", "name,variety,65\n");
    let prices = Arc::new(MemoryPriceStore::new());
    let orchestrator = orchestrator(&objects, prices.clone());

    for key in [LINCOLN_KEY, "2023-01-06/Lincoln Cents.csv"] {
        let summary = orchestrator.ingest(BUCKET, key).await.unwrap();
        assert_eq!(summary.records_parsed, 0);
        assert!(summary.is_complete());
    }

    assert!(prices.is_empty());
}

#[tokio::test]
async fn test_concurrent_upserts_store_every_issue() {
    init_tracing();
    let mut sheet = String::from("name,variety,65\n");
    for year in 1900..1940 {
        sheet.push_str(&format!("{},,{}\n", year, year - 1890));
    }

    let objects = Arc::new(FakeObjectStore::new());
    objects.put(BUCKET, LINCOLN_KEY, sheet);
    let prices = Arc::new(FlakyPriceStore::new().failing_key("Lincoln Cents|1925"));

    let summary = IngestionOrchestrator::new(objects.clone(), prices.clone(), TABLE)
        .with_max_concurrency(8)
        .ingest(BUCKET, LINCOLN_KEY)
        .await
        .unwrap();

    assert_eq!(summary.records_parsed, 40);
    assert_eq!(summary.records_stored, 39);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(prices.inner.len(), 39);

    let record = prices.inner.get(TABLE, "Lincoln Cents|1939", "2023-01-05").unwrap();
    assert_eq!(record.prices, r#"{"65":49}"#);
}

#[tokio::test]
async fn test_event_ingests_every_record() {
    init_tracing();
    let objects = lincoln_bucket();
    objects.put(
        BUCKET,
        "2023-01-05/Morgan Dollars.csv",
        "name,variety,65\n1881-S,,120\n",
    );
    let prices = Arc::new(MemoryPriceStore::new());

    let event = S3Event::from_json(
        r#"{"Records": [
            {"s3": {"bucket": {"name": "coin-pricing"}, "object": {"key": "2023-01-05/Lincoln+Cents.csv"}}},
            {"s3": {"bucket": {"name": "coin-pricing"}, "object": {"key": "2023-01-05/Morgan+Dollars.csv"}}}
        ]}"#,
    )
    .unwrap();

    let outcome = orchestrator(&objects, prices.clone())
        .ingest_event(&event)
        .await
        .unwrap();

    assert!(outcome.is_success());
    let summaries = outcome.into_result().unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].series, "Morgan Dollars");
    assert_eq!(prices.len(), 4);
}

#[tokio::test]
async fn test_event_attempts_all_records_before_failing() {
    init_tracing();
    let objects = Arc::new(FakeObjectStore::new());
    objects.put(
        BUCKET,
        "2023-01-05/Morgan Dollars.csv",
        "name,variety,65\n1881-S,,120\n",
    );
    let prices = Arc::new(MemoryPriceStore::new());

    let event = S3Event::from_json(
        r#"{"Records": [
            {"s3": {"bucket": {"name": "coin-pricing"}, "object": {"key": "2023-01-05/Lincoln+Cents.csv"}}},
            {"s3": {"bucket": {"name": "coin-pricing"}, "object": {"key": "2023-01-05/Morgan+Dollars.csv"}}}
        ]}"#,
    )
    .unwrap();

    let outcome = orchestrator(&objects, prices.clone())
        .ingest_event(&event)
        .await
        .unwrap();

    assert!(!outcome.is_success());
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].0.key, LINCOLN_KEY);

    // The stored object still has its summary
    assert_eq!(outcome.ingested.len(), 1);
    assert_eq!(outcome.ingested[0].series, "Morgan Dollars");
    assert_eq!(outcome.ingested[0].records_stored, 1);
    assert!(prices.get(TABLE, "Morgan Dollars|1881-S", "2023-01-05").is_some());

    let err = outcome.into_result().unwrap_err();
    assert!(matches!(err, PricingError::SourceUnavailable { ref key, .. } if key == LINCOLN_KEY));
}

#[tokio::test]
async fn test_event_without_records_is_rejected() {
    init_tracing();
    let objects = lincoln_bucket();
    let prices = Arc::new(MemoryPriceStore::new());
    let event = S3Event::from_json(r#"{"Records": []}"#).unwrap();

    let err = orchestrator(&objects, prices.clone())
        .ingest_event(&event)
        .await
        .unwrap_err();

    assert!(matches!(err, PricingError::InvalidEvent(_)));
    assert!(prices.is_empty());
}
