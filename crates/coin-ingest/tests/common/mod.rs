//! Shared fakes for coin-ingest integration tests
//!
//! - [`FakeObjectStore`]: in-memory bucket with paged listings and injectable failures
//! - [`FlakyPriceStore`]: wraps [`MemoryPriceStore`] and rejects selected writes

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use coin_common::{PricingError, Result};
use coin_ingest::storage::{ListPage, ObjectStore};
use coin_ingest::{MemoryPriceStore, PriceStore, StoredPriceRecord};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const BUCKET: &str = "coin-pricing";
pub const TABLE: &str = "coin_prices";

/// Initialize tracing for tests (idempotent)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("coin_ingest=debug")),
        )
        .with_test_writer()
        .try_init();
}

#[derive(Default)]
pub struct FakeObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    page_size: Option<usize>,
    unreadable: Mutex<HashSet<String>>,
    fail_listing_at_page: Option<usize>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// List at most `page_size` keys per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Listing fails on the given zero-based page
    pub fn failing_listing_at(mut self, page: usize) -> Self {
        self.fail_listing_at_page = Some(page);
        self
    }

    pub fn put(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    /// `get` on this key fails as if the object store were down
    pub fn make_unreadable(&self, key: &str) {
        self.unreadable.lock().unwrap().insert(key.to_string());
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        let unavailable = |reason: &str| PricingError::SourceUnavailable {
            bucket: bucket.to_string(),
            key: key.to_string(),
            reason: reason.to_string(),
        };

        if self.unreadable.lock().unwrap().contains(key) {
            return Err(unavailable("connection reset"));
        }

        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| unavailable("NoSuchKey"))
    }

    async fn list_page(&self, bucket: &str, continuation_token: Option<&str>) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let offset: usize = continuation_token.map(|t| t.parse().unwrap()).unwrap_or(0);
        let page_size = self.page_size.unwrap_or(usize::MAX);
        let page_index = offset / page_size.max(1);

        if self.fail_listing_at_page == Some(page_index) {
            return Err(PricingError::SourceUnavailable {
                bucket: bucket.to_string(),
                key: String::new(),
                reason: "listing throttled".to_string(),
            });
        }

        let keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();

        let end = offset.saturating_add(page_size).min(keys.len());
        let next_token = (end < keys.len()).then(|| end.to_string());

        Ok(ListPage {
            keys: keys[offset.min(end)..end].to_vec(),
            next_token,
        })
    }
}

/// Price store that fails chosen writes and records the rest in memory
#[derive(Default)]
pub struct FlakyPriceStore {
    pub inner: MemoryPriceStore,
    failing_keys: HashSet<String>,
    failing_call: Option<usize>,
    calls: AtomicUsize,
}

impl FlakyPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write for this composite key
    pub fn failing_key(mut self, composite_key: &str) -> Self {
        self.failing_keys.insert(composite_key.to_string());
        self
    }

    /// Reject the n-th `put` call (1-based)
    pub fn failing_call(mut self, n: usize) -> Self {
        self.failing_call = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceStore for FlakyPriceStore {
    async fn put(&self, table: &str, record: &StoredPriceRecord) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if self.failing_call == Some(call) || self.failing_keys.contains(&record.composite_key) {
            return Err(PricingError::StoreWriteFailure {
                composite_key: record.composite_key.clone(),
                as_of: record.as_of.clone(),
                reason: "ProvisionedThroughputExceeded".to_string(),
            });
        }

        self.inner.put(table, record).await
    }
}
