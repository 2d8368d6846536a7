//! Keyed price store
//!
//! [`PriceStore::put`] writes one [`StoredPriceRecord`] into a table and
//! overwrites any earlier record with the same `(coin, price_as_of)`.
//!
//! - [`PgPriceStore`]: PostgreSQL via `sqlx`
//! - [`MemoryPriceStore`]: in-process map for dry runs and tests

use async_trait::async_trait;
use coin_common::{PricingError, Result};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::StoredPriceRecord;

pub mod postgres;

pub use postgres::PgPriceStore;

/// Write access to the table of per-issue price snapshots
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Insert or overwrite the record for `(composite_key, as_of)`
    async fn put(&self, table: &str, record: &StoredPriceRecord) -> Result<()>;
}

/// Table identifiers are interpolated into SQL, so only plain identifiers
/// (`[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes) are accepted.
pub fn is_valid_table_name(table: &str) -> bool {
    let mut chars = table.chars();
    let Some(first) = chars.next() else {
        return false;
    };

    table.len() <= 63
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub(crate) fn write_failure(record: &StoredPriceRecord, reason: impl std::fmt::Display) -> PricingError {
    PricingError::StoreWriteFailure {
        composite_key: record.composite_key.clone(),
        as_of: record.as_of.clone(),
        reason: reason.to_string(),
    }
}

type ItemKey = (String, String, String);

/// In-memory price store with the same overwrite semantics as the table
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceStore {
    items: Arc<Mutex<BTreeMap<ItemKey, StoredPriceRecord>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn items(&self) -> MutexGuard<'_, BTreeMap<ItemKey, StoredPriceRecord>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, table: &str, composite_key: &str, as_of: &str) -> Option<StoredPriceRecord> {
        self.items()
            .get(&(table.to_string(), composite_key.to_string(), as_of.to_string()))
            .cloned()
    }

    /// All records of `table`, ordered by key then date
    pub fn records(&self, table: &str) -> Vec<StoredPriceRecord> {
        self.items()
            .iter()
            .filter(|((t, _, _), _)| t == table)
            .map(|(_, record)| record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    /// Number of successful `put` calls, including overwrites
    pub fn writes(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    async fn put(&self, table: &str, record: &StoredPriceRecord) -> Result<()> {
        if !is_valid_table_name(table) {
            return Err(write_failure(record, format!("invalid table name '{}'", table)));
        }

        self.items().insert(
            (
                table.to_string(),
                record.composite_key.clone(),
                record.as_of.clone(),
            ),
            record.clone(),
        );
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        Ok(())
    }
}
