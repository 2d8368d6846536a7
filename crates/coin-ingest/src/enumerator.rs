//! Source key enumeration
//!
//! Walks the whole source bucket page by page for backfill and
//! reconciliation runs.

use coin_common::Result;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::storage::ObjectStore;

/// Control file listing the known series; never a pricing snapshot
pub const SERIES_LIST_KEY: &str = "serieslist.json";

/// Lists candidate source keys in a bucket
pub struct SourceEnumerator {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl SourceEnumerator {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Every key in the bucket except the series list.
    ///
    /// Any listing error yields an empty list so a truncated listing is
    /// never processed. The error is logged; use
    /// [`try_list_source_keys`](Self::try_list_source_keys) to tell an error
    /// apart from an empty bucket.
    pub async fn list_source_keys(&self) -> Vec<String> {
        match self.try_list_source_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                error!(bucket = %self.bucket, error = %e, "Problem reading pricing files, retry later");
                Vec::new()
            },
        }
    }

    /// Like [`list_source_keys`](Self::list_source_keys) but surfaces the error
    #[instrument(skip(self), fields(bucket = %self.bucket))]
    pub async fn try_list_source_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.store.list_page(&self.bucket, token.as_deref()).await?;
            pages += 1;
            debug!(page = pages, keys = page.keys.len(), "Listed page");

            keys.extend(page.keys.into_iter().filter(|key| key != SERIES_LIST_KEY));

            match page.next_token {
                Some(next) if !next.is_empty() => token = Some(next),
                _ => break,
            }
        }

        info!(pages, keys = keys.len(), "Enumerated source keys");
        Ok(keys)
    }
}
