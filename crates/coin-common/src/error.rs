//! Error types for the pricing pipeline

use thiserror::Error;

/// Result type alias for pricing operations
pub type Result<T> = std::result::Result<T, PricingError>;

/// Errors raised while ingesting pricing snapshots.
///
/// `SourceUnavailable` and `InvalidSourceKey` abort a whole ingestion.
/// `MalformedRecord` is scoped to one row and `StoreWriteFailure` to one
/// record; both are collected and logged while sibling work continues.
#[derive(Error, Debug)]
pub enum PricingError {
    #[error("Source unavailable: s3://{bucket}/{key}: {reason}")]
    SourceUnavailable {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Invalid source key '{key}': {reason}")]
    InvalidSourceKey { key: String, reason: String },

    /// `variety` is the raw second column, possibly empty
    #[error("Malformed record at line {line} (name '{name}', variety '{variety}'): {reason}")]
    MalformedRecord {
        line: usize,
        name: String,
        variety: String,
        reason: String,
    },

    #[error("Store write failed for {composite_key} as of {as_of}: {reason}")]
    StoreWriteFailure {
        composite_key: String,
        as_of: String,
        reason: String,
    },

    #[error("Invalid trigger event: {0}")]
    InvalidEvent(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PricingError {
    /// Whether the error aborts the ingestion of a whole source object.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PricingError::MalformedRecord { .. } | PricingError::StoreWriteFailure { .. }
        )
    }
}
