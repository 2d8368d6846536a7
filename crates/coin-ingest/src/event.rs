//! Object-store notification events
//!
//! Only the bucket name and object key of each record are used:
//!
//! ```json
//! {"Records":[{"s3":{"bucket":{"name":"coin-pricing"},"object":{"key":"2023-01-05/Lincoln+Cents.csv"}}}]}
//! ```
//!
//! Keys arrive form-encoded (`+` for spaces, `%XX` escapes) and are decoded
//! before use.

use coin_common::{PricingError, Result};
use serde::Deserialize;

/// A notification payload
#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

/// Bucket and decoded key of one newly arrived object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
}

impl S3Event {
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload)
            .map_err(|e| PricingError::InvalidEvent(format!("unreadable payload: {}", e)))
    }

    /// Decoded objects in record order
    pub fn source_objects(&self) -> Result<Vec<SourceObject>> {
        if self.records.is_empty() {
            return Err(PricingError::InvalidEvent("event has no records".to_string()));
        }

        self.records
            .iter()
            .map(|record| {
                Ok(SourceObject {
                    bucket: record.s3.bucket.name.clone(),
                    key: decode_object_key(&record.s3.object.key)?,
                })
            })
            .collect()
    }
}

/// Decode a form-encoded object key
pub fn decode_object_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| PricingError::InvalidEvent(format!("object key '{}' is not valid UTF-8: {}", raw, e)))
}
