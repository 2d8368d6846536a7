//! Identity derivation
//!
//! Source keys look like `2023-01-05/Lincoln Cents.csv`: the date prefix is
//! the snapshot date and the file stem is the series name.
//!
//! Composite keys join series, issue name and (non-empty) variety with `|`.
//! Backslashes and pipes inside a segment are escaped with a backslash so
//! that distinct triples never collide and keys can be split back apart.
//! Segments without either character come out unchanged.

use chrono::NaiveDate;
use coin_common::{PricingError, Result};

use crate::models::{IssueRecord, AS_OF_FORMAT};

/// Composite key separator
pub const KEY_SEPARATOR: char = '|';

const ESCAPE: char = '\\';

/// Suffix of pricing files
pub const SOURCE_SUFFIX: &str = ".csv";

/// A parsed `<date>/<series>.csv` object key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub key: String,
    pub series_name: String,
    pub as_of: NaiveDate,
}

impl SourceKey {
    pub fn parse(key: &str) -> Result<Self> {
        let invalid = |reason: &str| PricingError::InvalidSourceKey {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let (date_prefix, file_name) = key
            .split_once('/')
            .ok_or_else(|| invalid("expected <YYYY-MM-DD>/<series>.csv"))?;

        if file_name.contains('/') {
            return Err(invalid("expected exactly one '/' between date and series"));
        }

        let as_of = NaiveDate::parse_from_str(date_prefix, AS_OF_FORMAT)
            .map_err(|e| invalid(&format!("date prefix '{}' is not YYYY-MM-DD: {}", date_prefix, e)))?;

        let series_name = file_name
            .strip_suffix(SOURCE_SUFFIX)
            .ok_or_else(|| invalid("series file must end in .csv"))?;

        if series_name.is_empty() {
            return Err(invalid("series name is empty"));
        }

        Ok(Self {
            key: key.to_string(),
            series_name: series_name.to_string(),
            as_of,
        })
    }

    /// `YYYY-MM-DD`
    pub fn as_of_string(&self) -> String {
        self.as_of.format(AS_OF_FORMAT).to_string()
    }
}

/// Snapshot date encoded in a source key
pub fn derive_as_of_date(source_key: &str) -> Result<NaiveDate> {
    SourceKey::parse(source_key).map(|k| k.as_of)
}

/// Stable identity of one (series, name, variety) triple
pub fn derive_composite_key(series_name: &str, issue: &IssueRecord) -> String {
    let mut key = escape_segment(series_name);
    key.push(KEY_SEPARATOR);
    key.push_str(&escape_segment(&issue.name));

    if let Some(variety) = issue.variety() {
        key.push(KEY_SEPARATOR);
        key.push_str(&escape_segment(variety));
    }

    key
}

/// Split a composite key back into its unescaped segments
pub fn split_composite_key(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = key.chars();

    while let Some(c) = chars.next() {
        match c {
            ESCAPE => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            },
            KEY_SEPARATOR => segments.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    segments.push(current);

    segments
}

fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == ESCAPE || c == KEY_SEPARATOR {
            escaped.push(ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
