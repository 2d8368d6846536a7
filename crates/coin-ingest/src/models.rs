//! Pricing data models
//!
//! Parsed rows ([`IssueRecord`]) and the persisted shape ([`StoredPriceRecord`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Date format of `price_as_of` and of source key prefixes
pub const AS_OF_FORMAT: &str = "%Y-%m-%d";

/// One grade/price cell of a pricing row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Coin-condition grade taken from the header column
    pub grade: i32,
    /// Price in the smallest currency unit
    pub price: i64,
}

/// A single coin issue parsed from one row of a pricing file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub name: String,
    /// Empty and absent varieties derive the same composite key
    pub variety: Option<String>,
    /// Observations in column order; duplicate grades are kept
    pub prices: Vec<PriceObservation>,
}

impl IssueRecord {
    pub fn new(name: impl Into<String>, variety: Option<String>) -> Self {
        Self {
            name: name.into(),
            variety,
            prices: Vec::new(),
        }
    }

    /// Variety if present and non-empty
    pub fn variety(&self) -> Option<&str> {
        self.variety.as_deref().filter(|v| !v.is_empty())
    }

    /// Collapse observations into a grade -> price map; a repeated grade
    /// keeps its last price.
    pub fn price_map(&self) -> PriceMap {
        self.prices.iter().map(|p| (p.grade, p.price)).collect()
    }
}

/// Grade -> price, ordered by grade
pub type PriceMap = BTreeMap<i32, i64>;

/// All issues of one series as of one date, sourced from one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSnapshot {
    pub series_name: String,
    pub as_of: NaiveDate,
    pub issues: Vec<IssueRecord>,
}

/// The item written to the keyed price store.
///
/// Field names match the stored columns: `coin`, `price_as_of` and `prices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPriceRecord {
    #[serde(rename = "coin")]
    pub composite_key: String,
    /// `YYYY-MM-DD`
    #[serde(rename = "price_as_of")]
    pub as_of: String,
    /// JSON-encoded grade -> price map, e.g. `{"65":10,"66":20}`
    pub prices: String,
}

impl StoredPriceRecord {
    pub fn new(
        composite_key: String,
        as_of: NaiveDate,
        prices: &PriceMap,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            composite_key,
            as_of: as_of.format(AS_OF_FORMAT).to_string(),
            prices: serde_json::to_string(prices)?,
        })
    }

    /// Decode the stored price map
    pub fn price_map(&self) -> serde_json::Result<PriceMap> {
        serde_json::from_str(&self.prices)
    }
}
