//! Configuration management
//!
//! Resolved once at startup and passed down explicitly; nothing below
//! `main` reads the environment.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::storage::StorageConfig;
use crate::store::is_valid_table_name;

/// Default number of concurrent upserts per ingestion (sequential)
pub const DEFAULT_MAX_CONCURRENCY: usize = 1;

/// Default database URL for local development
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/coin_prices";

/// Default maximum database connections in the pool
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;

/// Ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Target table for price records (`PRICE_TABLE`, falling back to `DYNAMODB_TABLE`)
    pub table: String,
    /// Bucket holding pricing files (`S3_BUCKET`); needed for enumeration
    pub source_bucket: Option<String>,
    /// Upserts in flight per ingestion (`INGEST_MAX_CONCURRENCY`)
    pub max_concurrency: usize,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
}

/// Keyed store connection
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // URL may carry a password
        f.debug_struct("DatabaseConfig")
            .field("url", &"***")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl IngestConfig {
    /// Load `.env`, read the environment and validate
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env()?;
        config.validate()?;

        Ok(config)
    }

    pub fn from_env() -> Result<Self> {
        let table = std::env::var("PRICE_TABLE")
            .or_else(|_| std::env::var("DYNAMODB_TABLE"))
            .context("PRICE_TABLE (or DYNAMODB_TABLE) must be set")?;

        let max_concurrency = match std::env::var("INGEST_MAX_CONCURRENCY") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("INGEST_MAX_CONCURRENCY '{}' is not a number", value))?,
            Err(_) => DEFAULT_MAX_CONCURRENCY,
        };

        Ok(Self {
            table,
            source_bucket: std::env::var("S3_BUCKET").ok().filter(|b| !b.is_empty()),
            max_concurrency,
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
            },
            storage: StorageConfig::from_env(),
        })
    }

    /// Minimal configuration for a table, used by tests and embedding callers
    pub fn for_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            source_bucket: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            },
            storage: StorageConfig::for_aws(crate::storage::config::DEFAULT_REGION),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_table_name(&self.table) {
            bail!(
                "Table name '{}' must match [A-Za-z_][A-Za-z0-9_]* (max 63 chars)",
                self.table
            );
        }

        if self.max_concurrency == 0 {
            bail!("INGEST_MAX_CONCURRENCY must be greater than 0");
        }

        if self.database.max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }

        Ok(())
    }

    /// Source bucket, required for enumeration and backfill
    pub fn require_source_bucket(&self) -> Result<&str> {
        self.source_bucket
            .as_deref()
            .context("S3_BUCKET must be set to enumerate pricing files")
    }
}
