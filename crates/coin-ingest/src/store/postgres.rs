//! PostgreSQL-backed price store

use anyhow::{bail, Context, Result as AnyResult};
use async_trait::async_trait;
use coin_common::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::{is_valid_table_name, write_failure, PriceStore};
use crate::models::StoredPriceRecord;

/// Price store writing to a PostgreSQL table with columns
/// `(coin TEXT, price_as_of TEXT, prices TEXT)` keyed on `(coin, price_as_of)`.
#[derive(Clone)]
pub struct PgPriceStore {
    pool: PgPool,
}

impl PgPriceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> AnyResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .context("Failed to connect to the price database")?;

        info!("Price database connection pool established");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create `table` if it does not exist yet
    pub async fn ensure_table(&self, table: &str) -> AnyResult<()> {
        if !is_valid_table_name(table) {
            bail!("Invalid table name '{}'", table);
        }

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                coin TEXT NOT NULL,
                price_as_of TEXT NOT NULL,
                prices TEXT NOT NULL,
                PRIMARY KEY (coin, price_as_of)
            )
            "#
        ))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to create table {}", table))?;

        debug!(table, "Price table ready");
        Ok(())
    }

    /// Read back one stored record
    pub async fn fetch(
        &self,
        table: &str,
        composite_key: &str,
        as_of: &str,
    ) -> AnyResult<Option<StoredPriceRecord>> {
        if !is_valid_table_name(table) {
            bail!("Invalid table name '{}'", table);
        }

        let row: Option<(String, String, String)> = sqlx::query_as(&format!(
            r#"SELECT coin, price_as_of, prices FROM "{table}" WHERE coin = $1 AND price_as_of = $2"#
        ))
        .bind(composite_key)
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch price record")?;

        Ok(row.map(|(composite_key, as_of, prices)| StoredPriceRecord {
            composite_key,
            as_of,
            prices,
        }))
    }
}

#[async_trait]
impl PriceStore for PgPriceStore {
    #[instrument(skip(self, record), fields(coin = %record.composite_key, as_of = %record.as_of))]
    async fn put(&self, table: &str, record: &StoredPriceRecord) -> Result<()> {
        if !is_valid_table_name(table) {
            return Err(write_failure(record, format!("invalid table name '{}'", table)));
        }

        sqlx::query(&format!(
            r#"
            INSERT INTO "{table}" (coin, price_as_of, prices)
            VALUES ($1, $2, $3)
            ON CONFLICT (coin, price_as_of) DO UPDATE SET prices = EXCLUDED.prices
            "#
        ))
        .bind(&record.composite_key)
        .bind(&record.as_of)
        .bind(&record.prices)
        .execute(&self.pool)
        .await
        .map_err(|e| write_failure(record, e))?;

        Ok(())
    }
}
