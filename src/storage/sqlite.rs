use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt};
use futures::future::BoxFuture;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode},
};
use std::path::Path;
use std::str::FromStr;

use crate::error::StorageError;
use crate::model::{
    IndicatorName, IndicatorSample, PricePoint, PurgeStats, Tick, format_timestamp,
};
use crate::storage::Storage;

type TickRow = (String, f64, String);
type SampleRow = (String, String, Option<f64>, String);

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self, Report<StorageError>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .change_context(StorageError::Connection)
                .attach_with(|| format!("cannot create data directory: {}", parent.display()))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .change_context(StorageError::Connection)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(opts)
            .await
            .change_context(StorageError::Connection)
            .attach_with(|| format!("database path: {}", path.display()))?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self, Report<StorageError>> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .change_context(StorageError::Migration)?;

        Ok(Self { pool })
    }
}

impl Storage for SqliteStorage {
    fn append_tick(&self, tick: &Tick) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let tick = tick.clone();
        Box::pin(async move {
            sqlx::query("INSERT INTO prices (symbol, price, timestamp) VALUES (?, ?, ?)")
                .bind(&tick.symbol)
                .bind(tick.price)
                .bind(format_timestamp(&tick.timestamp))
                .execute(&self.pool)
                .await
                .change_context(StorageError::Insert)
                .attach_with(|| format!("symbol: {}", tick.symbol))?;
            Ok(())
        })
    }

    fn load_series(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<(f64, String)> = sqlx::query_as(
                "SELECT price, timestamp FROM prices \
                 WHERE symbol = ? \
                 ORDER BY timestamp ASC, id ASC",
            )
            .bind(&symbol)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter()
                .map(|(price, ts)| {
                    Ok(PricePoint {
                        timestamp: parse_time_utc(&ts)?,
                        price,
                    })
                })
                .collect()
        })
    }

    fn append_indicators(
        &self,
        samples: &[IndicatorSample],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let samples = samples.to_vec();
        Box::pin(async move {
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Insert)?;

            for s in &samples {
                sqlx::query(
                    "INSERT INTO indicators (symbol, indicator, value, timestamp) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(&s.symbol)
                .bind(s.indicator.as_str())
                .bind(s.value)
                .bind(format_timestamp(&s.timestamp))
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Insert)?;
            }

            tx.commit().await.change_context(StorageError::Insert)?;
            Ok(())
        })
    }

    fn query_prices(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<TickRow> = sqlx::query_as(
                "SELECT symbol, price, timestamp FROM prices \
                 WHERE symbol = ? \
                 ORDER BY timestamp DESC, id DESC",
            )
            .bind(&symbol)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_tick_row).collect()
        })
    }

    fn query_prices_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<TickRow> = sqlx::query_as(
                "SELECT symbol, price, timestamp FROM prices \
                 WHERE symbol = ? AND timestamp >= ? \
                 ORDER BY timestamp ASC, id ASC",
            )
            .bind(&symbol)
            .bind(format_timestamp(&since))
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_tick_row).collect()
        })
    }

    fn latest_tick(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<Tick>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let row: Option<TickRow> = sqlx::query_as(
                "SELECT symbol, price, timestamp FROM prices \
                 WHERE symbol = ? \
                 ORDER BY timestamp DESC, id DESC \
                 LIMIT 1",
            )
            .bind(&symbol)
            .fetch_optional(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            row.map(map_tick_row).transpose()
        })
    }

    fn query_indicators(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<IndicatorSample>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let rows: Vec<SampleRow> = sqlx::query_as(
                "SELECT symbol, indicator, value, timestamp FROM indicators \
                 WHERE symbol = ? \
                 ORDER BY timestamp DESC, id DESC",
            )
            .bind(&symbol)
            .fetch_all(&self.pool)
            .await
            .change_context(StorageError::Query)?;

            rows.into_iter().map(map_sample_row).collect()
        })
    }

    fn purge(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<PurgeStats, Report<StorageError>>> {
        Box::pin(async move {
            let cutoff = format_timestamp(&cutoff);
            let mut tx = self
                .pool
                .begin()
                .await
                .change_context(StorageError::Delete)?;

            let ticks = sqlx::query("DELETE FROM prices WHERE timestamp < ?")
                .bind(&cutoff)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Delete)?
                .rows_affected();

            let indicators = sqlx::query("DELETE FROM indicators WHERE timestamp < ?")
                .bind(&cutoff)
                .execute(&mut *tx)
                .await
                .change_context(StorageError::Delete)?
                .rows_affected();

            tx.commit().await.change_context(StorageError::Delete)?;
            Ok(PurgeStats { ticks, indicators })
        })
    }
}

fn map_tick_row((symbol, price, timestamp): TickRow) -> Result<Tick, Report<StorageError>> {
    Ok(Tick {
        symbol,
        price,
        timestamp: parse_time_utc(&timestamp)?,
    })
}

fn map_sample_row(
    (symbol, indicator, value, timestamp): SampleRow,
) -> Result<IndicatorSample, Report<StorageError>> {
    let indicator = IndicatorName::from_str(&indicator).ok_or_else(|| {
        Report::new(StorageError::Query).attach(format!("unknown indicator name: {indicator}"))
    })?;
    Ok(IndicatorSample {
        symbol,
        indicator,
        value,
        timestamp: parse_time_utc(&timestamp)?,
    })
}

fn parse_time_utc(value: &str) -> Result<DateTime<Utc>, Report<StorageError>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .change_context(StorageError::Query)
        .attach_with(|| format!("stored timestamp: {value}"))
}
