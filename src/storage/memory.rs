use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::model::{IndicatorSample, PricePoint, PurgeStats, Tick};
use crate::storage::Storage;

#[derive(Default)]
struct Tables {
    prices: Vec<Tick>,
    indicators: Vec<IndicatorSample>,
}

/// Process-local storage backend. Contents are lost on exit.
///
/// Rows are kept in insertion order; reads apply a stable sort on timestamp,
/// which yields the same `(timestamp, insertion)` order as the SQLite backend.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn ascending<T>(rows: impl Iterator<Item = T>, ts: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(ts);
    rows
}

impl Storage for MemoryStorage {
    fn append_tick(&self, tick: &Tick) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let tick = tick.clone();
        Box::pin(async move {
            self.tables.write().await.prices.push(tick);
            Ok(())
        })
    }

    fn load_series(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let tables = self.tables.read().await;
            let rows = ascending(
                tables.prices.iter().filter(|t| t.symbol == symbol),
                |t| t.timestamp,
            );
            Ok(rows
                .into_iter()
                .map(|t| PricePoint {
                    timestamp: t.timestamp,
                    price: t.price,
                })
                .collect())
        })
    }

    fn append_indicators(
        &self,
        samples: &[IndicatorSample],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
        let samples = samples.to_vec();
        Box::pin(async move {
            self.tables.write().await.indicators.extend(samples);
            Ok(())
        })
    }

    fn query_prices(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut rows = ascending(
                tables.prices.iter().filter(|t| t.symbol == symbol).cloned(),
                |t| t.timestamp,
            );
            rows.reverse();
            Ok(rows)
        })
    }

    fn query_prices_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let tables = self.tables.read().await;
            Ok(ascending(
                tables
                    .prices
                    .iter()
                    .filter(|t| t.symbol == symbol && t.timestamp >= since)
                    .cloned(),
                |t| t.timestamp,
            ))
        })
    }

    fn latest_tick(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Option<Tick>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let tables = self.tables.read().await;
            let rows = ascending(
                tables.prices.iter().filter(|t| t.symbol == symbol),
                |t| t.timestamp,
            );
            Ok(rows.last().map(|&t| t.clone()))
        })
    }

    fn query_indicators(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<IndicatorSample>, Report<StorageError>>> {
        let symbol = symbol.to_string();
        Box::pin(async move {
            let tables = self.tables.read().await;
            let mut rows = ascending(
                tables
                    .indicators
                    .iter()
                    .filter(|s| s.symbol == symbol)
                    .cloned(),
                |s| s.timestamp,
            );
            rows.reverse();
            Ok(rows)
        })
    }

    fn purge(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<PurgeStats, Report<StorageError>>> {
        Box::pin(async move {
            let mut tables = self.tables.write().await;
            let prices_before = tables.prices.len();
            let indicators_before = tables.indicators.len();
            tables.prices.retain(|t| t.timestamp >= cutoff);
            tables.indicators.retain(|s| s.timestamp >= cutoff);
            Ok(PurgeStats {
                ticks: (prices_before - tables.prices.len()) as u64,
                indicators: (indicators_before - tables.indicators.len()) as u64,
            })
        })
    }
}
