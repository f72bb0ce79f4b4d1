pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::StorageError;
use crate::model::{IndicatorSample, PricePoint, PurgeStats, Tick};

/// Durable table of ticks plus the derived table of indicator samples.
///
/// All symbols share both tables. Ascending order is `(timestamp, insertion)`
/// and descending order is its exact reverse, so ticks with duplicate
/// timestamps keep their insertion order.
pub trait Storage: Send + Sync {
    /// Insert one tick. No uniqueness constraint on `(symbol, timestamp)`.
    fn append_tick(&self, tick: &Tick) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// Every retained price for `symbol`, oldest first. Empty if unknown.
    fn load_series(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<StorageError>>>;

    /// Insert indicator samples atomically. Undefined values are stored as NULL.
    fn append_indicators(
        &self,
        samples: &[IndicatorSample],
    ) -> BoxFuture<'_, Result<(), Report<StorageError>>>;

    /// Every stored tick for `symbol`, newest first.
    fn query_prices(&self, symbol: &str)
    -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>>;

    /// Ticks for `symbol` at or after `since`, oldest first.
    fn query_prices_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>>;

    /// Newest tick for `symbol`, if any.
    fn latest_tick(&self, symbol: &str)
    -> BoxFuture<'_, Result<Option<Tick>, Report<StorageError>>>;

    /// Every stored indicator sample for `symbol`, newest first.
    fn query_indicators(
        &self,
        symbol: &str,
    ) -> BoxFuture<'_, Result<Vec<IndicatorSample>, Report<StorageError>>>;

    /// Delete ticks and samples with a timestamp strictly before `cutoff`.
    fn purge(
        &self,
        cutoff: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<PurgeStats, Report<StorageError>>>;
}
