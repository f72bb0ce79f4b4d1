use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use error_stack::{Report, ResultExt, bail};

use crate::error::QueryError;
use crate::model::{IndicatorSample, Tick};
use crate::storage::Storage;

pub const DEFAULT_HISTORY_DAYS: u32 = 2;

/// Read-only access to stored ticks and indicator samples.
pub struct QueryService {
    storage: Arc<dyn Storage>,
}

/// Normalize an optional `symbol` parameter; absent or blank is an error.
fn require_symbol(symbol: Option<&str>) -> Result<String, Report<QueryError>> {
    match symbol.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_uppercase()),
        _ => Err(Report::new(QueryError::MissingParameter {
            name: "symbol".into(),
        })),
    }
}

impl QueryService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// All stored ticks for the symbol, newest first.
    pub async fn get_prices(&self, symbol: Option<&str>) -> Result<Vec<Tick>, Report<QueryError>> {
        let symbol = require_symbol(symbol)?;
        self.storage
            .query_prices(&symbol)
            .await
            .change_context(QueryError::Storage)
    }

    /// All stored indicator samples for the symbol, newest first.
    pub async fn get_indicators(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<IndicatorSample>, Report<QueryError>> {
        let symbol = require_symbol(symbol)?;
        self.storage
            .query_indicators(&symbol)
            .await
            .change_context(QueryError::Storage)
    }

    /// Newest tick for the symbol, if any.
    pub async fn get_latest(
        &self,
        symbol: Option<&str>,
    ) -> Result<Option<Tick>, Report<QueryError>> {
        let symbol = require_symbol(symbol)?;
        self.storage
            .latest_tick(&symbol)
            .await
            .change_context(QueryError::Storage)
    }

    /// Ticks from the last `days` days before `now`, oldest first.
    pub async fn get_history(
        &self,
        symbol: Option<&str>,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Tick>, Report<QueryError>> {
        let symbol = require_symbol(symbol)?;
        let Some(since) = Duration::try_days(i64::from(days))
            .and_then(|window| now.checked_sub_signed(window))
        else {
            bail!(QueryError::InvalidParameter {
                name: format!("days={days}"),
            });
        };
        self.storage
            .query_prices_since(&symbol, since)
            .await
            .change_context(QueryError::Storage)
            .attach_with(|| format!("history window: {days} days"))
    }
}
