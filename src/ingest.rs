use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use error_stack::{Report, ResultExt, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::indicator::engine::IndicatorEngine;
use crate::indicator::prices;
use crate::model::{IndicatorValues, Tick, serialize_timestamp};
use crate::retention::RetentionPolicy;
use crate::storage::Storage;

/// A validated webhook tick, before it is timestamped and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct TickInput {
    pub symbol: String,
    pub price: f64,
}

#[derive(Deserialize)]
struct RawPayload {
    symbol: Option<Value>,
    price: Option<Value>,
}

impl TickInput {
    /// Parse and validate a webhook body.
    ///
    /// `symbol` must be a non-empty string (trimmed and upper-cased).
    /// `price` may be a JSON number or a numeric string and must be a
    /// positive finite number.
    pub fn parse(body: &[u8]) -> Result<Self, Report<IngestError>> {
        let raw: RawPayload = serde_json::from_slice(body)
            .change_context(invalid("body is not a JSON object"))?;

        let symbol = match raw.symbol {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_uppercase(),
            _ => bail!(invalid("symbol must be a non-empty string")),
        };

        let price = match raw.price {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        let price = match price {
            Some(p) if p.is_finite() && p > 0.0 => p,
            _ => bail!(invalid("price must be a positive finite number")),
        };

        Ok(Self { symbol, price })
    }
}

fn invalid(reason: &str) -> IngestError {
    IngestError::InvalidPayload {
        reason: reason.into(),
    }
}

/// Indicator values computed for the tick that was just stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub price: f64,
    #[serde(flatten)]
    pub values: IndicatorValues,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The symbol had no earlier history; indicator samples were still stored.
    SavedPriceOnly,
    Snapshot(IndicatorSnapshot),
}

/// Webhook intake: append, purge, recompute over the full retained series,
/// persist one sample per indicator.
///
/// Requests for the same symbol are serialized and timestamps never go
/// backwards within a symbol, so each stored sample is computed from a
/// series ending at the tick that triggered it. Different symbols proceed
/// concurrently.
pub struct IngestService {
    storage: Arc<dyn Storage>,
    retention: RetentionPolicy,
    engine: IndicatorEngine,
    // Never pruned; one entry per symbol ever seen (bounded symbol universe).
    symbol_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IngestService {
    pub fn new(
        storage: Arc<dyn Storage>,
        retention: RetentionPolicy,
        engine: IndicatorEngine,
    ) -> Self {
        Self {
            storage,
            retention,
            engine,
            symbol_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn ingest(&self, input: TickInput) -> Result<IngestOutcome, Report<IngestError>> {
        let lock = self.symbol_lock(&input.symbol).await;
        let _guard = lock.lock().await;
        self.ingest_locked(input, Utc::now()).await
    }

    /// Ingest with an explicit clock reading, used as the tick timestamp and
    /// as the retention reference point.
    pub async fn ingest_at(
        &self,
        input: TickInput,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, Report<IngestError>> {
        let lock = self.symbol_lock(&input.symbol).await;
        let _guard = lock.lock().await;
        self.ingest_locked(input, now).await
    }

    /// Caller holds the symbol's lock.
    async fn ingest_locked(
        &self,
        input: TickInput,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, Report<IngestError>> {
        // A tick is never stamped before the symbol's newest stored tick, so
        // it is always the tail of the series it is computed from.
        let newest = self
            .storage
            .latest_tick(&input.symbol)
            .await
            .change_context(IngestError::Storage)
            .attach_with(|| format!("reading newest tick for {}", input.symbol))?;
        let now = match newest {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        };

        let tick = Tick {
            symbol: input.symbol,
            price: input.price,
            timestamp: now,
        };

        self.storage
            .append_tick(&tick)
            .await
            .change_context(IngestError::Storage)
            .attach_with(|| format!("appending tick for {}", tick.symbol))?;

        // The tick is already durable; a failed purge only delays cleanup.
        if let Err(report) = self.retention.purge(self.storage.as_ref(), now).await {
            warn!(error = ?report, symbol = %tick.symbol, "retention purge failed (continuing)");
        }

        // From here on a failure leaves the appended tick in place.
        let series = self
            .storage
            .load_series(&tick.symbol)
            .await
            .change_context(IngestError::Storage)
            .attach_with(|| format!("loading series for {}", tick.symbol))?;

        let values = self.engine.latest(&prices(&series));
        self.storage
            .append_indicators(&values.to_samples(&tick.symbol, now))
            .await
            .change_context(IngestError::Storage)
            .attach_with(|| format!("persisting indicators for {}", tick.symbol))?;

        debug!(
            symbol = %tick.symbol,
            points = series.len(),
            first = ?series.first().map(|p| p.timestamp),
            rsi_period = self.engine.rsi_period(),
            "indicators recomputed"
        );

        if series.len() < 2 {
            info!(symbol = %tick.symbol, price = tick.price, "first tick stored");
            return Ok(IngestOutcome::SavedPriceOnly);
        }

        info!(
            symbol = %tick.symbol,
            price = tick.price,
            rsi = ?values.rsi,
            "tick ingested"
        );
        Ok(IngestOutcome::Snapshot(IndicatorSnapshot {
            symbol: tick.symbol,
            price: tick.price,
            values,
            timestamp: now,
        }))
    }

    async fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        let mut locks = self.symbol_locks.lock().await;
        Arc::clone(locks.entry(symbol.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::indicator::engine::DEFAULT_RSI_PERIOD;
    use crate::model::{IndicatorName, IndicatorSample, PricePoint, PurgeStats};
    use crate::storage::memory::MemoryStorage;
    use chrono::{Duration, TimeZone};
    use futures::future::BoxFuture;

    const SCENARIO: [f64; 15] = [
        100.0, 101.0, 99.0, 102.0, 105.0, 103.0, 107.0, 110.0, 108.0, 111.0, 109.0, 112.0, 115.0,
        113.0, 116.0,
    ];

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 30, 10, 0, 0).unwrap()
    }

    fn service(storage: Arc<dyn Storage>) -> IngestService {
        IngestService::new(
            storage,
            RetentionPolicy::default(),
            IndicatorEngine::new(DEFAULT_RSI_PERIOD).unwrap(),
        )
    }

    fn input(symbol: &str, price: f64) -> TickInput {
        TickInput {
            symbol: symbol.into(),
            price,
        }
    }

    fn is_invalid(result: Result<TickInput, Report<IngestError>>) -> bool {
        matches!(
            result.as_ref().map_err(|r| r.current_context()),
            Err(IngestError::InvalidPayload { .. })
        )
    }

    #[test]
    fn parse_accepts_number_and_numeric_string() {
        let a = TickInput::parse(br#"{"symbol":"tasi","price":100}"#).unwrap();
        assert_eq!(a, input("TASI", 100.0));

        let b = TickInput::parse(br#"{"symbol":" 2222.SR ","price":"31.5"}"#).unwrap();
        assert_eq!(b, input("2222.SR", 31.5));
    }

    #[test]
    fn parse_rejects_bad_payloads() {
        assert!(is_invalid(TickInput::parse(b"not json")));
        assert!(is_invalid(TickInput::parse(br#"{"price":1}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"","price":1}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":7,"price":1}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"TASI"}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"TASI","price":0}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"TASI","price":-5}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"TASI","price":"abc"}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"TASI","price":"NaN"}"#)));
        assert!(is_invalid(TickInput::parse(br#"{"symbol":"TASI","price":"inf"}"#)));
    }

    #[tokio::test]
    async fn first_tick_is_saved_price_only_but_samples_are_stored() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(storage.clone());

        let outcome = svc.ingest_at(input("TASI", 100.0), t0()).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::SavedPriceOnly));

        let samples = storage.query_indicators("TASI").await.unwrap();
        assert_eq!(samples.len(), 6);
        let rsi = samples
            .iter()
            .find(|s| s.indicator == IndicatorName::Rsi)
            .unwrap();
        assert_eq!(rsi.value, None);
    }

    #[tokio::test]
    async fn every_tick_yields_six_samples_and_rsi_on_fifteenth() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(storage.clone());

        let mut last = None;
        for (i, &price) in SCENARIO.iter().enumerate() {
            let now = t0() + Duration::minutes(i as i64);
            last = Some(svc.ingest_at(input("TASI", price), now).await.unwrap());
        }

        let snapshot = match last.unwrap() {
            IngestOutcome::Snapshot(s) => s,
            other => panic!("expected snapshot, got {other:?}"),
        };
        let rsi = snapshot.values.rsi.expect("RSI defined on 15th tick");
        assert!(rsi.is_finite() && (0.0..=100.0).contains(&rsi));
        assert_eq!(snapshot.price, 116.0);

        let samples = storage.query_indicators("TASI").await.unwrap();
        assert_eq!(samples.len(), SCENARIO.len() * 6);
    }

    #[tokio::test]
    async fn ingestion_purges_expired_rows() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(storage.clone());

        svc.ingest_at(input("TASI", 100.0), t0()).await.unwrap();
        svc.ingest_at(input("TASI", 101.0), t0() + Duration::days(8))
            .await
            .unwrap();

        let ticks = storage.query_prices("TASI").await.unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].price, 101.0);
        let samples = storage.query_indicators("TASI").await.unwrap();
        assert_eq!(samples.len(), 6);
    }

    #[tokio::test]
    async fn symbols_do_not_share_history() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(storage.clone());

        svc.ingest_at(input("TASI", 100.0), t0()).await.unwrap();
        let outcome = svc
            .ingest_at(input("2222.SR", 30.0), t0() + Duration::seconds(1))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::SavedPriceOnly));
    }

    #[tokio::test]
    async fn concurrent_same_symbol_ingestion_is_serialized() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = Arc::new(service(storage.clone()));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move {
                    svc.ingest_at(input("TASI", 100.0 + i as f64), t0())
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut first_ticks = 0;
        for handle in handles {
            if let IngestOutcome::SavedPriceOnly = handle.await.unwrap() {
                first_ticks += 1;
            }
        }

        // Only the request that took the lock first saw an empty history.
        assert_eq!(first_ticks, 1);
        let samples = storage.query_indicators("TASI").await.unwrap();
        assert_eq!(samples.len(), 20 * 6);
    }

    #[tokio::test]
    async fn late_clock_reading_is_stamped_after_newest_tick() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(storage.clone());
        let later = t0() + Duration::microseconds(5);

        svc.ingest_at(input("TASI", 100.0), later).await.unwrap();
        let snapshot = match svc.ingest_at(input("TASI", 200.0), t0()).await.unwrap() {
            IngestOutcome::Snapshot(s) => s,
            other => panic!("expected snapshot, got {other:?}"),
        };

        assert_eq!(snapshot.timestamp, later);
        let series = storage.load_series("TASI").await.unwrap();
        assert_eq!(series.last().map(|p| p.price), Some(200.0));
        // alpha = 0.2 for span 9: 0.2 * 200 + 0.8 * 100
        assert!((snapshot.values.ema9.unwrap() - 120.0).abs() < 1e-9);
        assert_eq!(snapshot.values.vwap, Some(150.0));
    }

    #[tokio::test]
    async fn concurrent_ingestion_with_skewed_clocks_ends_series_at_own_tick() {
        let storage = Arc::new(MemoryStorage::new());
        let svc = Arc::new(service(storage.clone()));

        // Later tasks carry earlier clock readings.
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let svc = Arc::clone(&svc);
                let now = t0() + Duration::microseconds(20 - i);
                tokio::spawn(async move {
                    svc.ingest_at(input("TASI", 100.0 + i as f64), now)
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut snapshots = Vec::new();
        for handle in handles {
            if let IngestOutcome::Snapshot(s) = handle.await.unwrap() {
                snapshots.push(s);
            }
        }
        assert_eq!(snapshots.len(), 19);

        let series = storage.load_series("TASI").await.unwrap();
        assert_eq!(series.len(), 20);
        for snapshot in snapshots {
            let k = series
                .iter()
                .position(|p| p.price == snapshot.price)
                .unwrap();
            let expected_vwap =
                series[..=k].iter().map(|p| p.price).sum::<f64>() / (k + 1) as f64;
            assert!((snapshot.values.vwap.unwrap() - expected_vwap).abs() < 1e-9);
            assert_eq!(snapshot.timestamp, series[k].timestamp);
        }
    }

    /// Storage whose purge always fails, delegating everything else.
    struct FailingPurge(MemoryStorage);

    impl Storage for FailingPurge {
        fn append_tick(&self, tick: &Tick) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
            self.0.append_tick(tick)
        }

        fn load_series(
            &self,
            symbol: &str,
        ) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<StorageError>>> {
            self.0.load_series(symbol)
        }

        fn append_indicators(
            &self,
            samples: &[IndicatorSample],
        ) -> BoxFuture<'_, Result<(), Report<StorageError>>> {
            self.0.append_indicators(samples)
        }

        fn query_prices(
            &self,
            symbol: &str,
        ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>> {
            self.0.query_prices(symbol)
        }

        fn query_prices_since(
            &self,
            symbol: &str,
            since: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Vec<Tick>, Report<StorageError>>> {
            self.0.query_prices_since(symbol, since)
        }

        fn latest_tick(
            &self,
            symbol: &str,
        ) -> BoxFuture<'_, Result<Option<Tick>, Report<StorageError>>> {
            self.0.latest_tick(symbol)
        }

        fn query_indicators(
            &self,
            symbol: &str,
        ) -> BoxFuture<'_, Result<Vec<IndicatorSample>, Report<StorageError>>> {
            self.0.query_indicators(symbol)
        }

        fn purge(
            &self,
            _cutoff: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<PurgeStats, Report<StorageError>>> {
            Box::pin(async { Err(Report::new(StorageError::Delete)) })
        }
    }

    #[tokio::test]
    async fn purge_failure_does_not_fail_ingestion() {
        let storage = Arc::new(FailingPurge(MemoryStorage::new()));
        let svc = service(storage.clone());

        svc.ingest_at(input("TASI", 100.0), t0()).await.unwrap();
        let outcome = svc
            .ingest_at(input("TASI", 101.0), t0() + Duration::seconds(1))
            .await
            .unwrap();
        assert!(matches!(outcome, IngestOutcome::Snapshot(_)));
    }
}
