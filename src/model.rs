use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

/// Name of a persisted indicator sample.
///
/// String representations match the `indicators.indicator` column and the
/// webhook response keys (e.g. `"RSI"`, `"MACD_signal"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorName {
    Rsi,
    Ema9,
    Ema21,
    Macd,
    MacdSignal,
    Vwap,
}

impl IndicatorName {
    /// Every indicator persisted per accepted tick, in storage order.
    pub const ALL: [Self; 6] = [
        Self::Rsi,
        Self::Ema9,
        Self::Ema21,
        Self::Macd,
        Self::MacdSignal,
        Self::Vwap,
    ];

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "RSI" => Some(Self::Rsi),
            "EMA9" => Some(Self::Ema9),
            "EMA21" => Some(Self::Ema21),
            "MACD" => Some(Self::Macd),
            "MACD_signal" => Some(Self::MacdSignal),
            "VWAP" => Some(Self::Vwap),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rsi => "RSI",
            Self::Ema9 => "EMA9",
            Self::Ema21 => "EMA21",
            Self::Macd => "MACD",
            Self::MacdSignal => "MACD_signal",
            Self::Vwap => "VWAP",
        }
    }
}

impl fmt::Display for IndicatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for IndicatorName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One observed price for a symbol. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// `(timestamp, price)` pair consumed by the indicator engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// A computed indicator value at the time of the tick that triggered it.
///
/// `value` is `None` when the retained series is too short for the indicator,
/// or when the formula itself is undefined (e.g. RSI over a flat series).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSample {
    pub symbol: String,
    pub indicator: IndicatorName,
    pub value: Option<f64>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// Latest value of each indicator for one series.
///
/// Serializes with the indicator names as keys and `null` for undefined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorValues {
    #[serde(rename = "RSI")]
    pub rsi: Option<f64>,
    #[serde(rename = "EMA9")]
    pub ema9: Option<f64>,
    #[serde(rename = "EMA21")]
    pub ema21: Option<f64>,
    #[serde(rename = "MACD")]
    pub macd: Option<f64>,
    #[serde(rename = "MACD_signal")]
    pub macd_signal: Option<f64>,
    #[serde(rename = "VWAP")]
    pub vwap: Option<f64>,
}

impl IndicatorValues {
    pub fn get(&self, name: IndicatorName) -> Option<f64> {
        match name {
            IndicatorName::Rsi => self.rsi,
            IndicatorName::Ema9 => self.ema9,
            IndicatorName::Ema21 => self.ema21,
            IndicatorName::Macd => self.macd,
            IndicatorName::MacdSignal => self.macd_signal,
            IndicatorName::Vwap => self.vwap,
        }
    }

    /// Expand into one sample per indicator name, undefined values included.
    pub fn to_samples(&self, symbol: &str, timestamp: DateTime<Utc>) -> Vec<IndicatorSample> {
        IndicatorName::ALL
            .iter()
            .map(|&indicator| IndicatorSample {
                symbol: symbol.to_string(),
                indicator,
                value: self.get(indicator),
                timestamp,
            })
            .collect()
    }
}

/// Rows removed by a single retention purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub ticks: u64,
    pub indicators: u64,
}

/// Canonical on-disk and on-wire timestamp form.
///
/// Fixed-width RFC 3339 in UTC so that lexicographic order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn serialize_timestamp<S: Serializer>(
    ts: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn indicator_name_round_trip() {
        for name in IndicatorName::ALL {
            assert_eq!(IndicatorName::from_str(name.as_str()), Some(name));
        }
    }

    #[test]
    fn indicator_name_unknown_returns_none() {
        assert_eq!(IndicatorName::from_str("SMA"), None);
        assert_eq!(IndicatorName::from_str("rsi"), None);
    }

    #[test]
    fn to_samples_keeps_undefined_values() {
        let values = IndicatorValues {
            ema9: Some(100.0),
            ..Default::default()
        };
        let ts = Utc.with_ymd_and_hms(2025, 9, 30, 10, 30, 0).unwrap();
        let samples = values.to_samples("TASI", ts);

        assert_eq!(samples.len(), 6);
        assert_eq!(samples[1].indicator, IndicatorName::Ema9);
        assert_eq!(samples[1].value, Some(100.0));
        assert!(samples.iter().filter(|s| s.value.is_none()).count() == 5);
    }

    #[test]
    fn timestamp_format_is_fixed_width_utc() {
        let a = Utc.with_ymd_and_hms(2025, 9, 30, 10, 30, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        assert_eq!(format_timestamp(&a), "2025-09-30T10:30:00.000000Z");
        assert!(format_timestamp(&a) < format_timestamp(&b));
    }

    #[test]
    fn sample_serializes_null_for_undefined() {
        let sample = IndicatorSample {
            symbol: "TASI".into(),
            indicator: IndicatorName::MacdSignal,
            value: None,
            timestamp: Utc.with_ymd_and_hms(2025, 9, 30, 10, 30, 0).unwrap(),
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["indicator"], "MACD_signal");
        assert!(json["value"].is_null());
        assert_eq!(json["timestamp"], "2025-09-30T10:30:00.000000Z");
    }
}
