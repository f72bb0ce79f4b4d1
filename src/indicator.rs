pub mod engine;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod vwap;

use crate::model::PricePoint;

/// A technical analysis indicator over an ascending price series.
///
/// Implementations are pure: the output depends only on the input slice.
pub trait Indicator: Send + Sync {
    /// Calculate one value per input price.
    ///
    /// Entries whose lookback window is not yet satisfied are `None`, as are
    /// points where the formula itself evaluates to NaN.
    fn calculate(&self, prices: &[f64]) -> Vec<Option<f64>>;
}

/// Extract prices from an ascending series.
pub fn prices(series: &[PricePoint]) -> Vec<f64> {
    series.iter().map(|p| p.price).collect()
}

/// Map a NaN produced by floating point arithmetic to an undefined value.
pub(crate) fn defined(value: f64) -> Option<f64> {
    if value.is_nan() { None } else { Some(value) }
}
