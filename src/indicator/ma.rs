use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{Indicator, defined};

/// Simple Moving Average over a trailing window of `period` values.
pub struct Sma {
    period: usize,
}

impl Sma {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self { period })
    }
}

impl Indicator for Sma {
    fn calculate(&self, prices: &[f64]) -> Vec<Option<f64>> {
        let mut values = vec![None; prices.len().min(self.period - 1)];
        values.extend(
            prices
                .windows(self.period)
                .map(|w| defined(w.iter().sum::<f64>() / self.period as f64)),
        );
        values
    }
}

/// Exponential Moving Average with `alpha = 2 / (span + 1)`.
///
/// Seeded by the first price with no warm-up window, so every point is
/// defined: `ema[0] = p[0]`, `ema[i] = alpha * p[i] + (1 - alpha) * ema[i-1]`.
pub struct Ema {
    span: usize,
}

impl Ema {
    pub fn new(span: usize) -> Result<Self, Report<IndicatorError>> {
        if span == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "span must be > 0".into(),
            });
        }
        Ok(Self { span })
    }

    /// Full EMA series for a price slice (internal helper).
    pub fn calculate_prices(&self, prices: &[f64]) -> Vec<f64> {
        let alpha = 2.0 / (self.span as f64 + 1.0);
        let mut results = Vec::with_capacity(prices.len());
        let mut iter = prices.iter();
        if let Some(&first) = iter.next() {
            let mut ema = first;
            results.push(ema);
            for &price in iter {
                ema = alpha * price + (1.0 - alpha) * ema;
                results.push(ema);
            }
        }
        results
    }
}

impl Indicator for Ema {
    fn calculate(&self, prices: &[f64]) -> Vec<Option<f64>> {
        self.calculate_prices(prices)
            .into_iter()
            .map(defined)
            .collect()
    }
}
