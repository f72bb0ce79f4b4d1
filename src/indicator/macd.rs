use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Ema;

/// MACD line and signal line at a single index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
}

pub struct Macd {
    fast: Ema,
    slow: Ema,
    signal: Ema,
}

impl Macd {
    pub fn new(
        fast_period: usize,
        slow_period: usize,
        signal_period: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_period == 0 || slow_period == 0 || signal_period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all periods must be > 0".into(),
            });
        }
        if fast_period >= slow_period {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_period must be < slow_period".into(),
            });
        }
        Ok(Self {
            fast: Ema::new(fast_period)?,
            slow: Ema::new(slow_period)?,
            signal: Ema::new(signal_period)?,
        })
    }

    /// Calculate (macd_line, signal_line) for every input point.
    ///
    /// Both EMAs are seeded by the first price, so every index is defined and
    /// `macd[i] == fast[i] - slow[i]` holds exactly.
    pub fn calculate_full(&self, prices: &[f64]) -> Vec<MacdPoint> {
        let fast_ema = self.fast.calculate_prices(prices);
        let slow_ema = self.slow.calculate_prices(prices);

        let macd_line: Vec<f64> = fast_ema
            .iter()
            .zip(slow_ema.iter())
            .map(|(f, s)| f - s)
            .collect();
        let signal_line = self.signal.calculate_prices(&macd_line);

        macd_line
            .into_iter()
            .zip(signal_line)
            .map(|(macd, signal)| MacdPoint { macd, signal })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + i as f64 + if i % 3 == 0 { -1.5 } else { 0.5 })
            .collect()
    }

    #[test]
    fn macd_invalid_fast_ge_slow() {
        assert!(Macd::new(26, 12, 9).is_err());
    }

    #[test]
    fn macd_period_zero_invalid() {
        assert!(Macd::new(0, 26, 9).is_err());
    }

    #[test]
    fn macd_flat_prices_returns_zero() {
        let macd = Macd::new(12, 26, 9).unwrap();
        for p in macd.calculate_full(&[10.0_f64; 10]) {
            assert!(p.macd.abs() < 1e-9, "expected 0 for flat prices, got {}", p.macd);
            assert!(p.signal.abs() < 1e-9);
        }
    }

    #[test]
    fn macd_equals_fast_minus_slow_at_every_index() {
        let prices = trending(40);
        let fast = Ema::new(12).unwrap().calculate_prices(&prices);
        let slow = Ema::new(26).unwrap().calculate_prices(&prices);
        let points = Macd::new(12, 26, 9).unwrap().calculate_full(&prices);

        assert_eq!(points.len(), prices.len());
        for (i, p) in points.iter().enumerate() {
            assert_eq!(p.macd, fast[i] - slow[i]);
        }
    }

    #[test]
    fn signal_is_ema9_of_macd_line() {
        let prices = trending(30);
        let points = Macd::new(12, 26, 9).unwrap().calculate_full(&prices);
        let line: Vec<f64> = points.iter().map(|p| p.macd).collect();
        let expected = Ema::new(9).unwrap().calculate_prices(&line);
        let signal: Vec<f64> = points.iter().map(|p| p.signal).collect();
        assert_eq!(signal, expected);
    }

    #[test]
    fn macd_single_point_is_zero() {
        let macd = Macd::new(12, 26, 9).unwrap();
        assert_eq!(
            macd.calculate_full(&[42.0]),
            vec![MacdPoint {
                macd: 0.0,
                signal: 0.0
            }]
        );
    }
}
