use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::ma::Sma;
use crate::indicator::{Indicator, defined};

/// RSI (Relative Strength Index) over simple rolling means of gains and losses.
///
/// The first price has no delta, so the value at index `i` is undefined for
/// `i < period`. A window with no losses divides by zero under IEEE-754 rules
/// and saturates at 100; a window with neither gains nor losses is 0/0 and
/// therefore undefined.
pub struct Rsi {
    period: usize,
    mean: Sma,
}

impl Rsi {
    pub fn new(period: usize) -> Result<Self, Report<IndicatorError>> {
        if period == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "period must be > 0".into(),
            });
        }
        Ok(Self {
            period,
            mean: Sma::new(period)?,
        })
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Rsi {
    fn calculate(&self, prices: &[f64]) -> Vec<Option<f64>> {
        if prices.is_empty() {
            return Vec::new();
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let gains: Vec<f64> = deltas
            .iter()
            .map(|&d| if d > 0.0 { d } else { 0.0 })
            .collect();
        let losses: Vec<f64> = deltas
            .iter()
            .map(|&d| if d < 0.0 { -d } else { 0.0 })
            .collect();

        let avg_gain = self.mean.calculate(&gains);
        let avg_loss = self.mean.calculate(&losses);

        let mut results = Vec::with_capacity(prices.len());
        results.push(None);
        results.extend(
            avg_gain
                .into_iter()
                .zip(avg_loss)
                .map(|(gain, loss)| match (gain, loss) {
                    (Some(g), Some(l)) => rsi_value(g, l),
                    _ => None,
                }),
        );
        results
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rs = avg_gain / avg_loss;
    defined(100.0 - 100.0 / (1.0 + rs))
}
