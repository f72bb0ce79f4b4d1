use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::{Indicator, defined};
use crate::indicator::ma::Ema;
use crate::indicator::macd::Macd;
use crate::indicator::rsi::Rsi;
use crate::indicator::vwap::UnitVolumeVwap;
use crate::model::IndicatorValues;

pub const DEFAULT_RSI_PERIOD: usize = 14;

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Full per-index output of every persisted indicator for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub rsi: Vec<Option<f64>>,
    pub ema9: Vec<Option<f64>>,
    pub ema21: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub vwap: Vec<Option<f64>>,
}

impl IndicatorSeries {
    /// Values at index `i`, or all-undefined when out of range.
    pub fn at(&self, i: usize) -> IndicatorValues {
        let pick = |v: &[Option<f64>]| v.get(i).copied().flatten();
        IndicatorValues {
            rsi: pick(&self.rsi),
            ema9: pick(&self.ema9),
            ema21: pick(&self.ema21),
            macd: pick(&self.macd),
            macd_signal: pick(&self.macd_signal),
            vwap: pick(&self.vwap),
        }
    }
}

/// Stateless bundle of the indicators recomputed on every accepted tick.
///
/// Holds only parameters; every call recomputes from the slice it is given.
pub struct IndicatorEngine {
    rsi: Rsi,
    ema9: Ema,
    ema21: Ema,
    macd: Macd,
    vwap: UnitVolumeVwap,
}

impl IndicatorEngine {
    pub fn new(rsi_period: usize) -> Result<Self, Report<IndicatorError>> {
        Ok(Self {
            rsi: Rsi::new(rsi_period)?,
            ema9: Ema::new(9)?,
            ema21: Ema::new(21)?,
            macd: Macd::new(MACD_FAST, MACD_SLOW, MACD_SIGNAL)?,
            vwap: UnitVolumeVwap,
        })
    }

    pub fn rsi_period(&self) -> usize {
        self.rsi.period()
    }

    /// Compute every indicator at every index of an ascending price series.
    pub fn compute(&self, prices: &[f64]) -> IndicatorSeries {
        let macd = self.macd.calculate_full(prices);
        IndicatorSeries {
            rsi: self.rsi.calculate(prices),
            ema9: self.ema9.calculate(prices),
            ema21: self.ema21.calculate(prices),
            macd: macd.iter().map(|p| defined(p.macd)).collect(),
            macd_signal: macd.iter().map(|p| defined(p.signal)).collect(),
            vwap: self.vwap.calculate(prices),
        }
    }

    /// Values at the last point of the series; the ones that get persisted.
    pub fn latest(&self, prices: &[f64]) -> IndicatorValues {
        match prices.len() {
            0 => IndicatorValues::default(),
            n => self.compute(prices).at(n - 1),
        }
    }
}
