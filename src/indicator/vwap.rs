use crate::indicator::{Indicator, defined};

/// Unit-volume VWAP approximation.
///
/// Ticks carry no traded volume, so every tick is weighted 1 and the result
/// is the cumulative mean price. This is NOT exchange VWAP and must not be
/// compared against one.
pub struct UnitVolumeVwap;

impl Indicator for UnitVolumeVwap {
    fn calculate(&self, prices: &[f64]) -> Vec<Option<f64>> {
        let mut cumulative = 0.0;
        prices
            .iter()
            .enumerate()
            .map(|(i, &price)| {
                cumulative += price;
                defined(cumulative / (i + 1) as f64)
            })
            .collect()
    }
}
