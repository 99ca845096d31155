use crate::domain::{Candle, PriceLevels};

pub struct RangeCalculator;

impl RangeCalculator {
    /// PoC is whichever window extreme lies farther from the true open; ties
    /// go to the low. `None` for an empty window.
    pub fn compute_range(candles: &[Candle], true_open: f64) -> Option<PriceLevels> {
        let first = candles.first()?;
        let (high, low) = candles
            .iter()
            .fold((first.high_price, first.low_price), |(h, l), c| {
                (h.max(c.high_price), l.min(c.low_price))
            });

        let high_variance = (high - true_open).abs();
        let low_variance = (low - true_open).abs();
        let poc = if high_variance > low_variance { high } else { low };

        Some(PriceLevels::from_poc(true_open, poc))
    }
}
