/// One OHLC bar. `timestamp_ms` is the bar's open time (epoch ms, UTC).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp_ms: i64,

    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub close_price: f64,
}

impl Candle {
    // A constructor for convenience
    pub fn new(timestamp_ms: i64, open: f64, high: f64, low: f64, close: f64) -> Self {
        Candle {
            timestamp_ms,
            open_price: open,
            high_price: high,
            low_price: low,
            close_price: close,
        }
    }

    /// True when `price` lies inside [low - tolerance, high + tolerance].
    pub fn touches(&self, price: f64, tolerance: f64) -> bool {
        self.low_price - tolerance <= price && price <= self.high_price + tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_is_inclusive_of_wicks() {
        let c = Candle::new(0, 100.0, 105.0, 98.0, 101.0);
        assert!(c.touches(105.0, 0.0));
        assert!(c.touches(98.0, 0.0));
        assert!(!c.touches(105.25, 0.0));
        assert!(c.touches(105.25, 0.25));
    }
}
