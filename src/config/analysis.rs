//! Analysis and computation configuration

use crate::utils::TimeUtils;

/// Minimum candle counts per period kind for one granularity.
#[derive(Clone, Debug)]
pub struct MinCandles {
    pub yearly: usize,
    pub monthly: usize,
    pub weekly: usize,
    pub major: usize,
    pub minor: usize,
}

/// The Master Analysis Configuration
#[derive(Clone, Debug)]
pub struct AnalysisConfig {
    /// Price slack either side of a candle's [low, high] when testing a touch.
    pub touch_tolerance: f64,

    /// Touches closer together than this are reported as simultaneous.
    pub simultaneous_threshold_ms: i64,

    // Calendar anchoring. Fixed offset, no DST.
    pub exchange_utc_offset_hours: i32,
    pub trading_day_roll_hour: u32,

    /// Minor slots stop scanning this long after their true open.
    pub minor_expiry_ms: i64,

    pub min_candles_4h: MinCandles,
    pub min_candles_1m: MinCandles,
}

pub const ANALYSIS: AnalysisConfig = AnalysisConfig {
    touch_tolerance: 0.0,
    simultaneous_threshold_ms: TimeUtils::MS_IN_MIN,

    exchange_utc_offset_hours: -5,
    trading_day_roll_hour: 18,

    minor_expiry_ms: TimeUtils::MS_IN_D,

    // 4h: ~6 bars a day, so 50 bars is a bit over a week of any month.
    min_candles_4h: MinCandles {
        yearly: 50,
        monthly: 50,
        weekly: 3,
        major: 1,
        minor: 1,
    },
    min_candles_1m: MinCandles {
        yearly: 5000,
        monthly: 3000,
        weekly: 600,
        major: 60,
        minor: 15,
    },
};
