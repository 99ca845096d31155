//! Dataset granularity and the per-granularity policies that hang off it.

use {
    crate::{domain::PeriodKind, utils::TimeUtils},
    serde::{Deserialize, Serialize},
    strum_macros::{Display, EnumIter, EnumString},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Granularity {
    #[strum(serialize = "1m")]
    M1,
    #[strum(serialize = "4h")]
    H4,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwingPolicy {
    /// Drop same-direction, same-price swings with nothing in between.
    pub dedupe_adjacent: bool,
    /// Swings at or above this class only measure movement from a prior
    /// opposite swing that is also at or above it.
    pub movement_class_threshold: u8,
    pub record_candles_from_poi: bool,
    pub record_active_sessions: bool,
}

impl Granularity {
    pub fn interval_ms(self) -> i64 {
        match self {
            Granularity::M1 => TimeUtils::MS_IN_MIN,
            Granularity::H4 => TimeUtils::MS_IN_4_H,
        }
    }

    /// Period kinds that are meaningful at this resolution. A 4h bar cannot
    /// anchor a 90 minute slot.
    pub fn period_kinds(self) -> &'static [PeriodKind] {
        match self {
            Granularity::M1 => &[
                PeriodKind::Yearly,
                PeriodKind::Monthly,
                PeriodKind::Weekly,
                PeriodKind::Major,
                PeriodKind::Minor,
            ],
            Granularity::H4 => &[PeriodKind::Yearly, PeriodKind::Monthly],
        }
    }

    pub fn swing_policy(self) -> SwingPolicy {
        match self {
            Granularity::M1 => SwingPolicy {
                dedupe_adjacent: true,
                movement_class_threshold: 3,
                record_candles_from_poi: true,
                record_active_sessions: false,
            },
            Granularity::H4 => SwingPolicy {
                dedupe_adjacent: false,
                movement_class_threshold: 3,
                record_candles_from_poi: true,
                record_active_sessions: true,
            },
        }
    }

    /// Candles a period window must hold before the period is materialised.
    /// Deliberately low so holiday weeks still qualify.
    pub fn min_candles(self, kind: PeriodKind) -> usize {
        let table = match self {
            Granularity::M1 => &super::ANALYSIS.min_candles_1m,
            Granularity::H4 => &super::ANALYSIS.min_candles_4h,
        };
        match kind {
            PeriodKind::Yearly => table.yearly,
            PeriodKind::Monthly => table.monthly,
            PeriodKind::Weekly => table.weekly,
            PeriodKind::Major => table.major,
            PeriodKind::Minor => table.minor,
        }
    }
}
