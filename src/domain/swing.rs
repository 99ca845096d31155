use {
    crate::domain::PoiEventId,
    strum_macros::{Display, EnumString},
};

pub type SwingId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::High => Direction::Low,
            Direction::Low => Direction::High,
        }
    }
}

/// A persisted swing.
#[derive(Debug, Clone, PartialEq)]
pub struct Swing {
    pub id: SwingId,
    pub symbol: String,
    pub time: i64,
    pub candle_index: usize,
    pub price: f64,
    pub direction: Direction,
    pub class: u8,
    pub prior_opposite_swing_id: Option<SwingId>,
    pub points_from_prior: Option<f64>,
    pub candles_from_prior: Option<usize>,
    pub nearest_poi_event_id: Option<PoiEventId>,
    pub candles_from_poi: Option<i64>,
    /// JSON array of `{period, status}` for the symbol's sessions live at `time`.
    pub active_sessions: Option<String>,
}

/// Insert form. `prior_position` indexes into the same insert batch and is
/// resolved to a `SwingId` by the repository.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSwing {
    pub time: i64,
    pub candle_index: usize,
    pub price: f64,
    pub direction: Direction,
    pub class: u8,
    pub prior_position: Option<usize>,
    pub points_from_prior: Option<f64>,
    pub candles_from_prior: Option<usize>,
    pub nearest_poi_event_id: Option<PoiEventId>,
    pub candles_from_poi: Option<i64>,
    pub active_sessions: Option<String>,
}
