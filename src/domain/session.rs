use {
    crate::domain::{PeriodId, PeriodKind},
    serde::Serialize,
    strum_macros::{Display, EnumString},
};

pub type SessionId = i64;

/// Lifecycle status. Ordering follows the only direction normal processing may move.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Display, EnumString, Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Unbroken,
    Break,
    Return,
    Resolved,
}

impl SessionStatus {
    pub fn is_active(self) -> bool {
        self != SessionStatus::Resolved
    }
}

/// A price level tracked by the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
pub enum Level {
    #[strum(serialize = "PoC")]
    Poc,
    #[strum(serialize = "RPP")]
    Rpp,
    #[strum(serialize = "TO")]
    TrueOpen,
}

impl Level {
    /// Touch priority within one candle.
    pub const PRIORITY: [Level; 3] = [Level::Poc, Level::Rpp, Level::TrueOpen];

    pub fn side(self) -> Option<Side> {
        match self {
            Level::Poc => Some(Side::Poc),
            Level::Rpp => Some(Side::Rpp),
            Level::TrueOpen => None,
        }
    }
}

/// Which extreme a break happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Side {
    #[strum(serialize = "PoC")]
    Poc,
    #[strum(serialize = "RPP")]
    Rpp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionType {
    SingleSided,
    DoubleSided,
}

/// Which price of the true-open candle anchors the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TrueOpenSource {
    Open,
    Close,
}

/// What the window provider reports for one period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    pub window_start: i64,
    /// Exclusive end of the PoC window.
    pub window_end: i64,
    pub true_open_time: i64,
    pub true_open_source: TrueOpenSource,
    pub expires_at: Option<i64>,
}

/// True open, PoC and its mirror. `rpp == 2 * true_open - poc` by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceLevels {
    pub true_open: f64,
    pub poc: f64,
    pub rpp: f64,
}

impl PriceLevels {
    pub fn from_poc(true_open: f64, poc: f64) -> Self {
        Self {
            true_open,
            poc,
            rpp: 2.0 * true_open - poc,
        }
    }

    pub fn price(&self, level: Level) -> f64 {
        match level {
            Level::Poc => self.poc,
            Level::Rpp => self.rpp,
            Level::TrueOpen => self.true_open,
        }
    }
}

/// Status and transition timestamps of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    pub status: SessionStatus,
    pub first_break_time: Option<i64>,
    pub first_break_side: Option<Side>,
    pub first_return_time: Option<i64>,
    pub second_break_time: Option<i64>,
    pub second_break_side: Option<Side>,
    pub resolution_time: Option<i64>,
    pub resolution_type: Option<ResolutionType>,
}

impl Lifecycle {
    /// Latest transition timestamp recorded so far.
    pub fn last_transition_time(&self) -> Option<i64> {
        [
            self.resolution_time,
            self.second_break_time,
            self.first_return_time,
            self.first_break_time,
        ]
        .into_iter()
        .flatten()
        .max()
    }

    /// Status the session had at `time`, replayed from the recorded timestamps.
    pub fn status_at(&self, time: i64) -> SessionStatus {
        let reached = |t: Option<i64>| t.is_some_and(|t| t <= time);
        if reached(self.resolution_time) {
            SessionStatus::Resolved
        } else if reached(self.first_return_time) {
            SessionStatus::Return
        } else if reached(self.first_break_time) {
            SessionStatus::Break
        } else {
            SessionStatus::Unbroken
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub symbol: String,
    pub period: PeriodId,
    pub window_start: i64,
    pub window_end: i64,
    pub true_open_time: i64,
    pub true_open_source: TrueOpenSource,
    /// `None` until the range has been computed.
    pub levels: Option<PriceLevels>,
    pub lifecycle: Lifecycle,
    pub expires_at: Option<i64>,
    pub last_scan_time: Option<i64>,
    pub needs_recompute: bool,
    pub last_recompute_time: Option<i64>,
}

impl Session {
    pub fn kind(&self) -> PeriodKind {
        self.period.kind()
    }

    pub fn status(&self) -> SessionStatus {
        self.lifecycle.status
    }

    pub fn is_expired_at(&self, time: i64) -> bool {
        self.expires_at.is_some_and(|e| time > e)
    }
}

/// Insert form of a session. Ids are assigned by the repository.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub symbol: String,
    pub period: PeriodId,
    pub window: SessionWindow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpp_mirrors_poc_across_true_open() {
        let levels = PriceLevels::from_poc(100.0, 110.0);
        assert_eq!(levels.rpp, 90.0);
        assert_eq!(levels.price(Level::TrueOpen), 100.0);
    }

    #[test]
    fn status_at_replays_timestamps() {
        let lc = Lifecycle {
            status: SessionStatus::Return,
            first_break_time: Some(10),
            first_break_side: Some(Side::Poc),
            first_return_time: Some(20),
            ..Default::default()
        };
        assert_eq!(lc.status_at(5), SessionStatus::Unbroken);
        assert_eq!(lc.status_at(10), SessionStatus::Break);
        assert_eq!(lc.status_at(25), SessionStatus::Return);
        assert_eq!(lc.last_transition_time(), Some(20));
    }
}
