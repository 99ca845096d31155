use {
    crate::domain::{Level, PeriodId, SessionId},
    chrono::NaiveDate,
    strum_macros::{Display, EnumString},
};

pub type PoiEventId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    Break,
    Return,
    SecondBreak,
    Resolution,
}

/// Which instrument of the pair an observation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Leader {
    Primary,
    Secondary,
    Simultaneous,
}

/// Natural key: one event per (session pair, level, event type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoiEventKey {
    pub primary_session_id: SessionId,
    pub secondary_session_id: SessionId,
    pub level: Level,
    pub event_type: EventType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoiEvent {
    pub id: PoiEventId,
    pub key: PoiEventKey,
    pub period: PeriodId,
    /// Trading day of the earliest recorded touch.
    pub trading_day: Option<NaiveDate>,
    pub primary_time: Option<i64>,
    pub secondary_time: Option<i64>,
    pub time_delta_minutes: Option<i64>,
    pub leader: Option<Leader>,
}

impl PoiEvent {
    /// A not-yet-persisted event; the repository assigns `id` on first upsert.
    pub fn pending(key: PoiEventKey, period: PeriodId) -> Self {
        Self {
            id: 0,
            key,
            period,
            trading_day: None,
            primary_time: None,
            secondary_time: None,
            time_delta_minutes: None,
            leader: None,
        }
    }

    pub fn time_for(&self, role: Role) -> Option<i64> {
        match role {
            Role::Primary => self.primary_time,
            Role::Secondary => self.secondary_time,
        }
    }

    pub fn set_time(&mut self, role: Role, time: i64) {
        match role {
            Role::Primary => self.primary_time = Some(time),
            Role::Secondary => self.secondary_time = Some(time),
        }
    }

    pub fn first_touch_time(&self) -> Option<i64> {
        match (self.primary_time, self.secondary_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}
