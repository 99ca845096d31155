//! Storage seams for the engine. The engine is synchronous and only ever talks
//! to these traits; `MemoryStore` implements all of them and `SqliteStorage`
//! moves a `MemoryStore` in and out of the database.

use {
    crate::domain::{
        Candle, Lifecycle, NewSession, NewSwing, PeriodId, PeriodKind, PoiEvent, PoiEventId,
        PoiEventKey, PriceLevels, ProcessKind, ProcessingMetadata, Session, SessionId,
        SessionStatus, SessionWindow, Swing, SwingId,
    },
    anyhow::Result,
};

pub trait CandleRepository {
    /// Candles with `start <= time < end`, ascending.
    fn candles(&self, symbol: &str, start: i64, end: i64) -> &[Candle];
    fn all_candles(&self, symbol: &str) -> &[Candle];
    fn candle_at(&self, symbol: &str, time: i64) -> Option<&Candle>;
    fn earliest_time(&self, symbol: &str) -> Option<i64>;
    fn latest_time(&self, symbol: &str) -> Option<i64>;

    fn count(&self, symbol: &str, start: i64, end: i64) -> usize {
        self.candles(symbol, start, end).len()
    }
}

pub trait SessionRepository {
    /// Fails if a session already exists for `(symbol, period)`.
    fn insert_session(&mut self, new: NewSession) -> Result<SessionId>;
    fn session(&self, id: SessionId) -> Option<&Session>;
    fn find_session(&self, symbol: &str, period: &PeriodId) -> Option<&Session>;
    fn update_range(&mut self, id: SessionId, levels: Option<PriceLevels>) -> Result<()>;
    fn update_lifecycle(
        &mut self,
        id: SessionId,
        lifecycle: Lifecycle,
        last_scan_time: Option<i64>,
    ) -> Result<()>;
    fn sessions_for_symbol(&self, symbol: &str) -> Vec<&Session>;
    fn sessions_by_status(&self, symbol: &str, statuses: &[SessionStatus]) -> Vec<&Session>;
    fn sessions_needing_recompute(&self, symbol: &str) -> Vec<&Session>;
    /// Idempotent. Returns how many flags actually flipped.
    fn mark_for_recompute(&mut self, ids: &[SessionId]) -> usize;
    /// Idempotent. Records `at` as the last recompute time.
    fn clear_recompute(&mut self, id: SessionId, at: i64) -> Result<()>;
}

pub trait PoiEventRepository {
    /// Insert or replace by natural key. An existing row keeps its id.
    fn upsert_event(&mut self, event: PoiEvent) -> PoiEventId;
    fn find_event(&self, key: &PoiEventKey) -> Option<&PoiEvent>;
    fn events(&self) -> Vec<&PoiEvent>;
    fn events_for_session(&self, session_id: SessionId) -> Vec<&PoiEvent>;
    fn delete_event(&mut self, key: &PoiEventKey) -> bool;
    fn delete_events_for_pair(&mut self, primary: SessionId, secondary: SessionId) -> usize;
}

pub trait SwingRepository {
    fn delete_swings(&mut self, symbol: &str) -> usize;
    /// Ids come back in batch order. `prior_position` is resolved against them.
    fn insert_swings(&mut self, symbol: &str, batch: Vec<NewSwing>) -> Vec<SwingId>;
    fn swings_for_symbol(&self, symbol: &str) -> Vec<&Swing>;
}

pub trait MetadataRepository {
    fn metadata(&self, symbol: &str, process: ProcessKind) -> Option<&ProcessingMetadata>;
    fn put_metadata(&mut self, metadata: ProcessingMetadata);
}

/// Everything the engine reads and writes.
pub trait Store:
    CandleRepository + SessionRepository + PoiEventRepository + SwingRepository + MetadataRepository
{
}

impl<T> Store for T where
    T: CandleRepository
        + SessionRepository
        + PoiEventRepository
        + SwingRepository
        + MetadataRepository
{
}

/// Calendar knowledge: where each period's PoC window and true open sit.
pub trait SessionWindowProvider {
    fn window_for(&self, period: &PeriodId) -> Option<SessionWindow>;
    /// Periods of `kind` whose `[window_start, true_open_time]` overlaps `[start, end]`,
    /// in time order.
    fn periods_between(&self, kind: PeriodKind, start: i64, end: i64) -> Vec<PeriodId>;
}
