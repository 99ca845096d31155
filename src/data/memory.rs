use {
    crate::{
        data::repository::{
            CandleRepository, MetadataRepository, PoiEventRepository, SessionRepository,
            SwingRepository,
        },
        domain::{
            Candle, Lifecycle, NewSession, NewSwing, PeriodId, PoiEvent, PoiEventId, PoiEventKey,
            PriceLevels, ProcessKind, ProcessingMetadata, Session, SessionId, SessionStatus,
            Swing, SwingId,
        },
    },
    anyhow::{Result, anyhow, bail},
    std::collections::{BTreeMap, HashMap},
};

/// In-memory working set for one run. Loaded from and committed to SQLite as a
/// whole, and used directly by tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    candles: HashMap<String, Vec<Candle>>,

    sessions: BTreeMap<SessionId, Session>,
    session_index: HashMap<(String, PeriodId), SessionId>,

    events: BTreeMap<PoiEventId, PoiEvent>,
    event_index: HashMap<PoiEventKey, PoiEventId>,

    swings: BTreeMap<SwingId, Swing>,

    metadata: HashMap<(String, ProcessKind), ProcessingMetadata>,

    next_session_id: SessionId,
    next_event_id: PoiEventId,
    next_swing_id: SwingId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the symbol's series. Sorted by time, duplicate timestamps keep the last bar.
    pub fn load_candles(&mut self, symbol: &str, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp_ms);
        candles.reverse();
        candles.dedup_by_key(|c| c.timestamp_ms);
        candles.reverse();
        self.candles.insert(symbol.to_string(), candles);
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.candles.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }

    // --- Snapshot restore: rows come back with their persisted ids ---

    pub fn restore_session(&mut self, session: Session) {
        self.next_session_id = self.next_session_id.max(session.id);
        self.session_index
            .insert((session.symbol.clone(), session.period), session.id);
        self.sessions.insert(session.id, session);
    }

    pub fn restore_event(&mut self, event: PoiEvent) {
        self.next_event_id = self.next_event_id.max(event.id);
        self.event_index.insert(event.key, event.id);
        self.events.insert(event.id, event);
    }

    pub fn restore_swing(&mut self, swing: Swing) {
        self.next_swing_id = self.next_swing_id.max(swing.id);
        self.swings.insert(swing.id, swing);
    }

    // --- Full-table views for commit and reporting ---

    pub fn all_sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn all_events(&self) -> impl Iterator<Item = &PoiEvent> {
        self.events.values()
    }

    pub fn all_swings(&self) -> impl Iterator<Item = &Swing> {
        self.swings.values()
    }

    pub fn all_metadata(&self) -> impl Iterator<Item = &ProcessingMetadata> {
        self.metadata.values()
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut Session> {
        self.sessions
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Unknown session id {}", id))
    }
}

impl CandleRepository for MemoryStore {
    fn candles(&self, symbol: &str, start: i64, end: i64) -> &[Candle] {
        let all = self.all_candles(symbol);
        let from = all.partition_point(|c| c.timestamp_ms < start);
        let to = all.partition_point(|c| c.timestamp_ms < end).max(from);
        &all[from..to]
    }

    fn all_candles(&self, symbol: &str) -> &[Candle] {
        self.candles
            .get(symbol)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn candle_at(&self, symbol: &str, time: i64) -> Option<&Candle> {
        let all = self.all_candles(symbol);
        all.binary_search_by_key(&time, |c| c.timestamp_ms)
            .ok()
            .map(|i| &all[i])
    }

    fn earliest_time(&self, symbol: &str) -> Option<i64> {
        self.all_candles(symbol).first().map(|c| c.timestamp_ms)
    }

    fn latest_time(&self, symbol: &str) -> Option<i64> {
        self.all_candles(symbol).last().map(|c| c.timestamp_ms)
    }
}

impl SessionRepository for MemoryStore {
    fn insert_session(&mut self, new: NewSession) -> Result<SessionId> {
        let key = (new.symbol.clone(), new.period);
        if self.session_index.contains_key(&key) {
            bail!("Session {} {} already exists", new.symbol, new.period);
        }
        self.next_session_id += 1;
        let id = self.next_session_id;
        let session = Session {
            id,
            symbol: new.symbol,
            period: new.period,
            window_start: new.window.window_start,
            window_end: new.window.window_end,
            true_open_time: new.window.true_open_time,
            true_open_source: new.window.true_open_source,
            levels: None,
            lifecycle: Lifecycle::default(),
            expires_at: new.window.expires_at,
            last_scan_time: None,
            needs_recompute: true,
            last_recompute_time: None,
        };
        self.session_index.insert(key, id);
        self.sessions.insert(id, session);
        Ok(id)
    }

    fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    fn find_session(&self, symbol: &str, period: &PeriodId) -> Option<&Session> {
        self.session_index
            .get(&(symbol.to_string(), *period))
            .and_then(|id| self.sessions.get(id))
    }

    fn update_range(&mut self, id: SessionId, levels: Option<PriceLevels>) -> Result<()> {
        self.session_mut(id)?.levels = levels;
        Ok(())
    }

    fn update_lifecycle(
        &mut self,
        id: SessionId,
        lifecycle: Lifecycle,
        last_scan_time: Option<i64>,
    ) -> Result<()> {
        let session = self.session_mut(id)?;
        session.lifecycle = lifecycle;
        session.last_scan_time = last_scan_time;
        Ok(())
    }

    fn sessions_for_symbol(&self, symbol: &str) -> Vec<&Session> {
        self.sessions
            .values()
            .filter(|s| s.symbol == symbol)
            .collect()
    }

    fn sessions_by_status(&self, symbol: &str, statuses: &[SessionStatus]) -> Vec<&Session> {
        self.sessions
            .values()
            .filter(|s| s.symbol == symbol && statuses.contains(&s.status()))
            .collect()
    }

    fn sessions_needing_recompute(&self, symbol: &str) -> Vec<&Session> {
        self.sessions
            .values()
            .filter(|s| s.symbol == symbol && s.needs_recompute)
            .collect()
    }

    fn mark_for_recompute(&mut self, ids: &[SessionId]) -> usize {
        let mut flipped = 0;
        for id in ids {
            if let Some(session) = self.sessions.get_mut(id) {
                if !session.needs_recompute {
                    session.needs_recompute = true;
                    flipped += 1;
                }
            }
        }
        flipped
    }

    fn clear_recompute(&mut self, id: SessionId, at: i64) -> Result<()> {
        let session = self.session_mut(id)?;
        session.needs_recompute = false;
        session.last_recompute_time = Some(at);
        Ok(())
    }
}

impl PoiEventRepository for MemoryStore {
    fn upsert_event(&mut self, mut event: PoiEvent) -> PoiEventId {
        let id = match self.event_index.get(&event.key) {
            Some(&existing) => existing,
            None => {
                self.next_event_id += 1;
                self.event_index.insert(event.key, self.next_event_id);
                self.next_event_id
            }
        };
        event.id = id;
        self.events.insert(id, event);
        id
    }

    fn find_event(&self, key: &PoiEventKey) -> Option<&PoiEvent> {
        self.event_index.get(key).and_then(|id| self.events.get(id))
    }

    fn events(&self) -> Vec<&PoiEvent> {
        self.events.values().collect()
    }

    fn events_for_session(&self, session_id: SessionId) -> Vec<&PoiEvent> {
        self.events
            .values()
            .filter(|e| {
                e.key.primary_session_id == session_id || e.key.secondary_session_id == session_id
            })
            .collect()
    }

    fn delete_event(&mut self, key: &PoiEventKey) -> bool {
        match self.event_index.remove(key) {
            Some(id) => self.events.remove(&id).is_some(),
            None => false,
        }
    }

    fn delete_events_for_pair(&mut self, primary: SessionId, secondary: SessionId) -> usize {
        let doomed: Vec<PoiEventKey> = self
            .event_index
            .keys()
            .filter(|k| k.primary_session_id == primary && k.secondary_session_id == secondary)
            .copied()
            .collect();
        let mut deleted = 0;
        for key in &doomed {
            if self.delete_event(key) {
                deleted += 1;
            }
        }
        deleted
    }
}

impl SwingRepository for MemoryStore {
    fn delete_swings(&mut self, symbol: &str) -> usize {
        let before = self.swings.len();
        self.swings.retain(|_, s| s.symbol != symbol);
        before - self.swings.len()
    }

    fn insert_swings(&mut self, symbol: &str, batch: Vec<NewSwing>) -> Vec<SwingId> {
        let first_id = self.next_swing_id + 1;
        let ids: Vec<SwingId> = (0..batch.len() as i64).map(|i| first_id + i).collect();
        self.next_swing_id += batch.len() as i64;

        for (new, &id) in batch.into_iter().zip(&ids) {
            let swing = Swing {
                id,
                symbol: symbol.to_string(),
                time: new.time,
                candle_index: new.candle_index,
                price: new.price,
                direction: new.direction,
                class: new.class,
                prior_opposite_swing_id: new.prior_position.and_then(|p| ids.get(p).copied()),
                points_from_prior: new.points_from_prior,
                candles_from_prior: new.candles_from_prior,
                nearest_poi_event_id: new.nearest_poi_event_id,
                candles_from_poi: new.candles_from_poi,
                active_sessions: new.active_sessions,
            };
            self.swings.insert(id, swing);
        }
        ids
    }

    fn swings_for_symbol(&self, symbol: &str) -> Vec<&Swing> {
        let mut swings: Vec<&Swing> = self.swings.values().filter(|s| s.symbol == symbol).collect();
        swings.sort_by_key(|s| (s.time, s.id));
        swings
    }
}

impl MetadataRepository for MemoryStore {
    fn metadata(&self, symbol: &str, process: ProcessKind) -> Option<&ProcessingMetadata> {
        self.metadata.get(&(symbol.to_string(), process))
    }

    fn put_metadata(&mut self, metadata: ProcessingMetadata) {
        self.metadata
            .insert((metadata.symbol.clone(), metadata.process), metadata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, EventType, Level, SessionWindow, TrueOpenSource};

    fn new_session(symbol: &str, year: i32) -> NewSession {
        NewSession {
            symbol: symbol.to_string(),
            period: PeriodId::Year(year),
            window: SessionWindow {
                window_start: 0,
                window_end: 100,
                true_open_time: 120,
                true_open_source: TrueOpenSource::Open,
                expires_at: None,
            },
        }
    }

    #[test]
    fn candle_ranges_are_end_exclusive() {
        let mut store = MemoryStore::new();
        let bars = (0..10).map(|i| Candle::new(i * 10, 1.0, 2.0, 0.5, 1.5)).collect();
        store.load_candles("ES", bars);

        assert_eq!(store.candles("ES", 20, 50).len(), 3);
        assert_eq!(store.count("ES", 0, 1000), 10);
        assert!(store.candle_at("ES", 30).is_some());
        assert!(store.candle_at("ES", 35).is_none());
        assert!(store.candles("NQ", 0, 100).is_empty());
        assert_eq!(store.latest_time("ES"), Some(90));
    }

    #[test]
    fn inverted_range_is_empty() {
        let mut store = MemoryStore::new();
        let bars = (0..5).map(|i| Candle::new(i * 60_000, 1.0, 2.0, 0.5, 1.5)).collect();
        store.load_candles("ES", bars);

        assert!(store.candles("ES", 4 * 60_000, 60_000).is_empty());
        assert!(store.candles("ES", 60_000, 60_000).is_empty());
        assert_eq!(store.count("ES", 4 * 60_000, 0), 0);
    }

    #[test]
    fn session_keys_are_unique_and_recompute_flags_idempotent() {
        let mut store = MemoryStore::new();
        let id = store.insert_session(new_session("ES", 2024)).unwrap();
        assert!(store.insert_session(new_session("ES", 2024)).is_err());

        store.clear_recompute(id, 5).unwrap();
        assert_eq!(store.mark_for_recompute(&[id]), 1);
        assert_eq!(store.mark_for_recompute(&[id]), 0);
        store.clear_recompute(id, 6).unwrap();
        store.clear_recompute(id, 6).unwrap();
        let s = store.session(id).unwrap();
        assert!(!s.needs_recompute);
        assert_eq!(s.last_recompute_time, Some(6));
    }

    #[test]
    fn upsert_keeps_one_row_per_key() {
        let mut store = MemoryStore::new();
        let key = PoiEventKey {
            primary_session_id: 1,
            secondary_session_id: 2,
            level: Level::Poc,
            event_type: EventType::Break,
        };
        let mut event = PoiEvent::pending(key, PeriodId::Year(2024));
        event.primary_time = Some(10);
        let first = store.upsert_event(event.clone());
        event.secondary_time = Some(20);
        let second = store.upsert_event(event);

        assert_eq!(first, second);
        assert_eq!(store.events().len(), 1);
        assert_eq!(store.find_event(&key).unwrap().secondary_time, Some(20));
        assert_eq!(store.delete_events_for_pair(1, 2), 1);
        assert!(store.events().is_empty());
    }

    #[test]
    fn swing_batch_resolves_prior_positions_to_ids() {
        let mut store = MemoryStore::new();
        let swing = |time, direction, prior_position| NewSwing {
            time,
            candle_index: time as usize,
            price: 1.0,
            direction,
            class: 1,
            prior_position,
            points_from_prior: None,
            candles_from_prior: None,
            nearest_poi_event_id: None,
            candles_from_poi: None,
            active_sessions: None,
        };
        let ids = store.insert_swings(
            "ES",
            vec![swing(1, Direction::High, None), swing(2, Direction::Low, Some(0))],
        );
        let stored = store.swings_for_symbol("ES");
        assert_eq!(stored[1].prior_opposite_swing_id, Some(ids[0]));

        assert_eq!(store.delete_swings("ES"), 2);
        let again = store.insert_swings("ES", vec![swing(1, Direction::High, None)]);
        assert!(again[0] > ids[1]);
    }
}
