//! Materializes sessions for new periods and (re)computes their ranges.

use {
    crate::{
        analysis::RangeCalculator,
        config::{DF, InstrumentPair},
        data::{SessionWindowProvider, Store},
        domain::{Lifecycle, NewSession, PeriodId, PriceLevels, SessionId, TrueOpenSource},
        engine::{AffectedSessions, RunReport, SkipReason},
    },
    anyhow::{Context, Result, anyhow},
};

/// What a range computation did to one session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeOutcome {
    /// Levels computed for the first time or recomputed to the same values.
    Computed(PriceLevels),
    /// Levels moved on a session that had already been scanned. Its lifecycle,
    /// and its partner's, start over.
    Changed {
        levels: PriceLevels,
        events_deleted: usize,
    },
    Skipped(SkipReason),
}

pub struct SessionBuilder<'a, W> {
    windows: &'a W,
    pair: &'a InstrumentPair,
}

impl<'a, W: SessionWindowProvider> SessionBuilder<'a, W> {
    pub fn new(windows: &'a W, pair: &'a InstrumentPair) -> Self {
        Self { windows, pair }
    }

    /// Marks, creates and recomputes. Returns the sessions whose range was
    /// computed in this pass.
    pub fn build<S: Store>(
        &self,
        store: &mut S,
        symbol: &str,
        affected: &AffectedSessions,
        now: i64,
        report: &mut RunReport,
    ) -> Vec<SessionId> {
        store.mark_for_recompute(&affected.to_recalc);
        self.materialize(store, symbol, &affected.new_periods, report);

        let pending: Vec<SessionId> = store
            .sessions_needing_recompute(symbol)
            .iter()
            .map(|s| s.id)
            .collect();

        let mut computed = Vec::with_capacity(pending.len());
        for id in pending {
            match self.recompute(store, id, now) {
                Ok(RangeOutcome::Computed(_)) => {
                    report.ranges_computed += 1;
                    computed.push(id);
                }
                Ok(RangeOutcome::Changed { events_deleted, .. }) => {
                    report.ranges_computed += 1;
                    report.lifecycles_reset += 1;
                    report.events_deleted += events_deleted;
                    computed.push(id);
                }
                Ok(RangeOutcome::Skipped(reason)) => {
                    let unit = store
                        .session(id)
                        .map(|s| s.period.to_string())
                        .unwrap_or_else(|| format!("session {}", id));
                    report.skip(symbol, unit, reason);
                }
                Err(e) => report.fail(format!("{} session {}", symbol, id), &e),
            }
        }
        computed
    }

    /// Inserts a session per period. Duplicates and missing windows are
    /// reported and skipped.
    pub fn materialize<S: Store>(
        &self,
        store: &mut S,
        symbol: &str,
        periods: &[PeriodId],
        report: &mut RunReport,
    ) -> Vec<SessionId> {
        let mut created = Vec::with_capacity(periods.len());
        for period in periods {
            let Some(window) = self.windows.window_for(period) else {
                report.skip(symbol, period, SkipReason::NoWindow);
                continue;
            };
            let new = NewSession {
                symbol: symbol.to_string(),
                period: *period,
                window,
            };
            match store.insert_session(new) {
                Ok(id) => {
                    if DF.log_session_builder {
                        log::info!("Created {} {} as session {}", symbol, period, id);
                    }
                    report.sessions_created += 1;
                    created.push(id);
                }
                Err(e) => report.fail(format!("{} {}", symbol, period), &e),
            }
        }
        created
    }

    /// Computes TO, PoC and RPP for one session from its window. A session whose
    /// true-open candle is missing stays flagged and is retried next run.
    pub fn recompute<S: Store>(&self, store: &mut S, id: SessionId, now: i64) -> Result<RangeOutcome> {
        let session = store
            .session(id)
            .ok_or_else(|| anyhow!("Unknown session id {}", id))?;
        let symbol = session.symbol.clone();
        let period = session.period;
        let previous = session.levels;
        let progressed = session.last_scan_time.is_some() || session.lifecycle != Lifecycle::default();

        let Some(to_candle) = store.candle_at(&symbol, session.true_open_time) else {
            return Ok(RangeOutcome::Skipped(SkipReason::MissingTrueOpenCandle));
        };
        let true_open = match session.true_open_source {
            TrueOpenSource::Open => to_candle.open_price,
            TrueOpenSource::Close => to_candle.close_price,
        };
        let window = store.candles(&symbol, session.window_start, session.window_end);
        let Some(levels) = RangeCalculator::compute_range(window, true_open) else {
            return Ok(RangeOutcome::Skipped(SkipReason::EmptyWindow));
        };

        store
            .update_range(id, Some(levels))
            .with_context(|| format!("Storing range for {} {}", symbol, period))?;
        store.clear_recompute(id, now)?;

        if DF.log_session_builder {
            log::info!(
                "{} {}: TO {:.2} PoC {:.2} RPP {:.2}",
                symbol,
                period,
                levels.true_open,
                levels.poc,
                levels.rpp
            );
        }

        let changed = previous.is_some_and(|p| p != levels) && progressed;
        if !changed {
            return Ok(RangeOutcome::Computed(levels));
        }

        log::warn!(
            "{} {}: range moved after scanning started, resetting the pair",
            symbol,
            period
        );
        let events_deleted = self.reset_pair(store, &symbol, &period)?;
        Ok(RangeOutcome::Changed {
            levels,
            events_deleted,
        })
    }

    /// Resets both lifecycles of a period and drops the pair's events. Returns
    /// how many events were dropped.
    pub fn reset_pair<S: Store>(&self, store: &mut S, symbol: &str, period: &PeriodId) -> Result<usize> {
        let ids = self
            .pair
            .symbols()
            .map(|s| store.find_session(s, period).map(|session| session.id));

        for id in ids.iter().flatten() {
            store.update_lifecycle(*id, Lifecycle::default(), None)?;
        }
        let [Some(p), Some(s)] = ids else {
            return Ok(0);
        };
        let dropped = store.delete_events_for_pair(p, s);
        if DF.log_session_builder {
            log::info!("{} {}: dropped {} events", symbol, period, dropped);
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{
            CalendarWindowProvider, CandleRepository, MemoryStore, PoiEventRepository,
            SessionRepository,
        },
        domain::{Candle, EventType, Level, PoiEvent, PoiEventKey, SessionStatus},
        utils::TimeUtils,
    };
    use chrono::NaiveDate;

    fn weekly_fixture() -> (MemoryStore, CalendarWindowProvider, PeriodId) {
        let windows = CalendarWindowProvider::default();
        let monday = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let period = PeriodId::Week(monday);
        let w = windows.window_for(&period).unwrap();

        let mut store = MemoryStore::new();
        for symbol in ["ES", "NQ"] {
            let bars = (0..=24)
                .map(|h| {
                    let t = w.window_start + h * TimeUtils::MS_IN_H;
                    let high = if h == 5 { 110.0 } else { 101.0 };
                    Candle::new(t, 100.0, high, 99.0, 100.0)
                })
                .collect();
            store.load_candles(symbol, bars);
        }
        (store, windows, period)
    }

    #[test]
    fn new_period_gets_a_range_and_clears_its_flag() {
        let (mut store, windows, period) = weekly_fixture();
        let pair = InstrumentPair::default();
        let builder = SessionBuilder::new(&windows, &pair);
        let mut report = RunReport::default();

        let affected = AffectedSessions {
            new_periods: vec![period],
            ..Default::default()
        };
        let computed = builder.build(&mut store, "ES", &affected, 7, &mut report);

        assert_eq!(computed.len(), 1);
        let s = store.session(computed[0]).unwrap();
        let levels = s.levels.unwrap();
        assert_eq!(levels.poc, 110.0);
        assert_eq!(levels.rpp, 90.0);
        assert!(!s.needs_recompute);
        assert_eq!(s.last_recompute_time, Some(7));
        assert!(report.is_clean());
    }

    #[test]
    fn missing_true_open_candle_leaves_session_incomplete() {
        let (mut store, windows, period) = weekly_fixture();
        let w = windows.window_for(&period).unwrap();
        let trimmed: Vec<Candle> = store
            .candles("ES", 0, w.true_open_time)
            .to_vec();
        store.load_candles("ES", trimmed);

        let pair = InstrumentPair::default();
        let builder = SessionBuilder::new(&windows, &pair);
        let mut report = RunReport::default();
        let affected = AffectedSessions {
            new_periods: vec![period],
            ..Default::default()
        };
        let computed = builder.build(&mut store, "ES", &affected, 0, &mut report);

        assert!(computed.is_empty());
        let s = store.find_session("ES", &period).unwrap();
        assert!(s.levels.is_none());
        assert!(s.needs_recompute);
        assert_eq!(report.skips[0].reason, SkipReason::MissingTrueOpenCandle);
    }

    #[test]
    fn moved_range_resets_both_sides_of_the_pair() {
        let (mut store, windows, period) = weekly_fixture();
        let pair = InstrumentPair::default();
        let builder = SessionBuilder::new(&windows, &pair);
        let mut report = RunReport::default();
        let affected = AffectedSessions {
            new_periods: vec![period],
            ..Default::default()
        };
        let es = builder.build(&mut store, "ES", &affected, 0, &mut report)[0];
        let nq = builder.build(&mut store, "NQ", &affected, 0, &mut report)[0];

        let broken = Lifecycle {
            status: SessionStatus::Break,
            first_break_time: Some(1),
            ..Default::default()
        };
        store.update_lifecycle(es, broken, Some(1)).unwrap();
        store.update_lifecycle(nq, broken, Some(1)).unwrap();
        let key = PoiEventKey {
            primary_session_id: es,
            secondary_session_id: nq,
            level: Level::Poc,
            event_type: EventType::Break,
        };
        store.upsert_event(PoiEvent::pending(key, period));

        // A late bar inside the window pushes the PoC further out.
        let w = windows.window_for(&period).unwrap();
        let mut bars = store.all_candles("ES").to_vec();
        bars.push(Candle::new(w.window_start + 30 * TimeUtils::MS_IN_MIN, 100.0, 120.0, 99.0, 100.0));
        store.load_candles("ES", bars);
        store.mark_for_recompute(&[es]);

        let outcome = builder.recompute(&mut store, es, 1).unwrap();
        assert!(matches!(
            outcome,
            RangeOutcome::Changed { levels, events_deleted: 1 } if levels.poc == 120.0
        ));
        assert_eq!(store.session(es).unwrap().status(), SessionStatus::Unbroken);
        assert_eq!(store.session(nq).unwrap().status(), SessionStatus::Unbroken);
        assert!(store.session(nq).unwrap().last_scan_time.is_none());
        assert!(store.events().is_empty());
    }
}
