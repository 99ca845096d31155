//! Incremental scheduling: which sessions a new slice of data touches.

use {
    crate::{
        config::{DF, Granularity},
        data::{SessionWindowProvider, Store},
        domain::{PeriodId, ProcessKind, SessionId, SessionStatus},
        engine::RunMode,
        utils::epoch_ms_to_utc,
    },
    std::fmt,
};

/// Closed interval of candle times that arrived since the last run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRange {
    pub start: i64,
    pub end: i64,
}

impl fmt::Display for DataRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", epoch_ms_to_utc(self.start), epoch_ms_to_utc(self.end))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffectedSessions {
    /// PoC window overlaps the new data, or the range was never computed.
    pub to_recalc: Vec<SessionId>,
    /// Still-active sessions whose true open precedes the end of the new data.
    pub to_scan: Vec<SessionId>,
    /// Computable periods with no session yet.
    pub new_periods: Vec<PeriodId>,
}

pub struct AffectedSessionDetector<'a, W> {
    windows: &'a W,
    granularity: Granularity,
}

impl<'a, W: SessionWindowProvider> AffectedSessionDetector<'a, W> {
    pub fn new(windows: &'a W, granularity: Granularity) -> Self {
        Self {
            windows,
            granularity,
        }
    }

    /// Full mode covers the whole series. Incremental mode starts right after
    /// the last processed candle and yields `None` when nothing is new.
    pub fn new_data_range<S: Store>(
        store: &S,
        symbol: &str,
        process: ProcessKind,
        mode: RunMode,
    ) -> Option<DataRange> {
        let latest = store.latest_time(symbol)?;
        let earliest = store.earliest_time(symbol)?;

        let last_processed = match mode {
            RunMode::Full => None,
            RunMode::Incremental => store
                .metadata(symbol, process)
                .and_then(|m| m.last_processed_time),
        };

        match last_processed {
            Some(last) if last >= latest => None,
            Some(last) => Some(DataRange {
                start: last + 1,
                end: latest,
            }),
            None => Some(DataRange {
                start: earliest,
                end: latest,
            }),
        }
    }

    /// Active sessions with candles past their scan cursor, up to expiry.
    /// Catches cursors moved back by a repair when no new data has arrived.
    pub fn find_lagging<S: Store>(store: &S, symbol: &str) -> Vec<SessionId> {
        let Some(latest) = store.latest_time(symbol) else {
            return Vec::new();
        };
        store
            .sessions_for_symbol(symbol)
            .into_iter()
            .filter(|s| s.levels.is_some() && s.status().is_active())
            .filter(|s| {
                let cursor = s.last_scan_time.unwrap_or(s.true_open_time);
                let until = s.expires_at.map_or(latest, |e| e.min(latest));
                cursor < until && store.count(symbol, cursor + 1, until + 1) > 0
            })
            .map(|s| s.id)
            .collect()
    }

    /// Read-only. Marking and clearing recompute flags is the caller's job.
    pub fn find_affected<S: Store>(
        &self,
        store: &S,
        symbol: &str,
        range: DataRange,
        mode: RunMode,
    ) -> AffectedSessions {
        let sessions = store.sessions_for_symbol(symbol);

        let to_recalc = sessions
            .iter()
            .filter(|s| {
                s.levels.is_none()
                    || (s.window_start <= range.end && s.true_open_time >= range.start)
            })
            .map(|s| s.id)
            .collect();

        // Full mode rescans from scratch, so terminal sessions come back in.
        let scannable = |status: SessionStatus| match mode {
            RunMode::Full => true,
            RunMode::Incremental => status.is_active(),
        };
        let to_scan = sessions
            .iter()
            .filter(|s| scannable(s.status()) && s.true_open_time < range.end)
            .map(|s| s.id)
            .collect();

        let mut new_periods = Vec::new();
        for &kind in self.granularity.period_kinds() {
            let min_candles = self.granularity.min_candles(kind);
            for period in self.windows.periods_between(kind, range.start, range.end) {
                if store.find_session(symbol, &period).is_some() {
                    continue;
                }
                let Some(window) = self.windows.window_for(&period) else {
                    continue;
                };
                if window.true_open_time > range.end {
                    continue;
                }
                let count = store.count(symbol, window.window_start, window.window_end);
                if count >= min_candles {
                    new_periods.push(period);
                } else if DF.log_detector {
                    log::info!(
                        "{} {}: {} candles in window, need {}",
                        symbol,
                        period,
                        count,
                        min_candles
                    );
                }
            }
        }

        let affected = AffectedSessions {
            to_recalc,
            to_scan,
            new_periods,
        };
        if DF.log_detector {
            log::info!(
                "{} [{}]: {} to recalc, {} to scan, {} new periods",
                symbol,
                range,
                affected.to_recalc.len(),
                affected.to_scan.len(),
                affected.new_periods.len()
            );
        }
        affected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{MemoryStore, MetadataRepository, SessionRepository},
        domain::{
            Candle, Lifecycle, NewSession, PeriodKind, PriceLevels, ProcessStatus,
            ProcessingMetadata, SessionWindow, TrueOpenSource,
        },
    };

    /// Periods are whole hours of a synthetic clock: window `[h, h+1)`, TO at `h+1`.
    struct HourlyWindows;

    const H: i64 = 3_600_000;

    impl SessionWindowProvider for HourlyWindows {
        fn window_for(&self, period: &PeriodId) -> Option<SessionWindow> {
            let PeriodId::Year(h) = *period else { return None };
            Some(SessionWindow {
                window_start: h as i64 * H,
                window_end: (h as i64 + 1) * H,
                true_open_time: (h as i64 + 1) * H,
                true_open_source: TrueOpenSource::Open,
                expires_at: None,
            })
        }

        fn periods_between(&self, kind: PeriodKind, start: i64, end: i64) -> Vec<PeriodId> {
            if kind != PeriodKind::Yearly {
                return Vec::new();
            }
            (start / H - 1..=end / H)
                .map(|h| PeriodId::Year(h as i32))
                .filter(|p| {
                    let w = self.window_for(p).unwrap();
                    w.window_start <= end && w.true_open_time >= start
                })
                .collect()
        }
    }

    fn store_with_hours(hours: i64) -> MemoryStore {
        let mut store = MemoryStore::new();
        let bars = (0..hours * 60)
            .map(|m| Candle::new(m * 60_000, 1.0, 1.0, 1.0, 1.0))
            .collect();
        store.load_candles("ES", bars);
        store
    }

    fn add_session(store: &mut MemoryStore, hour: i32, status: SessionStatus) -> SessionId {
        let id = store
            .insert_session(NewSession {
                symbol: "ES".into(),
                period: PeriodId::Year(hour),
                window: HourlyWindows.window_for(&PeriodId::Year(hour)).unwrap(),
            })
            .unwrap();
        store.update_range(id, Some(PriceLevels::from_poc(1.0, 2.0))).unwrap();
        store
            .update_lifecycle(id, Lifecycle { status, ..Default::default() }, None)
            .unwrap();
        id
    }

    #[test]
    fn lagging_sessions_have_candles_past_their_cursor() {
        let mut store = store_with_hours(4);
        let behind = add_session(&mut store, 0, SessionStatus::Return);
        let resolved = add_session(&mut store, 1, SessionStatus::Resolved);
        let current = add_session(&mut store, 2, SessionStatus::Break);
        let latest = 4 * H - 60_000;
        for id in [resolved, current] {
            let lifecycle = store.session(id).unwrap().lifecycle;
            store.update_lifecycle(id, lifecycle, Some(latest)).unwrap();
        }

        let lagging = AffectedSessionDetector::<HourlyWindows>::find_lagging(&store, "ES");
        assert_eq!(lagging, vec![behind]);
    }

    #[test]
    fn new_data_range_resumes_after_last_processed() {
        let mut store = store_with_hours(3);
        let full = AffectedSessionDetector::<HourlyWindows>::new_data_range(
            &store,
            "ES",
            ProcessKind::Sessions,
            RunMode::Incremental,
        );
        assert_eq!(full, Some(DataRange { start: 0, end: 3 * H - 60_000 }));

        store.put_metadata(ProcessingMetadata {
            symbol: "ES".into(),
            process: ProcessKind::Sessions,
            last_processed_time: Some(2 * H),
            records_processed: 0,
            status: ProcessStatus::Completed,
            error_message: None,
            updated_at: 0,
        });
        let tail = AffectedSessionDetector::<HourlyWindows>::new_data_range(
            &store,
            "ES",
            ProcessKind::Sessions,
            RunMode::Incremental,
        );
        assert_eq!(tail.map(|r| r.start), Some(2 * H + 1));

        store.put_metadata(ProcessingMetadata {
            symbol: "ES".into(),
            process: ProcessKind::Sessions,
            last_processed_time: Some(3 * H),
            records_processed: 0,
            status: ProcessStatus::Completed,
            error_message: None,
            updated_at: 0,
        });
        assert!(
            AffectedSessionDetector::<HourlyWindows>::new_data_range(
                &store,
                "ES",
                ProcessKind::Sessions,
                RunMode::Incremental
            )
            .is_none()
        );
    }

    #[test]
    fn classifies_recalc_scan_and_new_periods() {
        let mut store = store_with_hours(6);
        let old = add_session(&mut store, 0, SessionStatus::Resolved);
        let active = add_session(&mut store, 1, SessionStatus::Break);
        let overlapping = add_session(&mut store, 3, SessionStatus::Unbroken);
        let incomplete = store
            .insert_session(NewSession {
                symbol: "ES".into(),
                period: PeriodId::Year(2),
                window: HourlyWindows.window_for(&PeriodId::Year(2)).unwrap(),
            })
            .unwrap();

        let detector = AffectedSessionDetector::new(&HourlyWindows, Granularity::H4);
        let range = DataRange { start: 3 * H + 30 * 60_000, end: 6 * H - 60_000 };
        let affected = detector.find_affected(&store, "ES", range, RunMode::Incremental);

        assert_eq!(affected.to_recalc, vec![overlapping, incomplete]);
        assert!(affected.to_scan.contains(&active));
        assert!(!affected.to_scan.contains(&old));
        // Hour 4 is complete; hour 5's true open (6h) lies beyond the data.
        assert_eq!(affected.new_periods, vec![PeriodId::Year(4)]);

        let full = detector.find_affected(&store, "ES", range, RunMode::Full);
        assert!(full.to_scan.contains(&old));
    }
}
