//! Regenerates swings per symbol: classification in parallel, linking and
//! storage sequentially.

use {
    crate::{
        analysis::{SwingClassifier, SwingPoint},
        config::{DF, Granularity, InstrumentPair, SwingPolicy},
        data::Store,
        domain::{NewSwing, PoiEventId, ProcessKind, Role, Session, SessionStatus},
        engine::{RunMode, RunReport, SkipReason},
        trace_time,
    },
    anyhow::{Context, Result},
    itertools::Itertools,
    rayon::prelude::*,
    serde::Serialize,
};

/// One entry of the `active_sessions` snapshot.
#[derive(Debug, Serialize)]
struct ActiveSession {
    period: String,
    status: SessionStatus,
}

pub struct SwingRunner<'a> {
    pair: &'a InstrumentPair,
    granularity: Granularity,
    policy: SwingPolicy,
}

impl<'a> SwingRunner<'a> {
    pub fn new(pair: &'a InstrumentPair, granularity: Granularity) -> Self {
        Self {
            pair,
            granularity,
            policy: granularity.swing_policy(),
        }
    }

    /// Symbols whose swings are stale: everything in full mode, otherwise
    /// those with candles past the last swing run.
    pub fn stale_symbols<S: Store>(&self, store: &S, mode: RunMode) -> Vec<String> {
        self.pair
            .symbols()
            .into_iter()
            .filter(|symbol| match mode {
                RunMode::Full => true,
                RunMode::Incremental => {
                    let done = store
                        .metadata(symbol, ProcessKind::Swings)
                        .and_then(|m| m.last_processed_time);
                    match (store.latest_time(symbol), done) {
                        (Some(latest), Some(done)) => latest > done,
                        (Some(_), None) => true,
                        (None, _) => false,
                    }
                }
            })
            .map(str::to_string)
            .collect()
    }

    /// Deletes and rewrites the swings of every stale symbol. Returns the
    /// symbols that were rewritten; a symbol with too few candles is skipped
    /// and keeps its rows.
    pub fn run<S: Store + Sync>(
        &self,
        store: &mut S,
        mode: RunMode,
        report: &mut RunReport,
    ) -> Vec<String> {
        let symbols = self.stale_symbols(store, mode);

        let classified: Vec<(String, Vec<SwingPoint>)> = {
            trace_time!("Classify swings", 500, {
                let shared: &S = store;
                symbols
                    .par_iter()
                    .map(|symbol| {
                        let points = SwingClassifier::classify(shared.all_candles(symbol), &self.policy);
                        (symbol.clone(), points)
                    })
                    .collect()
            })
        };

        let mut written = Vec::with_capacity(classified.len());
        for (symbol, points) in classified {
            if store.all_candles(&symbol).len() < 3 {
                report.skip(&symbol, "swings", SkipReason::InsufficientCandles);
                continue;
            }
            match self.store_swings(store, &symbol, points) {
                Ok(n) => {
                    report.swings_written += n;
                    written.push(symbol);
                }
                Err(e) => report.fail(format!("{} swings", symbol), &e),
            }
        }
        written
    }

    fn store_swings<S: Store>(&self, store: &mut S, symbol: &str, points: Vec<SwingPoint>) -> Result<usize> {
        let batch = self.link(store, symbol, points)?;
        let removed = store.delete_swings(symbol);
        let ids = store.insert_swings(symbol, batch);
        if DF.log_swings {
            log::info!("{}: replaced {} swings with {}", symbol, removed, ids.len());
        }
        Ok(ids.len())
    }

    /// Attaches POI linkage and the session snapshot to each classified point.
    fn link<S: Store>(&self, store: &S, symbol: &str, points: Vec<SwingPoint>) -> Result<Vec<NewSwing>> {
        let role = if symbol == self.pair.primary {
            Some(Role::Primary)
        } else if symbol == self.pair.secondary {
            Some(Role::Secondary)
        } else {
            None
        };

        // This instrument's own touch times, ascending.
        let touches: Vec<(i64, PoiEventId)> = match role {
            Some(role) if self.policy.record_candles_from_poi => store
                .events()
                .into_iter()
                .filter_map(|e| e.time_for(role).map(|t| (t, e.id)))
                .sorted()
                .collect(),
            _ => Vec::new(),
        };

        let sessions: Vec<&Session> = if self.policy.record_active_sessions {
            store
                .sessions_for_symbol(symbol)
                .into_iter()
                .filter(|s| s.levels.is_some())
                .sorted_by_key(|s| s.true_open_time)
                .collect()
        } else {
            Vec::new()
        };

        let interval = self.granularity.interval_ms();
        points
            .into_iter()
            .map(|p| {
                let nearest = SwingClassifier::nearest_event(&touches, p.time);
                let active_sessions = if self.policy.record_active_sessions {
                    Some(Self::snapshot(&sessions, p.time).with_context(|| {
                        format!("Serializing session snapshot for {} at {}", symbol, p.time)
                    })?)
                } else {
                    None
                };
                Ok(NewSwing {
                    time: p.time,
                    candle_index: p.candle_index,
                    price: p.price,
                    direction: p.direction,
                    class: p.class,
                    prior_position: p.prior,
                    points_from_prior: p.points_from_prior,
                    candles_from_prior: p.candles_from_prior,
                    nearest_poi_event_id: nearest.map(|(_, id)| id),
                    candles_from_poi: nearest.map(|(t, _)| (p.time - t) / interval),
                    active_sessions,
                })
            })
            .collect()
    }

    /// Sessions that had started and were not expired at `time`, with the
    /// status each had at that moment.
    fn snapshot(sessions: &[&Session], time: i64) -> Result<String> {
        let live = sessions
            .iter()
            .take_while(|s| s.true_open_time <= time)
            .filter(|s| !s.is_expired_at(time))
            .map(|s| ActiveSession {
                period: s.period.to_string(),
                status: s.lifecycle.status_at(time),
            })
            .collect_vec();
        Ok(serde_json::to_string(&live)?)
    }
}
