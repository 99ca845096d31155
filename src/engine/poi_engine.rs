//! Scans both sessions of a period pair and writes the shared POI events.
//!
//! A pair is staged in full before anything is written: both lifecycles are
//! advanced on copies, and only then are events upserted and lifecycles
//! stored. A failure part-way leaves the pair as it was.

use {
    crate::{
        analysis::{EchoChamber, SessionStateMachine, Transition},
        config::{AnalysisConfig, DF, InstrumentPair},
        data::Store,
        domain::{Lifecycle, PeriodId, PoiEvent, PoiEventKey, Role, Session, SessionId},
        engine::{RunMode, RunReport, SkipReason},
        utils::{TimeUtils, epoch_ms_to_utc},
    },
    anyhow::Result,
    chrono::FixedOffset,
};

/// One side of a staged pair.
#[derive(Debug, Clone)]
struct StagedSide {
    session_id: SessionId,
    lifecycle: Lifecycle,
    last_scan_time: Option<i64>,
    candles_scanned: usize,
    transitions: Vec<Transition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Scanned {
        transitions: usize,
        events_deleted: usize,
    },
    /// Both sides already resolved, or neither side has candles past its
    /// cursor (an expired session ends up here).
    Settled,
    Skipped(SkipReason),
}

pub struct PoiEventEngine<'a> {
    pair: &'a InstrumentPair,
    config: &'a AnalysisConfig,
    offset: FixedOffset,
}

impl<'a> PoiEventEngine<'a> {
    pub fn new(pair: &'a InstrumentPair, config: &'a AnalysisConfig) -> Self {
        Self {
            pair,
            config,
            offset: TimeUtils::exchange_offset(config.exchange_utc_offset_hours),
        }
    }

    /// Scans every period in order, recording skips and failures on the report.
    pub fn scan_all<S: Store>(
        &self,
        store: &mut S,
        periods: &[PeriodId],
        mode: RunMode,
        report: &mut RunReport,
    ) {
        for period in periods {
            match self.scan_pair(store, period, mode) {
                Ok(PairOutcome::Scanned {
                    transitions,
                    events_deleted,
                }) => {
                    report.pairs_scanned += 1;
                    report.transitions += transitions;
                    report.events_deleted += events_deleted;
                }
                Ok(PairOutcome::Settled) => {}
                Ok(PairOutcome::Skipped(reason)) => {
                    report.skip(&self.pair.primary, period, reason);
                }
                Err(e) => report.fail(format!("pair {}", period), &e),
            }
        }
    }

    pub fn scan_pair<S: Store>(
        &self,
        store: &mut S,
        period: &PeriodId,
        mode: RunMode,
    ) -> Result<PairOutcome> {
        let (Some(primary), Some(secondary)) = (
            store.find_session(&self.pair.primary, period),
            store.find_session(&self.pair.secondary, period),
        ) else {
            return Ok(PairOutcome::Skipped(SkipReason::MissingPartner));
        };
        if primary.levels.is_none() || secondary.levels.is_none() {
            return Ok(PairOutcome::Skipped(SkipReason::RangeNotComputed));
        }
        if mode == RunMode::Incremental && !primary.status().is_active() && !secondary.status().is_active() {
            return Ok(PairOutcome::Settled);
        }

        let staged = [
            self.stage(store, primary, mode),
            self.stage(store, secondary, mode),
        ];
        let (primary_id, secondary_id) = (primary.id, secondary.id);
        if mode == RunMode::Incremental && staged.iter().all(|side| side.candles_scanned == 0) {
            return Ok(PairOutcome::Settled);
        }

        // Staging is done; from here on the store is written.
        let events_deleted = match mode {
            RunMode::Full => store.delete_events_for_pair(primary_id, secondary_id),
            RunMode::Incremental => 0,
        };

        let mut transitions = 0;
        for (side, role) in staged.iter().zip([Role::Primary, Role::Secondary]) {
            for t in &side.transitions {
                let key = PoiEventKey {
                    primary_session_id: primary_id,
                    secondary_session_id: secondary_id,
                    level: t.level,
                    event_type: t.event_type,
                };
                let mut event = store
                    .find_event(&key)
                    .cloned()
                    .unwrap_or_else(|| PoiEvent::pending(key, *period));
                event.set_time(role, t.time);
                EchoChamber::refresh(
                    &mut event,
                    self.config.simultaneous_threshold_ms,
                    &self.offset,
                    self.config.trading_day_roll_hour,
                );
                if DF.log_poi_engine {
                    log::info!(
                        "{} {:?} {} {} at {} (leader {:?})",
                        period,
                        role,
                        t.level,
                        t.event_type,
                        epoch_ms_to_utc(t.time),
                        event.leader
                    );
                }
                store.upsert_event(event);
                transitions += 1;
            }
        }
        for side in staged {
            store.update_lifecycle(side.session_id, side.lifecycle, side.last_scan_time)?;
        }

        Ok(PairOutcome::Scanned {
            transitions,
            events_deleted,
        })
    }

    /// Advances a copy of the session's lifecycle over its unscanned candles.
    fn stage<S: Store>(&self, store: &S, session: &Session, mode: RunMode) -> StagedSide {
        let (mut lifecycle, resume) = match mode {
            RunMode::Full => (Lifecycle::default(), None),
            RunMode::Incremental => (session.lifecycle, session.last_scan_time),
        };
        let from = resume.unwrap_or(session.true_open_time) + 1;
        let latest = store.latest_time(&session.symbol).unwrap_or(i64::MIN);
        let until = session.expires_at.map_or(latest, |e| e.min(latest));

        let candles = if from <= until {
            store.candles(&session.symbol, from, until + 1)
        } else {
            &[]
        };
        let transitions = match session.levels {
            Some(levels) => SessionStateMachine::scan(
                &mut lifecycle,
                candles,
                &levels,
                self.config.touch_tolerance,
            ),
            None => Vec::new(),
        };

        StagedSide {
            session_id: session.id,
            lifecycle,
            last_scan_time: candles.last().map(|c| c.timestamp_ms).or(resume),
            candles_scanned: candles.len(),
            transitions,
        }
    }
}
