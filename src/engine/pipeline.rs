//! One processing run: sessions, then POI events, then swings.

use {
    crate::{
        config::{AnalysisConfig, Granularity, InstrumentPair},
        data::{SessionWindowProvider, Store},
        domain::{PeriodId, ProcessKind, ProcessStatus, ProcessingMetadata, SessionId},
        engine::{
            AffectedSessionDetector, PoiEventEngine, RunMode, RunReport, SessionBuilder,
            SwingRunner,
        },
        trace_time,
        utils::{format_duration, now_timestamp_ms},
    },
    std::collections::BTreeSet,
};

pub struct Pipeline<'a, W> {
    pair: &'a InstrumentPair,
    granularity: Granularity,
    windows: &'a W,
    config: &'a AnalysisConfig,
}

impl<'a, W: SessionWindowProvider> Pipeline<'a, W> {
    pub fn new(
        pair: &'a InstrumentPair,
        granularity: Granularity,
        windows: &'a W,
        config: &'a AnalysisConfig,
    ) -> Self {
        Self {
            pair,
            granularity,
            windows,
            config,
        }
    }

    /// Units that fail are recorded on the report and the run carries on.
    /// `now` stamps recompute and metadata rows.
    pub fn run<S: Store + Sync>(&self, store: &mut S, mode: RunMode, now: i64) -> RunReport {
        log::info!(
            "Starting {} run for {} / {} at {}",
            mode,
            self.pair.primary,
            self.pair.secondary,
            self.granularity
        );
        let started = now_timestamp_ms();
        let mut report = RunReport::default();

        let periods = trace_time!("Sessions", 1_000_000, {
            self.build_sessions(store, mode, now, &mut report)
        });
        self.stamp(store, ProcessKind::Sessions, now, &report);

        let engine = PoiEventEngine::new(self.pair, self.config);
        let periods: Vec<PeriodId> = periods.into_iter().collect();
        trace_time!("POI events", 1_000_000, {
            engine.scan_all(store, &periods, mode, &mut report)
        });
        self.stamp(store, ProcessKind::PoiEvents, now, &report);

        let runner = SwingRunner::new(self.pair, self.granularity);
        let rewritten = trace_time!("Swings", 1_000_000, { runner.run(store, mode, &mut report) });
        for symbol in &rewritten {
            self.stamp_symbol(store, symbol, ProcessKind::Swings, now, &report);
        }

        let elapsed = format_duration(now_timestamp_ms() - started);
        if report.is_clean() {
            log::info!("✅ {} in {}", report, elapsed);
        } else {
            log::warn!("⚠️ {} in {}", report, elapsed);
        }
        report
    }

    /// Creates and recomputes sessions for both symbols, returning the periods
    /// whose pair needs scanning. Incremental runs also pick up sessions whose
    /// cursor trails the data.
    fn build_sessions<S: Store>(
        &self,
        store: &mut S,
        mode: RunMode,
        now: i64,
        report: &mut RunReport,
    ) -> BTreeSet<PeriodId> {
        let detector = AffectedSessionDetector::new(self.windows, self.granularity);
        let builder = SessionBuilder::new(self.windows, self.pair);
        let mut periods = BTreeSet::new();

        for symbol in self.pair.symbols() {
            if mode == RunMode::Incremental {
                let lagging = AffectedSessionDetector::<W>::find_lagging(store, symbol);
                periods.extend(
                    lagging
                        .into_iter()
                        .filter_map(|id| store.session(id).map(|s| s.period)),
                );
            }

            let Some(range) = AffectedSessionDetector::<W>::new_data_range(
                store,
                symbol,
                ProcessKind::Sessions,
                mode,
            ) else {
                log::info!("{}: no new candles", symbol);
                continue;
            };
            log::info!("{}: processing {}", symbol, range);

            let affected = detector.find_affected(store, symbol, range, mode);
            let computed = builder.build(store, symbol, &affected, now, report);

            let touched: Vec<SessionId> = affected.to_scan.iter().chain(&computed).copied().collect();
            periods.extend(
                touched
                    .into_iter()
                    .filter_map(|id| store.session(id).map(|s| s.period)),
            );
        }
        periods
    }

    fn stamp<S: Store>(&self, store: &mut S, process: ProcessKind, now: i64, report: &RunReport) {
        for symbol in self.pair.symbols() {
            self.stamp_symbol(store, symbol, process, now, report);
        }
    }

    fn stamp_symbol<S: Store>(
        &self,
        store: &mut S,
        symbol: &str,
        process: ProcessKind,
        now: i64,
        report: &RunReport,
    ) {
        let Some(latest) = store.latest_time(symbol) else {
            return;
        };
        let records_processed = match process {
            ProcessKind::Sessions => store.sessions_for_symbol(symbol).len(),
            ProcessKind::PoiEvents => store.events().len(),
            ProcessKind::Swings => store.swings_for_symbol(symbol).len(),
        };
        let (status, error_message) = match report.digest() {
            None => (ProcessStatus::Completed, None),
            Some(digest) => (ProcessStatus::Partial, Some(digest)),
        };
        store.put_metadata(ProcessingMetadata {
            symbol: symbol.to_string(),
            process,
            last_processed_time: Some(latest),
            records_processed,
            status,
            error_message,
            updated_at: now,
        });
    }
}
