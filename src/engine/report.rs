//! Per-run bookkeeping and the tabled store summary.

use {
    crate::{
        data::{MemoryStore, SwingRepository},
        domain::{Direction, Leader, SessionStatus},
    },
    itertools::Itertools,
    std::fmt,
    strum_macros::Display,
    tabled::{Table, Tabled, settings::Style},
};

/// Why a unit of work was skipped. Skips are expected on real data and never
/// abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SkipReason {
    /// The window provider has no window for this period.
    NoWindow,
    /// No candle at the true-open time.
    MissingTrueOpenCandle,
    /// No candles inside the PoC window.
    EmptyWindow,
    /// The other instrument has no session for the same period.
    MissingPartner,
    /// PoC/RPP/TO not computed yet on one side of the pair.
    RangeNotComputed,
    /// Too few candles to classify swings.
    InsufficientCandles,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub symbol: String,
    pub unit: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub unit: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub sessions_created: usize,
    pub ranges_computed: usize,
    pub lifecycles_reset: usize,
    pub pairs_scanned: usize,
    pub transitions: usize,
    pub events_deleted: usize,
    pub swings_written: usize,
    pub skips: Vec<Skip>,
    pub failures: Vec<Failure>,
}

impl RunReport {
    pub fn skip(&mut self, symbol: &str, unit: impl fmt::Display, reason: SkipReason) {
        log::debug!("Skipping {} {}: {}", symbol, unit, reason);
        self.skips.push(Skip {
            symbol: symbol.to_string(),
            unit: unit.to_string(),
            reason,
        });
    }

    pub fn fail(&mut self, unit: impl fmt::Display, error: &anyhow::Error) {
        log::error!("❌ {} failed: {:#}", unit, error);
        self.failures.push(Failure {
            unit: unit.to_string(),
            error: format!("{:#}", error),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.skips.is_empty() && self.failures.is_empty()
    }

    pub fn skip_counts(&self) -> Vec<(SkipReason, usize)> {
        self.skips
            .iter()
            .counts_by(|s| s.reason)
            .into_iter()
            .sorted_by_key(|(reason, _)| reason.to_string())
            .collect()
    }

    /// One-line digest for metadata rows.
    pub fn digest(&self) -> Option<String> {
        if self.is_clean() {
            return None;
        }
        let skips = self
            .skip_counts()
            .iter()
            .map(|(reason, n)| format!("{}: {}", reason, n))
            .join(", ");
        Some(format!(
            "{} skipped [{}], {} failed",
            self.skips.len(),
            skips,
            self.failures.len()
        ))
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created {} sessions, computed {} ranges, reset {} lifecycles, scanned {} pairs ({} transitions, {} events dropped), wrote {} swings",
            self.sessions_created,
            self.ranges_computed,
            self.lifecycles_reset,
            self.pairs_scanned,
            self.transitions,
            self.events_deleted,
            self.swings_written
        )?;
        if let Some(digest) = self.digest() {
            write!(f, "; {}", digest)?;
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Unbroken")]
    unbroken: usize,
    #[tabled(rename = "Break")]
    broken: usize,
    #[tabled(rename = "Return")]
    returned: usize,
    #[tabled(rename = "Resolved")]
    resolved: usize,
    #[tabled(rename = "No range")]
    incomplete: usize,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Event")]
    event: String,
    #[tabled(rename = "Count")]
    count: usize,
    #[tabled(rename = "Both touched")]
    paired: usize,
    #[tabled(rename = "Primary led")]
    primary_led: usize,
    #[tabled(rename = "Secondary led")]
    secondary_led: usize,
    #[tabled(rename = "Simultaneous")]
    simultaneous: usize,
}

#[derive(Tabled)]
struct SwingRow {
    #[tabled(rename = "Symbol")]
    symbol: String,
    #[tabled(rename = "Class")]
    class: u8,
    #[tabled(rename = "Highs")]
    highs: usize,
    #[tabled(rename = "Lows")]
    lows: usize,
}

/// Session status, event and swing-class tables for the whole store.
pub fn store_summary(store: &MemoryStore) -> String {
    let session_rows = store
        .all_sessions()
        .map(|s| ((s.symbol.clone(), s.kind()), s))
        .into_group_map()
        .into_iter()
        .sorted_by(|(a, _), (b, _)| a.cmp(b))
        .map(|((symbol, kind), sessions)| {
            let status = |st: SessionStatus| sessions.iter().filter(|s| s.status() == st).count();
            SessionRow {
                symbol,
                kind: kind.to_string(),
                unbroken: status(SessionStatus::Unbroken),
                broken: status(SessionStatus::Break),
                returned: status(SessionStatus::Return),
                resolved: status(SessionStatus::Resolved),
                incomplete: sessions.iter().filter(|s| s.levels.is_none()).count(),
            }
        })
        .collect_vec();

    let event_rows = store
        .all_events()
        .map(|e| (e.key.event_type, e))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(t, _)| *t)
        .map(|(event_type, events)| {
            let led = |l: Leader| events.iter().filter(|e| e.leader == Some(l)).count();
            EventRow {
                event: event_type.to_string(),
                count: events.len(),
                paired: events.iter().filter(|e| e.leader.is_some()).count(),
                primary_led: led(Leader::Primary),
                secondary_led: led(Leader::Secondary),
                simultaneous: led(Leader::Simultaneous),
            }
        })
        .collect_vec();

    let swing_rows = store
        .symbols()
        .into_iter()
        .flat_map(|symbol| {
            let swings = store.swings_for_symbol(symbol);
            (1..=6u8)
                .map(|class| {
                    let count = |d: Direction| {
                        swings
                            .iter()
                            .filter(|s| s.class == class && s.direction == d)
                            .count()
                    };
                    SwingRow {
                        symbol: symbol.to_string(),
                        class,
                        highs: count(Direction::High),
                        lows: count(Direction::Low),
                    }
                })
                .collect_vec()
        })
        .filter(|row| row.highs + row.lows > 0)
        .collect_vec();

    format!(
        "Sessions\n{}\n\nPOI events\n{}\n\nSwings\n{}",
        Table::new(session_rows).with(Style::rounded()),
        Table::new(event_rows).with(Style::rounded()),
        Table::new(swing_rows).with(Style::rounded()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_counts_dropped_events() {
        let report = RunReport {
            events_deleted: 3,
            ..Default::default()
        };
        assert!(report.to_string().contains("3 events dropped"));
    }

    #[test]
    fn digest_groups_skips_by_reason() {
        let mut report = RunReport::default();
        assert!(report.digest().is_none());
        report.skip("ES", "Year 2024", SkipReason::MissingTrueOpenCandle);
        report.skip("NQ", "Year 2024", SkipReason::MissingTrueOpenCandle);
        report.skip("ES", "January 2024", SkipReason::MissingPartner);
        assert_eq!(
            report.digest().unwrap(),
            "3 skipped [MissingPartner: 1, MissingTrueOpenCandle: 2], 0 failed"
        );
    }
}
