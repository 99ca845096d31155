//! The per-instrument session lifecycle as an in-memory transition function.
//!
//! `Unbroken -> Break -> Return -> Resolved`. A second break is recorded while in
//! `Return` without changing status. Candidates that would violate timestamp
//! ordering are dropped silently; they are not-yet-valid, not corrupt.

use crate::domain::{
    Candle, EventType, Level, Lifecycle, PriceLevels, ResolutionType, SessionStatus,
};

/// An accepted lifecycle advance and the POI event it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub level: Level,
    pub event_type: EventType,
    pub time: i64,
}

pub struct SessionStateMachine;

impl SessionStateMachine {
    /// First level in PoC, RPP, TO order whose price the candle touches.
    /// One candle never credits two levels.
    pub fn touched_level(candle: &Candle, levels: &PriceLevels, tolerance: f64) -> Option<Level> {
        Level::PRIORITY
            .into_iter()
            .find(|&level| candle.touches(levels.price(level), tolerance))
    }

    pub fn apply_touch(lc: &mut Lifecycle, level: Level, time: i64) -> Option<Transition> {
        if lc.last_transition_time().is_some_and(|last| time <= last) {
            return None;
        }

        let event_type = match (lc.status, level.side()) {
            (SessionStatus::Unbroken, Some(side)) => {
                lc.status = SessionStatus::Break;
                lc.first_break_time = Some(time);
                lc.first_break_side = Some(side);
                EventType::Break
            }
            (SessionStatus::Break, None) => {
                lc.status = SessionStatus::Return;
                lc.first_return_time = Some(time);
                EventType::Return
            }
            (SessionStatus::Return, Some(side)) if lc.second_break_time.is_none() => {
                lc.second_break_time = Some(time);
                lc.second_break_side = Some(side);
                EventType::SecondBreak
            }
            (SessionStatus::Return, None) => {
                lc.second_break_time?;
                if !lc.first_return_time.is_some_and(|ret| time > ret) {
                    return None;
                }
                lc.status = SessionStatus::Resolved;
                lc.resolution_time = Some(time);
                lc.resolution_type = Some(if lc.first_break_side == lc.second_break_side {
                    ResolutionType::SingleSided
                } else {
                    ResolutionType::DoubleSided
                });
                EventType::Resolution
            }
            _ => return None,
        };

        Some(Transition {
            level,
            event_type,
            time,
        })
    }

    /// Feeds candles in time order, returning every accepted transition.
    pub fn scan(
        lc: &mut Lifecycle,
        candles: &[Candle],
        levels: &PriceLevels,
        tolerance: f64,
    ) -> Vec<Transition> {
        candles
            .iter()
            .filter_map(|c| {
                let level = Self::touched_level(c, levels, tolerance)?;
                Self::apply_touch(lc, level, c.timestamp_ms)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Side;

    const LEVELS: PriceLevels = PriceLevels {
        true_open: 100.0,
        poc: 110.0,
        rpp: 90.0,
    };

    fn touching(t: i64, price: f64) -> Candle {
        Candle::new(t, price, price + 0.5, price - 0.5, price)
    }

    #[test]
    fn double_sided_resolution_after_return_and_second_break() {
        let mut lc = Lifecycle::default();
        let candles = [
            touching(1, 110.0), // PoC break
            touching(2, 100.0), // T1 return
            touching(3, 90.0),  // T2 RPP second break
            touching(4, 100.0), // T3 resolution
        ];
        let transitions = SessionStateMachine::scan(&mut lc, &candles, &LEVELS, 0.0);

        let kinds: Vec<_> = transitions.iter().map(|t| (t.level, t.event_type)).collect();
        assert_eq!(
            kinds,
            [
                (Level::Poc, EventType::Break),
                (Level::TrueOpen, EventType::Return),
                (Level::Rpp, EventType::SecondBreak),
                (Level::TrueOpen, EventType::Resolution),
            ]
        );
        assert_eq!(lc.status, SessionStatus::Resolved);
        assert_eq!(lc.resolution_type, Some(ResolutionType::DoubleSided));
        assert_eq!(lc.resolution_time, Some(4));
        assert_eq!(lc.first_break_side, Some(Side::Poc));
        assert_eq!(lc.second_break_side, Some(Side::Rpp));
    }

    #[test]
    fn same_side_second_break_resolves_single_sided() {
        let mut lc = Lifecycle::default();
        let candles = [touching(1, 90.0), touching(2, 100.0), touching(3, 90.0), touching(4, 100.0)];
        SessionStateMachine::scan(&mut lc, &candles, &LEVELS, 0.0);
        assert_eq!(lc.resolution_type, Some(ResolutionType::SingleSided));
    }

    #[test]
    fn true_open_is_ignored_until_broken() {
        let mut lc = Lifecycle::default();
        assert!(SessionStateMachine::apply_touch(&mut lc, Level::TrueOpen, 1).is_none());
        assert_eq!(lc.status, SessionStatus::Unbroken);
    }

    #[test]
    fn return_without_second_break_does_not_resolve() {
        let mut lc = Lifecycle::default();
        let candles = [touching(1, 110.0), touching(2, 100.0), touching(3, 100.0)];
        SessionStateMachine::scan(&mut lc, &candles, &LEVELS, 0.0);
        assert_eq!(lc.status, SessionStatus::Return);
        assert_eq!(lc.resolution_time, None);
    }

    #[test]
    fn only_the_first_second_break_is_kept() {
        let mut lc = Lifecycle::default();
        let candles = [touching(1, 110.0), touching(2, 100.0), touching(3, 90.0), touching(5, 110.0)];
        SessionStateMachine::scan(&mut lc, &candles, &LEVELS, 0.0);
        assert_eq!(lc.second_break_time, Some(3));
        assert_eq!(lc.second_break_side, Some(Side::Rpp));
    }

    #[test]
    fn resolution_before_return_is_rejected() {
        let mut lc = Lifecycle {
            status: SessionStatus::Return,
            first_break_time: Some(1),
            first_break_side: Some(Side::Poc),
            first_return_time: Some(10),
            second_break_time: Some(5),
            second_break_side: Some(Side::Rpp),
            ..Default::default()
        };
        // A TO touch before the recorded return must not resolve.
        assert!(SessionStateMachine::apply_touch(&mut lc, Level::TrueOpen, 8).is_none());
        assert_eq!(lc.status, SessionStatus::Return);
        assert!(SessionStateMachine::apply_touch(&mut lc, Level::TrueOpen, 11).is_some());
        assert_eq!(lc.status, SessionStatus::Resolved);
    }

    #[test]
    fn one_level_per_candle_in_priority_order() {
        // Spans PoC and TO; only PoC is credited.
        let wide = Candle::new(1, 100.0, 111.0, 99.0, 105.0);
        assert_eq!(
            SessionStateMachine::touched_level(&wide, &LEVELS, 0.0),
            Some(Level::Poc)
        );
        let mut lc = Lifecycle::default();
        let transitions = SessionStateMachine::scan(&mut lc, &[wide], &LEVELS, 0.0);
        assert_eq!(transitions.len(), 1);
        assert_eq!(lc.status, SessionStatus::Break);
    }

    #[test]
    fn never_skips_states() {
        let mut lc = Lifecycle::default();
        let candles: Vec<Candle> = (0..40)
            .map(|i| touching(i, [100.0, 110.0, 90.0, 105.0][(i % 4) as usize]))
            .collect();
        let mut seen = vec![lc.status];
        for c in &candles {
            if let Some(level) = SessionStateMachine::touched_level(c, &LEVELS, 0.0) {
                SessionStateMachine::apply_touch(&mut lc, level, c.timestamp_ms);
                if seen.last() != Some(&lc.status) {
                    seen.push(lc.status);
                }
            }
        }
        assert_eq!(
            seen,
            [
                SessionStatus::Unbroken,
                SessionStatus::Break,
                SessionStatus::Return,
                SessionStatus::Resolved
            ]
        );
    }
}
