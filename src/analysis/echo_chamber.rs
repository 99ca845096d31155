//! Cross-instrument lead/lag on a shared POI event.

use {
    crate::{
        domain::{Leader, PoiEvent},
        utils::TimeUtils,
    },
    chrono::FixedOffset,
};

pub struct EchoChamber;

impl EchoChamber {
    /// Whole minutes between the two touches and who got there first.
    /// `None` unless both instruments have touched.
    pub fn measure(
        primary_time: Option<i64>,
        secondary_time: Option<i64>,
        simultaneous_threshold_ms: i64,
    ) -> Option<(i64, Leader)> {
        let (p, s) = (primary_time?, secondary_time?);
        let delta_ms = (s - p).abs();
        let leader = if delta_ms < simultaneous_threshold_ms {
            Leader::Simultaneous
        } else if p < s {
            Leader::Primary
        } else {
            Leader::Secondary
        };
        Some((delta_ms / TimeUtils::MS_IN_MIN, leader))
    }

    /// Recomputes the derived fields of an event from whichever times are present.
    pub fn refresh(
        event: &mut PoiEvent,
        simultaneous_threshold_ms: i64,
        offset: &FixedOffset,
        roll_hour: u32,
    ) {
        match Self::measure(event.primary_time, event.secondary_time, simultaneous_threshold_ms) {
            Some((delta, leader)) => {
                event.time_delta_minutes = Some(delta);
                event.leader = Some(leader);
            }
            None => {
                event.time_delta_minutes = None;
                event.leader = None;
            }
        }
        event.trading_day = event
            .first_touch_time()
            .and_then(|t| TimeUtils::trading_day(offset, roll_hour, t));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, Level, PeriodId, PoiEventKey};
    use chrono::NaiveDate;

    const TEN_AM: i64 = 1_700_000_000_000 - 1_700_000_000_000 % TimeUtils::MS_IN_H;

    #[test]
    fn three_minutes_behind_makes_primary_the_leader() {
        let m = EchoChamber::measure(Some(TEN_AM), Some(TEN_AM + 3 * TimeUtils::MS_IN_MIN), 60_000);
        assert_eq!(m, Some((3, Leader::Primary)));

        let m = EchoChamber::measure(Some(TEN_AM + 3 * TimeUtils::MS_IN_MIN), Some(TEN_AM), 60_000);
        assert_eq!(m, Some((3, Leader::Secondary)));
    }

    #[test]
    fn seconds_apart_is_simultaneous() {
        let m = EchoChamber::measure(Some(TEN_AM), Some(TEN_AM + 3_000), 60_000);
        assert_eq!(m, Some((0, Leader::Simultaneous)));
    }

    #[test]
    fn single_sided_touch_has_no_delta() {
        assert_eq!(EchoChamber::measure(Some(TEN_AM), None, 60_000), None);
    }

    #[test]
    fn refresh_labels_trading_day_from_earliest_touch() {
        let et = TimeUtils::exchange_offset(-5);
        let key = PoiEventKey {
            primary_session_id: 1,
            secondary_session_id: 2,
            level: Level::Poc,
            event_type: EventType::Break,
        };
        let mut event = PoiEvent::pending(key, PeriodId::Year(2024));
        let evening = TimeUtils::local_to_epoch_ms(
            &et,
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(18, 30, 0).unwrap(),
        )
        .unwrap();
        event.secondary_time = Some(evening);
        EchoChamber::refresh(&mut event, 60_000, &et, 18);
        assert_eq!(event.trading_day, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(event.leader, None);

        event.primary_time = Some(evening + 5 * TimeUtils::MS_IN_MIN);
        EchoChamber::refresh(&mut event, 60_000, &et, 18);
        assert_eq!(event.time_delta_minutes, Some(5));
        assert_eq!(event.leader, Some(Leader::Secondary));
    }
}
