//! Calendar rules for every period kind, evaluated in a fixed exchange offset.
//!
//! No holiday probing: a period whose true-open candle is missing simply stays
//! incomplete until data shows up.

use {
    crate::{
        config::ANALYSIS,
        data::repository::SessionWindowProvider,
        domain::{
            DayPart, MinorSlot, PeriodId, PeriodKind, SessionWindow, TrueOpenSource,
        },
        utils::TimeUtils,
    },
    chrono::{Datelike, Duration, FixedOffset, NaiveDate, Weekday},
    itertools::Itertools,
    strum::IntoEnumIterator,
};

/// The close before the evening reopen: 16:59 local on the previous day.
const PRIOR_CLOSE_MINUTE: i64 = -(7 * 60 + 1);
const REOPEN_HOUR_MINUTE: i64 = 18 * 60;

#[derive(Debug, Clone)]
pub struct CalendarWindowProvider {
    offset: FixedOffset,
}

impl Default for CalendarWindowProvider {
    fn default() -> Self {
        Self::new(TimeUtils::exchange_offset(ANALYSIS.exchange_utc_offset_hours))
    }
}

impl CalendarWindowProvider {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> &FixedOffset {
        &self.offset
    }

    /// Epoch ms of `minute` minutes past local midnight of `date`. Negative
    /// minutes reach back into the previous day.
    fn at(&self, date: NaiveDate, minute: i64) -> Option<i64> {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        TimeUtils::local_to_epoch_ms(&self.offset, midnight + Duration::minutes(minute))
    }

    fn local_date(&self, epoch_ms: i64) -> Option<NaiveDate> {
        TimeUtils::epoch_ms_to_local(&self.offset, epoch_ms).map(|dt| dt.date_naive())
    }

    /// 18:00 that opens the first trading day of the month: same day when the
    /// 1st is a Sunday, otherwise the evening before.
    fn first_trading_day_open(&self, year: i32, month: u32) -> Option<i64> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let opening_day = if first.weekday() == Weekday::Sun {
            first
        } else {
            first.pred_opt()?
        };
        self.at(opening_day, REOPEN_HOUR_MINUTE)
    }

    fn nth_monday(year: i32, month: u32, n: u8) -> Option<NaiveDate> {
        NaiveDate::from_weekday_of_month_opt(year, month, Weekday::Mon, n)
    }

    /// Sunday 18:00 that opens the given Monday.
    fn monday_open(&self, monday: NaiveDate) -> Option<i64> {
        self.at(monday, REOPEN_HOUR_MINUTE - 24 * 60)
    }

    fn yearly(&self, year: i32) -> Option<SessionWindow> {
        Some(SessionWindow {
            window_start: self.first_trading_day_open(year, 1)?,
            window_end: self.at(NaiveDate::from_ymd_opt(year, 4, 1)?, 0)?,
            true_open_time: self.monday_open(Self::nth_monday(year, 4, 1)?)?,
            true_open_source: TrueOpenSource::Open,
            expires_at: None,
        })
    }

    fn monthly(&self, year: i32, month: u32) -> Option<SessionWindow> {
        let true_open_time = self.monday_open(Self::nth_monday(year, month, 2)?)?;
        Some(SessionWindow {
            window_start: self.first_trading_day_open(year, month)?,
            window_end: true_open_time - TimeUtils::MS_IN_H,
            true_open_time,
            true_open_source: TrueOpenSource::Open,
            expires_at: None,
        })
    }

    fn weekly(&self, monday: NaiveDate) -> Option<SessionWindow> {
        let true_open_time = self.at(monday, REOPEN_HOUR_MINUTE)?;
        Some(SessionWindow {
            window_start: self.monday_open(monday)?,
            window_end: true_open_time,
            true_open_time,
            true_open_source: TrueOpenSource::Open,
            expires_at: None,
        })
    }

    fn day_part(&self, trading_day: NaiveDate, part: DayPart) -> Option<SessionWindow> {
        let begin = match part {
            DayPart::Asia => PRIOR_CLOSE_MINUTE,
            _ => part.start_minute(),
        };
        let true_open_time = self.at(trading_day, part.true_open_minute())?;
        Some(SessionWindow {
            window_start: self.at(trading_day, begin)?,
            window_end: true_open_time,
            true_open_time,
            true_open_source: TrueOpenSource::Open,
            expires_at: None,
        })
    }

    fn minor(&self, trading_day: NaiveDate, slot: MinorSlot) -> Option<SessionWindow> {
        let begin = if slot.index() == 0 {
            PRIOR_CLOSE_MINUTE
        } else {
            slot.start_minute()
        };
        let true_open_time =
            self.at(trading_day, slot.start_minute() + MinorSlot::TRUE_OPEN_OFFSET_MINUTES)?;
        Some(SessionWindow {
            window_start: self.at(trading_day, begin)?,
            // The true-open bar itself is part of a minor window.
            window_end: true_open_time + TimeUtils::MS_IN_MIN,
            true_open_time,
            true_open_source: TrueOpenSource::Close,
            expires_at: Some(true_open_time + ANALYSIS.minor_expiry_ms),
        })
    }

    /// Weekday trading days touching `[start, end]`, padded by a day either side.
    fn trading_days(&self, start: i64, end: i64) -> Vec<NaiveDate> {
        let (Some(first), Some(last)) = (self.local_date(start), self.local_date(end)) else {
            return Vec::new();
        };
        first
            .pred_opt()
            .unwrap_or(first)
            .iter_days()
            .take_while(|d| *d <= last.succ_opt().unwrap_or(last))
            .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
            .collect()
    }
}

impl SessionWindowProvider for CalendarWindowProvider {
    fn window_for(&self, period: &PeriodId) -> Option<SessionWindow> {
        match *period {
            PeriodId::Year(year) => self.yearly(year),
            PeriodId::Month { year, month } => self.monthly(year, month),
            PeriodId::Week(monday) => {
                if monday.weekday() != Weekday::Mon {
                    return None;
                }
                self.weekly(monday)
            }
            PeriodId::DayPart { trading_day, part } => self.day_part(trading_day, part),
            PeriodId::Minor { trading_day, slot } => self.minor(trading_day, slot),
        }
    }

    fn periods_between(&self, kind: PeriodKind, start: i64, end: i64) -> Vec<PeriodId> {
        if start > end {
            return Vec::new();
        }
        let (Some(first), Some(last)) = (self.local_date(start), self.local_date(end)) else {
            return Vec::new();
        };

        let candidates: Vec<PeriodId> = match kind {
            PeriodKind::Yearly => (first.year() - 1..=last.year() + 1)
                .map(PeriodId::Year)
                .collect(),
            PeriodKind::Monthly => (first.year() - 1..=last.year() + 1)
                .cartesian_product(1..=12)
                .map(|(year, month)| PeriodId::Month { year, month })
                .collect(),
            PeriodKind::Weekly => {
                let monday = first - Duration::days(first.weekday().num_days_from_monday() as i64);
                monday
                    .iter_weeks()
                    .take_while(|m| *m <= last + Duration::days(7))
                    .map(PeriodId::Week)
                    .collect()
            }
            PeriodKind::Major => self
                .trading_days(start, end)
                .into_iter()
                .cartesian_product(DayPart::iter().collect_vec())
                .map(|(trading_day, part)| PeriodId::DayPart { trading_day, part })
                .collect(),
            PeriodKind::Minor => self
                .trading_days(start, end)
                .into_iter()
                .cartesian_product(MinorSlot::all().collect_vec())
                .map(|(trading_day, slot)| PeriodId::Minor { trading_day, slot })
                .collect(),
        };

        candidates
            .into_iter()
            .filter_map(|p| self.window_for(&p).map(|w| (p, w)))
            .filter(|(_, w)| w.window_start <= end && w.true_open_time >= start)
            .sorted_by_key(|(_, w)| w.true_open_time)
            .map(|(p, _)| p)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn provider() -> CalendarWindowProvider {
        CalendarWindowProvider::new(TimeUtils::exchange_offset(-5))
    }

    fn local(p: &CalendarWindowProvider, ms: i64) -> NaiveDateTime {
        TimeUtils::epoch_ms_to_local(p.offset(), ms).unwrap().naive_local()
    }

    fn ymd_hm(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, min, 0).unwrap()
    }

    #[test]
    fn yearly_anchors_on_first_monday_of_april() {
        let p = provider();
        let w = p.window_for(&PeriodId::Year(2024)).unwrap();
        // 2024-01-01 is a Monday, so trading opens Sunday Dec 31 18:00.
        assert_eq!(local(&p, w.window_start), ymd_hm(2023, 12, 31, 18, 0));
        // First Monday of April 2024 is the 1st.
        assert_eq!(local(&p, w.true_open_time), ymd_hm(2024, 3, 31, 18, 0));
        assert_eq!(local(&p, w.window_end), ymd_hm(2024, 4, 1, 0, 0));
    }

    #[test]
    fn monthly_true_open_opens_the_second_monday() {
        let p = provider();
        let w = p.window_for(&PeriodId::Month { year: 2024, month: 3 }).unwrap();
        assert_eq!(local(&p, w.window_start), ymd_hm(2024, 2, 29, 18, 0));
        assert_eq!(local(&p, w.true_open_time), ymd_hm(2024, 3, 10, 18, 0));
        assert_eq!(w.window_end, w.true_open_time - TimeUtils::MS_IN_H);
    }

    #[test]
    fn asia_and_minor_zero_start_at_prior_close() {
        let p = provider();
        let day = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let asia = p
            .window_for(&PeriodId::DayPart { trading_day: day, part: DayPart::Asia })
            .unwrap();
        assert_eq!(local(&p, asia.window_start), ymd_hm(2024, 3, 4, 16, 59));
        assert_eq!(local(&p, asia.true_open_time), ymd_hm(2024, 3, 4, 19, 30));

        let m = p
            .window_for(&PeriodId::Minor { trading_day: day, slot: MinorSlot::new(0).unwrap() })
            .unwrap();
        assert_eq!(local(&p, m.window_start), ymd_hm(2024, 3, 4, 16, 59));
        assert_eq!(local(&p, m.true_open_time), ymd_hm(2024, 3, 4, 18, 22));
        assert_eq!(m.true_open_source, TrueOpenSource::Close);
        assert_eq!(m.expires_at, Some(m.true_open_time + TimeUtils::MS_IN_D));
    }

    #[test]
    fn periods_between_overlaps_the_requested_range() {
        let p = provider();
        let start = p.at(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), 9 * 60).unwrap();
        let end = p.at(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), 11 * 60).unwrap();

        let majors = p.periods_between(PeriodKind::Major, start, end);
        // NY_AM (06:00-07:30) ends before 09:00 and NY_PM starts after 11:00.
        assert!(majors.is_empty());

        let weeks = p.periods_between(PeriodKind::Weekly, start, end);
        assert!(weeks.is_empty());

        let months = p.periods_between(PeriodKind::Monthly, start, end);
        assert_eq!(months, [PeriodId::Month { year: 2024, month: 3 }]);

        let minors = p.periods_between(PeriodKind::Minor, start, end);
        assert_eq!(minors.len(), 2);
    }
}
