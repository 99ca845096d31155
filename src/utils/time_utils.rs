use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Timelike, Utc,
};

pub type AppInstant = std::time::Instant;

pub struct TimeUtils;

impl TimeUtils {
    pub const MS_IN_S: i64 = 1000;
    pub const MS_IN_MIN: i64 = Self::MS_IN_S * 60;
    pub const MS_IN_H: i64 = Self::MS_IN_MIN * 60;
    pub const MS_IN_4_H: i64 = Self::MS_IN_MIN * 60 * 4;
    pub const MS_IN_D: i64 = Self::MS_IN_H * 24;
    pub const STANDARD_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn exchange_offset(utc_offset_hours: i32) -> FixedOffset {
        FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Epoch ms for a wall-clock time in the exchange's fixed offset.
    pub fn local_to_epoch_ms(offset: &FixedOffset, local: NaiveDateTime) -> Option<i64> {
        offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.timestamp_millis())
    }

    pub fn epoch_ms_to_local(offset: &FixedOffset, epoch_ms: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp_millis(epoch_ms).map(|dt| dt.with_timezone(offset))
    }

    /// Trading-day label for a timestamp. The trading day rolls over at `roll_hour`
    /// local time, so 18:00 on the 4th belongs to the 5th.
    pub fn trading_day(offset: &FixedOffset, roll_hour: u32, epoch_ms: i64) -> Option<NaiveDate> {
        let local = Self::epoch_ms_to_local(offset, epoch_ms)?;
        let date = local.date_naive();
        if local.hour() >= roll_hour {
            date.checked_add_signed(Duration::days(1))
        } else {
            Some(date)
        }
    }
}

// Time Helper functions

pub fn epoch_ms_to_utc(epoch_ms: i64) -> String {
    // Used for display purposes
    match DateTime::from_timestamp_millis(epoch_ms) {
        Some(dt) => format!("{}", dt.format(TimeUtils::STANDARD_DATETIME_FORMAT)),
        None => format!("<invalid ts {}>", epoch_ms),
    }
}

pub fn now_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn format_duration(ms: i64) -> String {
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{}s", secs);
    }
    let mins = secs / 60;
    if mins < 60 {
        return format!("{}m", mins);
    }
    let hours = mins / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }
    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }
    let months = days / 30;
    if months < 12 {
        return format!("{}M", months);
    }
    let years = months / 12;
    let rem_months = months % 12;
    format!("{}Y {}M", years, rem_months)
}
