//! Recurring calendar periods and their labels.

use {
    anyhow::{Context, Result, anyhow, bail},
    chrono::{Month, NaiveDate},
    std::{fmt, str::FromStr},
    strum_macros::{Display, EnumIter, EnumString},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
pub enum PeriodKind {
    Yearly,
    Monthly,
    Weekly,
    Major,
    Minor,
}

/// Fixed intraday sessions. Minutes are local exchange time relative to
/// midnight of the trading day; Asia starts the evening before.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, EnumIter,
)]
pub enum DayPart {
    Asia,
    London,
    #[strum(serialize = "NY_AM")]
    NyAm,
    #[strum(serialize = "NY_PM")]
    NyPm,
    Afternoon,
}

impl DayPart {
    pub fn start_minute(self) -> i64 {
        match self {
            DayPart::Asia => -6 * 60,
            DayPart::London => 0,
            DayPart::NyAm => 6 * 60,
            DayPart::NyPm => 12 * 60,
            DayPart::Afternoon => 13 * 60 + 30,
        }
    }

    /// The true open sits 90 minutes into every day part.
    pub fn true_open_minute(self) -> i64 {
        self.start_minute() + 90
    }
}

/// One of the sixteen 90 minute slots of a trading day, slot 0 starting at 18:00
/// the evening before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MinorSlot(u8);

impl MinorSlot {
    pub const COUNT: u8 = 16;
    pub const LENGTH_MINUTES: i64 = 90;
    /// True open is the close of the bar this far into the slot.
    pub const TRUE_OPEN_OFFSET_MINUTES: i64 = 22;

    pub fn new(index: u8) -> Option<Self> {
        (index < Self::COUNT).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = MinorSlot> {
        (0..Self::COUNT).map(MinorSlot)
    }

    /// Minutes relative to midnight of the trading day (negative before midnight).
    pub fn start_minute(self) -> i64 {
        -6 * 60 + self.0 as i64 * Self::LENGTH_MINUTES
    }

    /// Wall-clock start as `HHMM`, e.g. `1800` for slot 0.
    pub fn clock(self) -> u32 {
        let minute = self.start_minute().rem_euclid(24 * 60) as u32;
        (minute / 60) * 100 + minute % 60
    }

    fn from_clock(clock: u32) -> Option<Self> {
        Self::all().find(|s| s.clock() == clock)
    }
}

/// Identifies one occurrence of a period kind. Its `Display` form is the
/// stored label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PeriodId {
    Year(i32),
    Month { year: i32, month: u32 },
    /// Keyed by the Monday whose 18:00 is the week's true open.
    Week(NaiveDate),
    DayPart { trading_day: NaiveDate, part: DayPart },
    Minor { trading_day: NaiveDate, slot: MinorSlot },
}

impl PeriodId {
    pub fn kind(&self) -> PeriodKind {
        match self {
            PeriodId::Year(_) => PeriodKind::Yearly,
            PeriodId::Month { .. } => PeriodKind::Monthly,
            PeriodId::Week(_) => PeriodKind::Weekly,
            PeriodId::DayPart { .. } => PeriodKind::Major,
            PeriodId::Minor { .. } => PeriodKind::Minor,
        }
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodId::Year(year) => write!(f, "Year {}", year),
            PeriodId::Month { year, month } => {
                let name = u8::try_from(*month)
                    .ok()
                    .and_then(|m| Month::try_from(m).ok())
                    .map(|m| m.name())
                    .unwrap_or("Month?");
                write!(f, "{} {}", name, year)
            }
            PeriodId::Week(monday) => write!(f, "Week of {}", monday.format("%Y-%m-%d")),
            PeriodId::DayPart { trading_day, part } => {
                write!(f, "{} {}", part, trading_day.format("%Y-%m-%d"))
            }
            PeriodId::Minor { trading_day, slot } => {
                write!(f, "m{:04} {}", slot.clock(), trading_day.format("%Y-%m-%d"))
            }
        }
    }
}

impl FromStr for PeriodId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parse_date = |d: &str| {
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .with_context(|| format!("Bad date '{}' in period label '{}'", d, s))
        };

        if let Some(rest) = s.strip_prefix("Week of ") {
            return Ok(PeriodId::Week(parse_date(rest)?));
        }

        let (head, tail) = s
            .split_once(' ')
            .ok_or_else(|| anyhow!("Unrecognised period label '{}'", s))?;

        if head == "Year" {
            return Ok(PeriodId::Year(tail.parse().context("Bad year")?));
        }
        if let Ok(part) = head.parse::<DayPart>() {
            return Ok(PeriodId::DayPart {
                trading_day: parse_date(tail)?,
                part,
            });
        }
        if let Some(clock) = head.strip_prefix('m').and_then(|c| c.parse::<u32>().ok()) {
            let slot = MinorSlot::from_clock(clock)
                .ok_or_else(|| anyhow!("No minor slot starts at {:04}", clock))?;
            return Ok(PeriodId::Minor {
                trading_day: parse_date(tail)?,
                slot,
            });
        }
        if let Ok(month) = head.parse::<Month>() {
            return Ok(PeriodId::Month {
                year: tail.parse().context("Bad year")?,
                month: month.number_from_month(),
            });
        }
        bail!("Unrecognised period label '{}'", s)
    }
}
