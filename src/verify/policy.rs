//! Attendance rules: which days and hours accept registrations, and whether
//! an entry is punctual. Everything here is pure; "now" comes from a [`Clock`].

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};

use crate::model::attendance::{DayKey, Punctuality};
use crate::model::employee::Schedule;

pub trait Clock: Send + Sync {
    /// Local wall-clock time in the reference offset.
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> DayKey {
        DayKey::from(self.now())
    }
}

/// System time shifted to a fixed UTC offset, so day boundaries do not depend on host locale.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Always answers the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttendancePolicy {
    pub eligible_days: Vec<Weekday>,
    /// Inclusive bounds, minutes after midnight.
    pub window_start_minute: u32,
    pub window_end_minute: u32,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            eligible_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            window_start_minute: 7 * 60 + 50,
            window_end_minute: 22 * 60 + 40,
        }
    }
}

impl AttendancePolicy {
    pub fn is_eligible_day(&self, date: NaiveDate) -> bool {
        self.eligible_days.contains(&date.weekday())
    }

    pub fn is_within_window(&self, at: NaiveDateTime) -> bool {
        let minute = minute_of_day(at);
        minute >= self.window_start_minute && minute <= self.window_end_minute
    }
}

/// `Late` only when the wall-clock minute is strictly past start + tolerance.
pub fn classify_punctuality(at: NaiveDateTime, schedule: &Schedule) -> Punctuality {
    let scheduled = f64::from(schedule.start.hour() * 60 + schedule.start.minute());
    let current = f64::from(minute_of_day(at));

    if current > scheduled + schedule.tolerance_minutes {
        Punctuality::Late
    } else {
        Punctuality::OnTime
    }
}

fn minute_of_day(at: NaiveDateTime) -> u32 {
    at.hour() * 60 + at.minute()
}

/// Parses `HH:MM` into minutes after midnight.
pub fn parse_minute_of_day(raw: &str) -> Option<u32> {
    let (h, m) = raw.trim().split_once(':')?;
    let (h, m) = (h.parse::<u32>().ok()?, m.parse::<u32>().ok()?);
    (h < 24 && m < 60).then_some(h * 60 + m)
}
