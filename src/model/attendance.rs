use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::employee::{Coordinates, EmployeeId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AttendanceKind {
    Entry,
    Exit,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Punctuality {
    OnTime,
    Late,
}

/// Calendar day as `YYYYMMDD`, computed in the configured reference offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(pub u32);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.year() as u32 * 10_000 + date.month() * 100 + date.day())
    }

    pub fn to_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            (self.0 / 10_000) as i32,
            (self.0 / 100) % 100,
            self.0 % 100,
        )
    }
}

impl From<NaiveDateTime> for DayKey {
    fn from(value: NaiveDateTime) -> Self {
        Self::from_date(value.date())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub employee_id: EmployeeId,
    pub kind: AttendanceKind,
    pub punctuality: Punctuality,
    /// Local wall-clock time, serialized without a timezone suffix.
    pub timestamp: NaiveDateTime,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default = "Uuid::new_v4")]
    pub idempotency_key: Uuid,
}

impl AttendanceRecord {
    pub fn new(
        employee_id: EmployeeId,
        kind: AttendanceKind,
        punctuality: Punctuality,
        timestamp: NaiveDateTime,
        position: Coordinates,
    ) -> Self {
        // exits are never classified
        let punctuality = match kind {
            AttendanceKind::Entry => punctuality,
            AttendanceKind::Exit => Punctuality::OnTime,
        };
        Self {
            employee_id,
            kind,
            punctuality,
            timestamp,
            latitude: position.latitude,
            longitude: position.longitude,
            idempotency_key: Uuid::new_v4(),
        }
    }

    pub fn day(&self) -> DayKey {
        DayKey::from(self.timestamp)
    }

    /// `2026-10-12T08:03:00.000`
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
    }
}

/// What is already registered for one employee on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayStatus {
    pub entry: bool,
    pub exit: bool,
}

impl TodayStatus {
    pub fn is_complete(&self) -> bool {
        self.entry && self.exit
    }

    /// Kind of the next registration for the day.
    pub fn next_kind(&self) -> AttendanceKind {
        if self.entry {
            AttendanceKind::Exit
        } else {
            AttendanceKind::Entry
        }
    }

    pub fn mark(&mut self, kind: AttendanceKind) {
        match kind {
            AttendanceKind::Entry => self.entry = true,
            AttendanceKind::Exit => self.exit = true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub entry: Option<NaiveTime>,
    pub exit: Option<NaiveTime>,
    /// `HH:MM`, `00:00` until both ends exist.
    pub worked: String,
    pub punctuality: Option<Punctuality>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub days: usize,
    pub on_time: usize,
    pub late: usize,
    pub on_time_percentage: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceHistory {
    pub days: Vec<DaySummary>,
    pub stats: AttendanceStats,
    /// `false` when served from the local snapshot.
    pub fresh: bool,
}
