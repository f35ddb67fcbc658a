use chrono::NaiveTime;
use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(
    Debug, Display, From, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EmployeeId(pub u64);

/// Where and when an employee is expected to work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkInfo {
    /// Token encoded in the QR code posted at the site.
    pub site_token: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl WorkInfo {
    /// Site coordinates, only when both halves are configured.
    pub fn site(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Entry schedule: scheduled start plus the grace period before an entry counts as late.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchedule", into = "RawSchedule")]
pub struct Schedule {
    pub start: NaiveTime,
    /// Grace period in fractional minutes.
    pub tolerance_minutes: f64,
}

/// Wire form: `start` as `HH:MM`, `tolerance` as `HH:MM:SS`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSchedule {
    pub start: String,
    pub tolerance: String,
}

impl Schedule {
    pub fn parse(start: &str, tolerance: &str) -> Result<Self, ValidationError> {
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(start.trim(), "%H:%M:%S"))
            .map_err(|_| ValidationError::Schedule(start.to_string()))?;

        let parts = tolerance
            .trim()
            .split(':')
            .map(|p| p.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ValidationError::Schedule(tolerance.to_string()))?;

        let (h, m, s) = match parts.as_slice() {
            [h, m, s] => (*h, *m, *s),
            [h, m] => (*h, *m, 0),
            _ => return Err(ValidationError::Schedule(tolerance.to_string())),
        };
        if m >= 60 || s >= 60 {
            return Err(ValidationError::Schedule(tolerance.to_string()));
        }

        Ok(Self {
            start,
            tolerance_minutes: f64::from(h) * 60.0 + f64::from(m) + f64::from(s) / 60.0,
        })
    }
}

impl TryFrom<RawSchedule> for Schedule {
    type Error = ValidationError;

    fn try_from(value: RawSchedule) -> Result<Self, Self::Error> {
        Schedule::parse(&value.start, &value.tolerance)
    }
}

impl From<Schedule> for RawSchedule {
    fn from(value: Schedule) -> Self {
        let total_seconds = (value.tolerance_minutes * 60.0).round() as u64;
        Self {
            start: value.start.format("%H:%M").to_string(),
            tolerance: format!(
                "{:02}:{:02}:{:02}",
                total_seconds / 3600,
                (total_seconds % 3600) / 60,
                total_seconds % 60
            ),
        }
    }
}

/// The signed-in employee as the verification pipeline sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub employee_id: EmployeeId,
    pub work_info: WorkInfo,
    pub schedule: Schedule,
}
