use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::attendance::AttendanceRecord;
use super::incident::IncidentRecord;
use super::notification::{NewNotification, NotificationUpdate};

/// Which sync handler replays a queued record. Fixed when the record is queued.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum HandlerFamily {
    AttendancePending,
    IncidentPending,
    NotificationPending,
    NotificationUpdatePending,
}

/// Everything that can wait in the local queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", content = "record", rename_all = "snake_case")]
pub enum PendingRecord {
    Attendance(AttendanceRecord),
    Incident(IncidentRecord),
    Notification(NewNotification),
    NotificationUpdate(NotificationUpdate),
}

impl PendingRecord {
    pub fn family(&self) -> HandlerFamily {
        match self {
            Self::Attendance(_) => HandlerFamily::AttendancePending,
            Self::Incident(_) => HandlerFamily::IncidentPending,
            Self::Notification(_) => HandlerFamily::NotificationPending,
            Self::NotificationUpdate(_) => HandlerFamily::NotificationUpdatePending,
        }
    }

    /// Key the backend can use to drop a replay it already applied.
    pub fn idempotency_key(&self) -> Option<Uuid> {
        match self {
            Self::Attendance(r) => Some(r.idempotency_key),
            Self::Incident(r) => Some(r.idempotency_key),
            Self::Notification(r) => Some(r.idempotency_key),
            Self::NotificationUpdate(_) => None,
        }
    }
}

/// A row of the local queue. The payload stays sealed until the dispatcher opens it.
#[derive(Debug, Clone)]
pub struct QueuedItem {
    pub id: String,
    pub family: String,
    /// `<family>-<unix millis>`, e.g. `attendance-pending-1760256000000`.
    pub logical_type: String,
    pub(crate) encrypted_payload: Vec<u8>,
    pub saved_at: DateTime<Utc>,
}

impl QueuedItem {
    pub fn handler_family(&self) -> Option<HandlerFamily> {
        self.family.parse().ok()
    }

    pub fn summary(&self) -> QueuedItemSummary {
        QueuedItemSummary {
            id: self.id.clone(),
            family: self.family.clone(),
            logical_type: self.logical_type.clone(),
            saved_at: self.saved_at,
        }
    }
}

/// What the UI may see of a queued item.
#[derive(Debug, Clone, Serialize)]
pub struct QueuedItemSummary {
    pub id: String,
    pub family: String,
    pub logical_type: String,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_tags_are_kebab_case() {
        assert_eq!(
            HandlerFamily::AttendancePending.to_string(),
            "attendance-pending"
        );
        assert_eq!(
            "notification-update-pending".parse::<HandlerFamily>().unwrap(),
            HandlerFamily::NotificationUpdatePending
        );
        assert!("payroll-pending".parse::<HandlerFamily>().is_err());
    }
}
