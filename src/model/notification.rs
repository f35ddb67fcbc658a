use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::employee::EmployeeId;

pub const OFFLINE_ID_PREFIX: &str = "offline-";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationCategory {
    Success,
    Warning,
    Error,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub employee_id: EmployeeId,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Ids minted locally for notifications the backend has not received yet.
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(OFFLINE_ID_PREFIX)
}

impl NotificationRecord {
    pub fn is_placeholder(&self) -> bool {
        is_placeholder_id(&self.id)
    }
}

/// A notification before the backend has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub employee_id: EmployeeId,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Read before it reached the backend.
    #[serde(default)]
    pub read: bool,
    #[serde(default = "Uuid::new_v4")]
    pub idempotency_key: Uuid,
}

impl NewNotification {
    pub fn new(
        employee_id: EmployeeId,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            employee_id,
            title: title.into(),
            message: message.into(),
            category,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            read: false,
            idempotency_key: Uuid::new_v4(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Local stand-in shown until the queued copy reaches the backend.
    pub fn placeholder(&self) -> NotificationRecord {
        NotificationRecord {
            id: format!("{OFFLINE_ID_PREFIX}{}", self.created_at.timestamp_millis()),
            employee_id: self.employee_id,
            title: self.title.clone(),
            message: self.message.clone(),
            category: self.category,
            created_at: self.created_at,
            read: self.read,
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationAction {
    Read,
    Dismiss,
}

/// A read/dismiss that still has to be confirmed by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationUpdate {
    pub notification_id: String,
    pub employee_id: EmployeeId,
    pub action: NotificationAction,
}
