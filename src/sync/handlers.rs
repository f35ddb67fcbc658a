use std::sync::Arc;

use async_trait::async_trait;

use super::dispatcher::SyncHandler;
use crate::backend::RemoteBackend;
use crate::error::SyncError;
use crate::model::queue::{HandlerFamily, PendingRecord};
use crate::services::NotificationService;

fn wrong_family(record: &PendingRecord) -> SyncError {
    SyncError::WrongFamily(record.family().to_string())
}

pub struct AttendanceHandler {
    backend: Arc<dyn RemoteBackend>,
}

impl AttendanceHandler {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SyncHandler for AttendanceHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::AttendancePending
    }

    async fn replay(&self, record: &PendingRecord) -> Result<(), SyncError> {
        let PendingRecord::Attendance(attendance) = record else {
            return Err(wrong_family(record));
        };
        Ok(self.backend.create_attendance(attendance).await?)
    }
}

pub struct IncidentHandler {
    backend: Arc<dyn RemoteBackend>,
}

impl IncidentHandler {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SyncHandler for IncidentHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::IncidentPending
    }

    async fn replay(&self, record: &PendingRecord) -> Result<(), SyncError> {
        let PendingRecord::Incident(incident) = record else {
            return Err(wrong_family(record));
        };
        Ok(self.backend.create_incident(incident).await?)
    }
}

pub struct NotificationHandler {
    backend: Arc<dyn RemoteBackend>,
}

impl NotificationHandler {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl SyncHandler for NotificationHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::NotificationPending
    }

    async fn replay(&self, record: &PendingRecord) -> Result<(), SyncError> {
        let PendingRecord::Notification(notification) = record else {
            return Err(wrong_family(record));
        };
        self.backend.create_notification(notification).await?;
        Ok(())
    }
}

/// Replays read/dismiss actions and records the confirmation locally.
pub struct NotificationUpdateHandler {
    backend: Arc<dyn RemoteBackend>,
    notifications: Arc<NotificationService>,
}

impl NotificationUpdateHandler {
    pub fn new(backend: Arc<dyn RemoteBackend>, notifications: Arc<NotificationService>) -> Self {
        Self {
            backend,
            notifications,
        }
    }
}

#[async_trait]
impl SyncHandler for NotificationUpdateHandler {
    fn family(&self) -> HandlerFamily {
        HandlerFamily::NotificationUpdatePending
    }

    async fn replay(&self, record: &PendingRecord) -> Result<(), SyncError> {
        let PendingRecord::NotificationUpdate(update) = record else {
            return Err(wrong_family(record));
        };
        self.backend
            .update_notification(&update.notification_id, update.action)
            .await?;
        self.notifications.confirm(update).await?;
        Ok(())
    }
}
