//! Notifications with an offline fallback.
//!
//! Online, everything goes to the backend and the employee's list is cached
//! encrypted. Offline, new notifications are queued and shown through a
//! placeholder (`offline-<millis>`) until the dispatcher delivers them.
//! Dismissals are kept locally so a dismissed notification stays hidden even
//! before the backend confirms it.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::backend::RemoteBackend;
use crate::error::StoreError;
use crate::model::employee::EmployeeId;
use crate::model::notification::{
    NewNotification, NotificationAction, NotificationCategory, NotificationRecord,
    NotificationUpdate, is_placeholder_id,
};
use crate::model::queue::{HandlerFamily, PendingRecord};
use crate::store::SecureStore;
use crate::sync::Connectivity;

const SNAPSHOT_NAMESPACE: &str = "notifications";
const DISMISSAL_NAMESPACE: &str = "notification_dismissals";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dismissal {
    dismissed_at: DateTime<Utc>,
    /// Set once the backend acknowledged the dismissal.
    confirmed: bool,
}

pub struct NotificationService {
    backend: Arc<dyn RemoteBackend>,
    store: Arc<SecureStore>,
    connectivity: Connectivity,
}

impl NotificationService {
    pub fn new(backend: Arc<dyn RemoteBackend>, store: Arc<SecureStore>, connectivity: Connectivity) -> Self {
        Self {
            backend,
            store,
            connectivity,
        }
    }

    /// Sends the notification, or queues it and returns its placeholder.
    #[instrument(skip(self, notification), fields(employee_id = %notification.employee_id))]
    pub async fn create(&self, notification: NewNotification) -> Result<NotificationRecord, StoreError> {
        if self.connectivity.is_online() {
            match self.backend.create_notification(&notification).await {
                Ok(record) => return Ok(record),
                Err(e) => warn!(error = %e, "notification not delivered, queueing"),
            }
        }

        let placeholder = notification.placeholder();
        self.store
            .put(&PendingRecord::Notification(notification))
            .await?;
        Ok(placeholder)
    }

    /// Best effort: a failure is only logged.
    pub async fn notify(
        &self,
        employee: EmployeeId,
        category: NotificationCategory,
        title: &str,
        message: &str,
    ) {
        let notification = NewNotification::new(employee, category, title, message);
        if let Err(e) = self.create(notification).await {
            warn!(error = %e, %employee, "notification could not be created nor queued");
        }
    }

    /// Server list (or the cached copy when offline), plus queued placeholders,
    /// minus dismissed ones. Newest first.
    #[instrument(skip(self))]
    pub async fn list(&self, employee: EmployeeId) -> Result<Vec<NotificationRecord>, StoreError> {
        let key = employee.to_string();
        let mut items = match self.fetch(employee).await {
            Some(items) => {
                self.store.save_record(SNAPSHOT_NAMESPACE, &key, &items).await?;
                self.prune_dismissals(employee, &items).await?;
                items
            }
            None => self
                .store
                .load_record::<Vec<NotificationRecord>>(SNAPSHOT_NAMESPACE, &key)
                .await?
                .unwrap_or_default(),
        };

        for (_, record) in self.store.list_family(HandlerFamily::NotificationPending).await? {
            if let PendingRecord::Notification(pending) = record {
                if pending.employee_id == employee {
                    items.push(pending.placeholder());
                }
            }
        }

        let read_pending: HashSet<String> = self
            .pending_updates(employee, NotificationAction::Read)
            .await?;
        let dismissed = self.dismissed_ids(employee).await?;

        items.retain(|n| !dismissed.contains(&n.id));
        for item in &mut items {
            if read_pending.contains(&item.id) {
                item.read = true;
            }
        }
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(items)
    }

    pub async fn unread_count(&self, employee: EmployeeId) -> Result<usize, StoreError> {
        Ok(self.list(employee).await?.iter().filter(|n| !n.read).count())
    }

    #[instrument(skip(self))]
    pub async fn mark_read(&self, employee: EmployeeId, notification_id: &str) -> Result<(), StoreError> {
        if is_placeholder_id(notification_id) {
            // the backend has no id for it yet, so the queued copy carries the flag
            return self.mark_queued_read(employee, notification_id).await;
        }

        let key = employee.to_string();
        if let Some(mut cached) = self
            .store
            .load_record::<Vec<NotificationRecord>>(SNAPSHOT_NAMESPACE, &key)
            .await?
        {
            if let Some(item) = cached.iter_mut().find(|n| n.id == notification_id) {
                item.read = true;
                self.store.save_record(SNAPSHOT_NAMESPACE, &key, &cached).await?;
            }
        }

        self.send_update(NotificationUpdate {
            notification_id: notification_id.to_string(),
            employee_id: employee,
            action: NotificationAction::Read,
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn dismiss(&self, employee: EmployeeId, notification_id: &str) -> Result<(), StoreError> {
        if is_placeholder_id(notification_id) {
            return self.drop_queued(employee, notification_id).await;
        }

        self.store
            .save_record(
                DISMISSAL_NAMESPACE,
                &dismissal_key(employee, notification_id),
                &Dismissal {
                    dismissed_at: Utc::now(),
                    confirmed: false,
                },
            )
            .await?;

        self.send_update(NotificationUpdate {
            notification_id: notification_id.to_string(),
            employee_id: employee,
            action: NotificationAction::Dismiss,
        })
        .await
    }

    /// Records that the backend applied an update.
    pub async fn confirm(&self, update: &NotificationUpdate) -> Result<(), StoreError> {
        if update.action != NotificationAction::Dismiss {
            return Ok(());
        }
        let key = dismissal_key(update.employee_id, &update.notification_id);
        if let Some(mut dismissal) = self
            .store
            .load_record::<Dismissal>(DISMISSAL_NAMESPACE, &key)
            .await?
        {
            dismissal.confirmed = true;
            self.store.save_record(DISMISSAL_NAMESPACE, &key, &dismissal).await?;
        }
        Ok(())
    }

    async fn send_update(&self, update: NotificationUpdate) -> Result<(), StoreError> {
        if self.connectivity.is_online() {
            match self
                .backend
                .update_notification(&update.notification_id, update.action)
                .await
            {
                Ok(()) => return self.confirm(&update).await,
                Err(e) => warn!(error = %e, id = %update.notification_id, action = %update.action, "notification update queued"),
            }
        }
        self.store
            .put(&PendingRecord::NotificationUpdate(update))
            .await?;
        Ok(())
    }

    async fn fetch(&self, employee: EmployeeId) -> Option<Vec<NotificationRecord>> {
        if !self.connectivity.is_online() {
            return None;
        }
        match self.backend.list_notifications(employee).await {
            Ok(items) => Some(items),
            Err(e) => {
                warn!(error = %e, %employee, "notifications unavailable, using cached copy");
                None
            }
        }
    }

    async fn mark_queued_read(&self, employee: EmployeeId, placeholder_id: &str) -> Result<(), StoreError> {
        for (item, record) in self.store.list_family(HandlerFamily::NotificationPending).await? {
            if let PendingRecord::Notification(mut pending) = record {
                if pending.employee_id == employee && pending.placeholder().id == placeholder_id && !pending.read {
                    pending.read = true;
                    self.store
                        .reseal(&item.id, &PendingRecord::Notification(pending))
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn drop_queued(&self, employee: EmployeeId, placeholder_id: &str) -> Result<(), StoreError> {
        for (item, record) in self.store.list_family(HandlerFamily::NotificationPending).await? {
            if let PendingRecord::Notification(pending) = record {
                if pending.employee_id == employee && pending.placeholder().id == placeholder_id {
                    self.store.delete(&item.id).await?;
                }
            }
        }
        Ok(())
    }

    /// Dismissals are forgotten once the server stops listing the notification.
    async fn prune_dismissals(&self, employee: EmployeeId, listed: &[NotificationRecord]) -> Result<(), StoreError> {
        let listed: HashSet<&str> = listed.iter().map(|n| n.id.as_str()).collect();
        let prefix = format!("{employee}:");
        for (key, _) in self.store.load_namespace::<Dismissal>(DISMISSAL_NAMESPACE).await? {
            if let Some(id) = key.strip_prefix(&prefix) {
                if !listed.contains(id) {
                    self.store.remove_record(DISMISSAL_NAMESPACE, &key).await?;
                }
            }
        }
        Ok(())
    }

    async fn dismissed_ids(&self, employee: EmployeeId) -> Result<HashSet<String>, StoreError> {
        let prefix = format!("{employee}:");
        Ok(self
            .store
            .load_namespace::<Dismissal>(DISMISSAL_NAMESPACE)
            .await?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    async fn pending_updates(
        &self,
        employee: EmployeeId,
        action: NotificationAction,
    ) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .store
            .list_family(HandlerFamily::NotificationUpdatePending)
            .await?
            .into_iter()
            .filter_map(|(_, record)| match record {
                PendingRecord::NotificationUpdate(u) if u.employee_id == employee && u.action == action => {
                    Some(u.notification_id)
                }
                _ => None,
            })
            .collect())
    }
}

fn dismissal_key(employee: EmployeeId, notification_id: &str) -> String {
    format!("{employee}:{notification_id}")
}
