use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::notifications::NotificationService;
use crate::backend::RemoteBackend;
use crate::error::{BackendError, ServiceError};
use crate::model::incident::IncidentRecord;
use crate::model::notification::{NewNotification, NotificationCategory};
use crate::model::queue::PendingRecord;
use crate::store::SecureStore;
use crate::sync::Connectivity;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IncidentOutcome {
    Sent,
    /// Stored locally, sent by the dispatcher once the connection is back.
    Queued { queue_id: String },
}

pub struct IncidentService {
    backend: Arc<dyn RemoteBackend>,
    store: Arc<SecureStore>,
    notifications: Arc<NotificationService>,
    connectivity: Connectivity,
}

impl IncidentService {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        store: Arc<SecureStore>,
        notifications: Arc<NotificationService>,
        connectivity: Connectivity,
    ) -> Self {
        Self {
            backend,
            store,
            notifications,
            connectivity,
        }
    }

    #[instrument(skip(self, incident), fields(employee_id = %incident.employee_id, incident_type = %incident.incident_type))]
    pub async fn submit(&self, incident: IncidentRecord) -> Result<IncidentOutcome, ServiceError> {
        incident.validate()?;
        let metadata = json!({
            "description": incident.description,
            "date": incident.incident_date,
        });

        if self.connectivity.is_online() {
            match self.backend.create_incident(&incident).await {
                Ok(()) => {
                    info!("incident sent");
                    self.announce(
                        NewNotification::new(
                            incident.employee_id,
                            NotificationCategory::Success,
                            "Incident registered",
                            "Your incident was sent successfully.",
                        )
                        .with_metadata(metadata),
                    )
                    .await;
                    return Ok(IncidentOutcome::Sent);
                }
                Err(BackendError::Invalid(e)) => return Err(e.into()),
                Err(BackendError::Transport(e)) => warn!(error = %e, "incident not delivered, queueing"),
            }
        }

        let employee = incident.employee_id;
        let queue_id = self.store.put(&PendingRecord::Incident(incident)).await?;
        self.announce(
            NewNotification::new(
                employee,
                NotificationCategory::Warning,
                "Incident registered",
                "Incident saved, it will be sent when the connection returns.",
            )
            .with_metadata(metadata),
        )
        .await;
        Ok(IncidentOutcome::Queued { queue_id })
    }

    async fn announce(&self, notification: NewNotification) {
        let employee = notification.employee_id;
        if let Err(e) = self.notifications.create(notification).await {
            warn!(error = %e, %employee, "incident notification lost");
        }
    }
}
