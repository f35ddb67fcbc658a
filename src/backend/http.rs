use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::envelope::read_envelope;
use super::{IDEMPOTENCY_HEADER, RemoteBackend};
use crate::error::{BackendError, TransportError, ValidationError};
use crate::model::attendance::AttendanceRecord;
use crate::model::employee::{EmployeeId, EmployeeProfile};
use crate::model::face::{Descriptor, FaceReference};
use crate::model::incident::IncidentRecord;
use crate::model::notification::{NewNotification, NotificationAction, NotificationRecord};

/// Backend reached over HTTP. Every call is bounded by the client timeout.
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct FaceReferenceBody {
    descriptor: serde_json::Value,
    #[serde(default)]
    image_base64: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, TransportError> {
        let response = request.send().await?;
        read_envelope(response).await
    }
}

fn with_key(request: RequestBuilder, key: Uuid) -> RequestBuilder {
    request.header(IDEMPOTENCY_HEADER, key.to_string())
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    #[instrument(skip(self, password))]
    async fn login(&self, username: &str, password: &str) -> Result<EmployeeProfile, TransportError> {
        let request = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }));
        self.send(request)
            .await?
            .ok_or_else(|| TransportError::Decode("login response without data".into()))
    }

    #[instrument(skip(self, record), fields(employee_id = %record.employee_id, kind = %record.kind))]
    async fn create_attendance(&self, record: &AttendanceRecord) -> Result<(), TransportError> {
        let form = Form::new()
            .text("employee_id", record.employee_id.to_string())
            .text("type", record.kind.to_string())
            .text("punctuality", record.punctuality.to_string())
            .text("timestamp", record.formatted_timestamp())
            .text("latitude", record.latitude.to_string())
            .text("longitude", record.longitude.to_string());

        let request = self.client.post(self.url("/attendance")).multipart(form);
        self.send::<serde_json::Value>(with_key(request, record.idempotency_key))
            .await?;
        debug!("attendance accepted");
        Ok(())
    }

    async fn list_attendance(&self, employee: EmployeeId) -> Result<Vec<AttendanceRecord>, TransportError> {
        let request = self.client.get(self.url(&format!("/attendance/{employee}")));
        Ok(self.send(request).await?.unwrap_or_default())
    }

    #[instrument(skip(self, incident), fields(employee_id = %incident.employee_id))]
    async fn create_incident(&self, incident: &IncidentRecord) -> Result<(), BackendError> {
        let mut form = Form::new()
            .text("employee_id", incident.employee_id.to_string())
            .text("type", incident.incident_type.clone())
            .text("description", incident.description.clone())
            .text("incident_date", incident.incident_date.to_string());

        for evidence in &incident.evidence {
            let media_type = evidence.media_type()?;
            let part = Part::bytes(evidence.bytes()?)
                .file_name(evidence.name.clone())
                .mime_str(media_type.as_ref())
                .map_err(|e| ValidationError::Evidence(format!("{}: {e}", evidence.name)))?;
            form = form.part("evidence", part);
        }

        let request = self.client.post(self.url("/incidents")).multipart(form);
        self.send::<serde_json::Value>(with_key(request, incident.idempotency_key))
            .await?;
        Ok(())
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<NotificationRecord, TransportError> {
        let body = json!({
            "employee_id": notification.employee_id,
            "title": notification.title,
            "message": notification.message,
            "category": notification.category,
            "metadata": notification.metadata,
            "created_at": notification.created_at,
            "read": notification.read,
        });
        let request = self.client.post(self.url("/notifications")).json(&body);
        self.send(with_key(request, notification.idempotency_key))
            .await?
            .ok_or_else(|| TransportError::Decode("notification response without data".into()))
    }

    async fn list_notifications(
        &self,
        employee: EmployeeId,
    ) -> Result<Vec<NotificationRecord>, TransportError> {
        let request = self
            .client
            .get(self.url("/notifications"))
            .query(&[("employee_id", employee.0)]);
        Ok(self.send(request).await?.unwrap_or_default())
    }

    async fn update_notification(
        &self,
        notification_id: &str,
        action: NotificationAction,
    ) -> Result<(), TransportError> {
        let request = match action {
            NotificationAction::Read => self
                .client
                .put(self.url(&format!("/notifications/{notification_id}/read"))),
            NotificationAction::Dismiss => self
                .client
                .delete(self.url(&format!("/notifications/{notification_id}"))),
        };
        self.send::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn get_face_reference(&self, employee: EmployeeId) -> Result<Option<FaceReference>, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/face-references/{employee}")))
            .send()
            .await
            .map_err(TransportError::from)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let Some(body) = read_envelope::<FaceReferenceBody>(response).await? else {
            return Ok(None);
        };
        let descriptor = Descriptor::from_json(&body.descriptor)?;
        Ok(Some(FaceReference {
            descriptor,
            image_base64: body.image_base64,
        }))
    }

    #[instrument(skip(self, reference))]
    async fn put_face_reference(
        &self,
        employee: EmployeeId,
        reference: &FaceReference,
    ) -> Result<(), TransportError> {
        let request = self
            .client
            .put(self.url(&format!("/face-references/{employee}")))
            .json(reference);
        self.send::<serde_json::Value>(request).await?;
        Ok(())
    }
}
