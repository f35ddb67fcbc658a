//! Request/response contract with the remote attendance backend.

mod envelope;
mod http;

use async_trait::async_trait;

pub use envelope::Envelope;
pub use http::HttpBackend;

use crate::error::{BackendError, TransportError};
use crate::model::attendance::AttendanceRecord;
use crate::model::employee::{EmployeeId, EmployeeProfile};
use crate::model::face::FaceReference;
use crate::model::incident::IncidentRecord;
use crate::model::notification::{NewNotification, NotificationAction, NotificationRecord};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[async_trait]
pub trait RemoteBackend: Send + Sync {
    /// Checks the credentials and returns the employee's working profile.
    async fn login(&self, username: &str, password: &str) -> Result<EmployeeProfile, TransportError>;

    async fn create_attendance(&self, record: &AttendanceRecord) -> Result<(), TransportError>;

    async fn list_attendance(&self, employee: EmployeeId) -> Result<Vec<AttendanceRecord>, TransportError>;

    /// Evidence that cannot be encoded is an `Invalid` error, never a transport one.
    async fn create_incident(&self, incident: &IncidentRecord) -> Result<(), BackendError>;

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<NotificationRecord, TransportError>;

    async fn list_notifications(
        &self,
        employee: EmployeeId,
    ) -> Result<Vec<NotificationRecord>, TransportError>;

    async fn update_notification(
        &self,
        notification_id: &str,
        action: NotificationAction,
    ) -> Result<(), TransportError>;

    /// `Ok(None)` when the employee has never enrolled. A malformed stored
    /// descriptor is `Invalid`.
    async fn get_face_reference(&self, employee: EmployeeId) -> Result<Option<FaceReference>, BackendError>;

    async fn put_face_reference(
        &self,
        employee: EmployeeId,
        reference: &FaceReference,
    ) -> Result<(), TransportError>;
}
