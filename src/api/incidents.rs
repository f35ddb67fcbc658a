use actix_web::{HttpResponse, Responder, web};
use serde_json::json;

use crate::error::ServiceError;
use crate::model::incident::IncidentRecord;
use crate::services::{IncidentOutcome, IncidentService};

/// 201 when the backend took it, 202 when it was queued.
pub async fn create_incident(
    service: web::Data<IncidentService>,
    body: web::Json<IncidentRecord>,
) -> actix_web::Result<impl Responder> {
    let incident = body.into_inner();
    let employee_id = incident.employee_id.0;

    match service.submit(incident).await {
        Ok(outcome @ IncidentOutcome::Sent) => Ok(HttpResponse::Created().json(outcome)),
        Ok(outcome @ IncidentOutcome::Queued { .. }) => Ok(HttpResponse::Accepted().json(outcome)),
        Err(ServiceError::Invalid(e)) => Ok(HttpResponse::BadRequest().json(json!({
            "message": e.to_string()
        }))),
        Err(ServiceError::Store(e)) => {
            tracing::error!(error = %e, employee_id, "Incident could not be stored");
            Err(actix_web::error::ErrorInternalServerError(
                "Internal Server Error",
            ))
        }
    }
}
