use actix_web::{HttpResponse, Responder, web};
use serde_json::json;

use super::internal_error;
use crate::error::SyncError;
use crate::model::employee::EmployeeId;
use crate::services::AttendanceHistoryService;

/// Day summaries and stats; served from the local snapshot when offline.
pub async fn history(
    service: web::Data<AttendanceHistoryService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    let history = service
        .history(EmployeeId(employee_id))
        .await
        .map_err(|e| internal_error(e, "Loading attendance history failed"))?;

    Ok(HttpResponse::Ok().json(history))
}

/// Forces a download from the backend.
pub async fn refresh(
    service: web::Data<AttendanceHistoryService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();

    match service.refresh(EmployeeId(employee_id)).await {
        Ok(history) => Ok(HttpResponse::Ok().json(history)),
        Err(SyncError::Transport(e)) => {
            tracing::warn!(error = %e, employee_id, "Attendance refresh failed");
            Ok(HttpResponse::ServiceUnavailable().json(json!({
                "message": "Backend unreachable, try again later"
            })))
        }
        Err(e) => Err(internal_error(e, "Attendance refresh failed")),
    }
}
