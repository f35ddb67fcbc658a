use actix_web::{HttpResponse, Responder, web};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::internal_error;
use crate::model::attendance::AttendanceRecord;
use crate::model::employee::{Coordinates, EmployeeId};
use crate::verify::{
    DeskError, FramePush, FrameRelay, LocationRelay, SessionOutcome, SessionStatus, VerificationDesk,
};

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub qr_text: String,
}

/// Either a fix or the reason the UI could not get one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LocationReport {
    Fix(Coordinates),
    Failed { error: String },
}

#[derive(Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum OutcomeView {
    Recorded {
        message: String,
        record: AttendanceRecord,
    },
    Queued {
        message: String,
        record: AttendanceRecord,
        queue_id: String,
    },
    Aborted {
        message: String,
        policy_violation: bool,
    },
}

impl From<&SessionOutcome> for OutcomeView {
    fn from(outcome: &SessionOutcome) -> Self {
        let message = outcome.message();
        match outcome {
            SessionOutcome::Recorded(record) => OutcomeView::Recorded {
                message,
                record: record.clone(),
            },
            SessionOutcome::Queued { record, queue_id } => OutcomeView::Queued {
                message,
                record: record.clone(),
                queue_id: queue_id.clone(),
            },
            SessionOutcome::Aborted(reason) => OutcomeView::Aborted {
                message,
                policy_violation: reason.is_policy_violation(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusView {
    pub employee_id: EmployeeId,
    pub phase: &'static str,
    pub feedback: String,
    pub outcome: Option<OutcomeView>,
}

impl StatusView {
    fn new(employee_id: EmployeeId, status: &SessionStatus) -> Self {
        Self {
            employee_id,
            phase: status.phase.name(),
            feedback: status.feedback.clone(),
            outcome: status.outcome.as_ref().map(OutcomeView::from),
        }
    }
}

fn desk_error(e: DeskError) -> actix_web::Result<HttpResponse> {
    match e {
        DeskError::UnknownEmployee(_) => Ok(HttpResponse::NotFound().json(json!({
            "message": e.to_string()
        }))),
        DeskError::NotOpen | DeskError::Busy => Ok(HttpResponse::Conflict().json(json!({
            "message": e.to_string()
        }))),
        DeskError::Store(e) => Err(internal_error(e, "Verification desk failed")),
    }
}

/// Opens the QR scanner for an employee.
pub async fn open(
    desk: web::Data<VerificationDesk>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = EmployeeId(path.into_inner());
    match desk.open(employee_id).await {
        Ok(status) => Ok(HttpResponse::Ok().json(StatusView::new(employee_id, &status))),
        Err(e) => desk_error(e),
    }
}

/// Answers when the session is done or aborted; poll `GET /verification` for progress.
pub async fn scan(
    desk: web::Data<VerificationDesk>,
    body: web::Json<ScanRequest>,
) -> actix_web::Result<HttpResponse> {
    match desk.scan(&body.qr_text).await {
        Ok(outcome) => Ok(HttpResponse::Ok().json(OutcomeView::from(&outcome))),
        Err(e) => desk_error(e),
    }
}

pub async fn status(desk: web::Data<VerificationDesk>) -> impl Responder {
    match desk.status().await {
        Some((employee_id, status)) => HttpResponse::Ok().json(StatusView::new(employee_id, &status)),
        None => HttpResponse::NotFound().json(json!({
            "message": "No verification is open"
        })),
    }
}

pub async fn close(desk: web::Data<VerificationDesk>) -> impl Responder {
    desk.close().await;
    HttpResponse::NoContent().finish()
}

/// Latest camera frame with the detection the UI computed for it.
pub async fn push_frame(
    frames: web::Data<FrameRelay>,
    body: web::Json<FramePush>,
) -> impl Responder {
    match frames.push(body.into_inner()).await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => HttpResponse::BadRequest().json(json!({ "message": e.to_string() })),
    }
}

/// 409 when no session is waiting for a position.
pub async fn report_location(
    location: web::Data<LocationRelay>,
    body: web::Json<LocationReport>,
) -> impl Responder {
    let answer = match body.into_inner() {
        LocationReport::Fix(position) => Ok(position),
        LocationReport::Failed { error } => Err(error),
    };
    if location.provide(answer).await {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::Conflict().json(json!({
            "message": "No position was requested"
        }))
    }
}
