use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;

use super::{EmployeeQuery, internal_error};
use crate::model::employee::EmployeeId;
use crate::model::notification::{NewNotification, NotificationCategory};
use crate::services::NotificationService;

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub employee_id: EmployeeId,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub async fn list_notifications(
    service: web::Data<NotificationService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let employee_id = path.into_inner();
    let items = service
        .list(EmployeeId(employee_id))
        .await
        .map_err(|e| internal_error(e, "Listing notifications failed"))?;
    let unread = items.iter().filter(|n| !n.read).count();

    Ok(HttpResponse::Ok().json(json!({
        "unread": unread,
        "items": items,
    })))
}

pub async fn create_notification(
    service: web::Data<NotificationService>,
    body: web::Json<CreateNotificationRequest>,
) -> actix_web::Result<impl Responder> {
    let body = body.into_inner();
    if body.title.trim().is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "message": "title is required"
        })));
    }

    let notification = NewNotification::new(body.employee_id, body.category, body.title, body.message)
        .with_metadata(body.metadata);
    let record = service
        .create(notification)
        .await
        .map_err(|e| internal_error(e, "Creating notification failed"))?;

    Ok(HttpResponse::Created().json(record))
}

pub async fn mark_read(
    service: web::Data<NotificationService>,
    path: web::Path<String>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    service
        .mark_read(EmployeeId(query.employee_id), &id)
        .await
        .map_err(|e| internal_error(e, "Marking notification failed"))?;

    Ok(HttpResponse::Ok().json(json!({ "message": "Notification marked as read" })))
}

pub async fn dismiss(
    service: web::Data<NotificationService>,
    path: web::Path<String>,
    query: web::Query<EmployeeQuery>,
) -> actix_web::Result<impl Responder> {
    let id = path.into_inner();
    service
        .dismiss(EmployeeId(query.employee_id), &id)
        .await
        .map_err(|e| internal_error(e, "Dismissing notification failed"))?;

    Ok(HttpResponse::NoContent().finish())
}
