use actix_web::{HttpResponse, Responder, web};
use serde::Deserialize;
use serde_json::json;

use super::internal_error;
use crate::model::queue::QueuedItemSummary;
use crate::store::SecureStore;
use crate::sync::{Connectivity, SyncDispatcher};

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// The UI reports network changes here; going online wakes the sync trigger.
pub async fn set_connectivity(
    connectivity: web::Data<Connectivity>,
    body: web::Json<ConnectivityRequest>,
) -> impl Responder {
    let changed = connectivity.set_online(body.online);
    HttpResponse::Ok().json(json!({
        "online": body.online,
        "changed": changed,
    }))
}

pub async fn sync_now(
    dispatcher: web::Data<SyncDispatcher>,
    connectivity: web::Data<Connectivity>,
) -> actix_web::Result<impl Responder> {
    if !connectivity.is_online() {
        return Ok(HttpResponse::Conflict().json(json!({
            "message": "Client is offline"
        })));
    }

    let synced = dispatcher
        .sync_pending_data()
        .await
        .map_err(|e| internal_error(e, "Manual sync failed"))?;

    Ok(HttpResponse::Ok().json(json!({ "synced": synced })))
}

/// Queued items without their payloads.
pub async fn list_queue(store: web::Data<SecureStore>) -> actix_web::Result<impl Responder> {
    let items: Vec<QueuedItemSummary> = store
        .list_all()
        .await
        .map_err(|e| internal_error(e, "Listing queue failed"))?
        .iter()
        .map(|item| item.summary())
        .collect();

    Ok(HttpResponse::Ok().json(json!({
        "pending": items.len(),
        "items": items,
    })))
}
