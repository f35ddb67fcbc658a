//! Delivery of queued records once the connection is back.

mod connectivity;
pub mod dispatcher;
pub mod handlers;
mod trigger;

use std::sync::Arc;

pub use connectivity::Connectivity;
pub use dispatcher::{SyncDispatcher, SyncHandler};
pub use trigger::run_sync_trigger;

use crate::backend::RemoteBackend;
use crate::services::NotificationService;
use crate::store::SecureStore;
use handlers::{AttendanceHandler, IncidentHandler, NotificationHandler, NotificationUpdateHandler};

/// Dispatcher with a handler for every queued family.
pub fn default_dispatcher(
    store: Arc<SecureStore>,
    backend: Arc<dyn RemoteBackend>,
    notifications: Arc<NotificationService>,
) -> SyncDispatcher {
    SyncDispatcher::new(store)
        .with_handler(Arc::new(AttendanceHandler::new(backend.clone())))
        .with_handler(Arc::new(IncidentHandler::new(backend.clone())))
        .with_handler(Arc::new(NotificationHandler::new(backend.clone())))
        .with_handler(Arc::new(NotificationUpdateHandler::new(backend, notifications)))
}
