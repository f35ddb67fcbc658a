//! Replays queued records against the backend.
//!
//! Each queued item carries the family tag it was stored with; the handler
//! registered for that family replays it. Items without a handler, or that no
//! longer decrypt, stay queued. An item is deleted after its replay
//! succeeded, so delivery is at-least-once and relies on idempotency keys.
//! Items the handler reports as malformed are dropped, since no retry can fix them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};

use crate::error::SyncError;
use crate::model::queue::{HandlerFamily, PendingRecord};
use crate::store::SecureStore;

#[async_trait]
pub trait SyncHandler: Send + Sync {
    fn family(&self) -> HandlerFamily;

    async fn replay(&self, record: &PendingRecord) -> Result<(), SyncError>;
}

pub struct SyncDispatcher {
    store: Arc<SecureStore>,
    handlers: HashMap<HandlerFamily, Arc<dyn SyncHandler>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the pass ends, including on early return.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SyncDispatcher {
    pub fn new(store: Arc<SecureStore>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn SyncHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn register(&mut self, handler: Arc<dyn SyncHandler>) {
        self.handlers.insert(handler.family(), handler);
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns how many items were delivered and removed. A call made while
    /// another pass is running does nothing and returns 0.
    #[instrument(skip(self))]
    pub async fn sync_pending_data(&self) -> Result<usize, SyncError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already running");
            return Ok(0);
        }
        let _guard = PassGuard(&self.in_flight);

        let pending = self.store.list_all().await?;
        let mut synced = 0;

        for item in &pending {
            let Some(handler) = item
                .handler_family()
                .and_then(|family| self.handlers.get(&family))
            else {
                let err = SyncError::HandlerMissing(item.family.clone());
                warn!(id = %item.id, logical_type = %item.logical_type, error = %err, "skipping queued item");
                continue;
            };

            let Some(record) = self.store.open(item) else {
                continue;
            };

            match handler.replay(&record).await {
                Ok(()) => {
                    if let Err(e) = self.store.delete(&item.id).await {
                        error!(id = %item.id, error = %e, "replayed item could not be removed");
                        continue;
                    }
                    synced += 1;
                    debug!(id = %item.id, logical_type = %item.logical_type, "synced");
                }
                Err(SyncError::Invalid(e)) => {
                    error!(id = %item.id, logical_type = %item.logical_type, error = %e, "queued item is malformed, dropping it");
                    if let Err(e) = self.store.delete(&item.id).await {
                        error!(id = %item.id, error = %e, "malformed item could not be removed");
                    }
                }
                Err(e) => {
                    warn!(id = %item.id, logical_type = %item.logical_type, error = %e, "replay failed, keeping item");
                }
            }
        }

        info!(synced, pending = pending.len(), "sync pass finished");
        Ok(synced)
    }
}
