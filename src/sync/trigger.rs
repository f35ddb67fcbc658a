use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::connectivity::Connectivity;
use super::dispatcher::SyncDispatcher;

/// Runs a sync pass at startup when already online, then on every
/// offline→online edge, until `ctx` is cancelled. A reconnect that happens
/// while a pass is running gets a pass of its own.
pub async fn run_sync_trigger(
    ctx: CancellationToken,
    dispatcher: Arc<SyncDispatcher>,
    connectivity: Connectivity,
) {
    let mut rx = connectivity.subscribe();
    let mut was_online = *rx.borrow_and_update();
    info!(online = was_online, "sync trigger started");

    if was_online {
        sync_until_settled(&dispatcher, &connectivity).await;
    }

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                info!("Received shutdown signal, stopping sync trigger");
                break;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *rx.borrow_and_update();
                if online && !was_online {
                    sync_until_settled(&dispatcher, &connectivity).await;
                }
                was_online = online;
            }
        }
    }
}

async fn sync_until_settled(dispatcher: &SyncDispatcher, connectivity: &Connectivity) {
    loop {
        let reconnects = connectivity.reconnects();
        sync_once(dispatcher).await;
        if connectivity.reconnects() == reconnects || !connectivity.is_online() {
            break;
        }
        info!("connection dropped and came back during the pass, syncing again");
    }
}

async fn sync_once(dispatcher: &SyncDispatcher) {
    match dispatcher.sync_pending_data().await {
        Ok(synced) => info!(synced, "pending data synchronized"),
        Err(e) => error!(error = %e, "sync pass failed"),
    }
}
