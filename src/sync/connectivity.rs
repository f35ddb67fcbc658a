use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::info;

/// Online/offline level shared by every component. Reported by the UI through the local API.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
    reconnects: Arc<AtomicU64>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            tx: Arc::new(tx),
            reconnects: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of offline→online edges so far. The watch channel only keeps
    /// the latest level, so a short outage is visible here and nowhere else.
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Acquire)
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns whether the level changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                self.reconnects.fetch_add(1, Ordering::AcqRel);
            }
            info!(online, "connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn only_real_changes_wake_subscribers() {
        let connectivity = Connectivity::new(false);
        let mut rx = connectivity.subscribe();

        assert!(!connectivity.set_online(false));
        assert!(!rx.has_changed().unwrap());

        assert!(connectivity.set_online(true));
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(connectivity.is_online());
    }

    #[test]
    fn reconnects_count_online_edges() {
        let connectivity = Connectivity::new(true);
        connectivity.set_online(false);
        connectivity.set_online(true);
        connectivity.set_online(true);
        connectivity.set_online(false);
        connectivity.set_online(true);
        assert_eq!(connectivity.reconnects(), 2);
    }
}
