//! Panel registry: tracks every persistent connection so `stoppanels` can
//! reach each of them directly, independent of the results/update
//! broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed)
}

/// Sent to a registered persistent connection's task to ask it to write a
/// farewell `stop\n` (best-effort, bounded-timeout) and close.
#[derive(Debug, Clone, Copy)]
pub struct StopRequest;

/// Live persistent connections, keyed by a per-process connection id.
/// Entries are added when a connection upgrades to `persist_read` or
/// `persist_write_checkclose`, and removed when the connection task exits.
#[derive(Default)]
pub struct PanelRegistry {
    connections: DashMap<u64, mpsc::UnboundedSender<StopRequest>>,
}

impl PanelRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, id: u64, stop_tx: mpsc::UnboundedSender<StopRequest>) {
        self.connections.insert(id, stop_tx);
    }

    pub fn unregister(&self, id: u64) {
        self.connections.remove(&id);
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }

    /// `stoppanels`: ask every currently-registered persistent connection
    /// to push a farewell `stop\n` and close. Best-effort — a connection
    /// that's already gone simply drops the message.
    pub fn stop_all(&self) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(StopRequest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_all_reaches_every_registered_connection() {
        let registry = PanelRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register(next_connection_id(), tx1);
        registry.register(next_connection_id(), tx2);

        registry.stop_all();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn unregister_removes_from_active_count() {
        let registry = PanelRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = next_connection_id();
        registry.register(id, tx);
        assert_eq!(registry.active_count(), 1);
        registry.unregister(id);
        assert_eq!(registry.active_count(), 0);
    }
}
