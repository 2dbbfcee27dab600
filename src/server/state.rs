//! Daemon-wide shared state: composes the config snapshot, the state
//! engine, and the panel registry behind cheap-to-clone `Arc`s, the way
//! the teacher composes its root `GatewayState` out of `RoutingState` and
//! `InfraState` sub-states.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{Notify, Semaphore};

use crate::config::DaemonConfig;
use crate::engine::StateEngine;
use crate::server::broadcast::PanelRegistry;

#[derive(Clone)]
pub struct DaemonState {
    pub config: Arc<ArcSwap<DaemonConfig>>,
    pub engine: Arc<StateEngine>,
    pub registry: Arc<PanelRegistry>,
    /// Bounds simultaneous accepted connections to `max_active`; a
    /// connection task holds a permit for its lifetime.
    pub active_slots: Arc<Semaphore>,
    pub shutdown: Arc<Notify>,
}

impl DaemonState {
    pub fn new(config: DaemonConfig, engine: Arc<StateEngine>, shutdown: Arc<Notify>) -> Self {
        let active_slots = Arc::new(Semaphore::new(config.max_active));
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            engine,
            registry: PanelRegistry::new(),
            active_slots,
            shutdown,
        }
    }

    pub fn config(&self) -> Arc<DaemonConfig> {
        self.config.load_full()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}
