//! Collaborators shared by the push and pull loops.

use std::sync::Arc;
use tokio::sync::watch;

use syncboard_storage::RemoteStore;

use crate::config::SyncConfig;
use crate::gate::RemoteGate;
use crate::local::LocalEndpoint;
use crate::status::{Notifier, StatusSink};
use crate::suppress::FeedbackSuppressor;

/// Everything a loop needs besides its own state.
#[derive(Clone)]
pub struct SyncContext {
    pub remote: Arc<dyn RemoteStore>,
    pub local: Arc<dyn LocalEndpoint>,
    pub status: Arc<dyn StatusSink>,
    pub notifier: Arc<dyn Notifier>,
    pub gate: RemoteGate,
    pub suppressor: FeedbackSuppressor,
    config: watch::Receiver<SyncConfig>,
}

impl SyncContext {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalEndpoint>,
        status: Arc<dyn StatusSink>,
        notifier: Arc<dyn Notifier>,
        config: watch::Receiver<SyncConfig>,
    ) -> Self {
        Self {
            remote,
            local,
            status,
            notifier,
            gate: RemoteGate::new(),
            suppressor: FeedbackSuppressor::new(),
            config,
        }
    }

    /// Snapshot of the current configuration.
    ///
    /// Loops take one at session or iteration start and keep it for the run.
    pub fn config(&self) -> SyncConfig {
        self.config.borrow().clone()
    }
}
