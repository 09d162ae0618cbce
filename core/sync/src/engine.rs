//! Sync engine wiring the push and pull loops to their collaborators.

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use syncboard_common::Result;
use syncboard_storage::RemoteStore;

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::local::{LocalChange, LocalEndpoint};
use crate::pull::PullLoop;
use crate::push::PushLoop;
use crate::state::LoopState;
use crate::status::{Notifier, StatusSink};
use crate::suppress::FeedbackSuppressor;

/// Clipboard sync coordinator.
///
/// Owns both loops, feeds local change notifications to the push loop and
/// suspends the pull loop while a push is active.
pub struct SyncEngine {
    ctx: SyncContext,
    config: watch::Sender<SyncConfig>,
    push: Arc<PushLoop>,
    pull: Arc<PullLoop>,
    shutdown: CancellationToken,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine. Nothing runs until [`start`](Self::start).
    ///
    /// # Errors
    /// - The configuration fails [`SyncConfig::validate`]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalEndpoint>,
        status: Arc<dyn StatusSink>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (config, config_rx) = watch::channel(config);
        let ctx = SyncContext::new(remote, local, status, notifier, config_rx);

        Ok(Self {
            push: Arc::new(PushLoop::new(ctx.clone())),
            pull: Arc::new(PullLoop::new(ctx.clone())),
            ctx,
            config,
            shutdown: CancellationToken::new(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Start listening for local changes and polling the remote, as the
    /// configuration allows. Calling it again has no effect.
    pub fn start(&self) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if !listeners.is_empty() || self.shutdown.is_cancelled() {
            return;
        }

        let config = self.config();
        info!(
            remote = self.ctx.remote.name(),
            push = config.push_enabled,
            pull = config.pull_enabled,
            "Starting clipboard sync"
        );

        listeners.push(tokio::spawn(forward_local_changes(
            self.ctx.local.subscribe(),
            self.push.clone(),
            self.shutdown.clone(),
        )));
        listeners.push(tokio::spawn(follow_push_activity(
            self.ctx.suppressor.subscribe_push(),
            self.pull.clone(),
            self.shutdown.clone(),
        )));

        if config.push_enabled {
            self.push.start();
        }
        if config.pull_enabled {
            self.pull.enable();
        }
    }

    /// Replace the configuration and restart what it affects.
    ///
    /// # Errors
    /// - The configuration fails [`SyncConfig::validate`]; nothing changes
    pub fn reconfigure(&self, config: SyncConfig) -> Result<()> {
        config.validate()?;
        let previous = self.config.send_replace(config.clone());
        if previous == config {
            return Ok(());
        }
        debug!(?config, "Configuration changed");

        if previous.push_enabled != config.push_enabled {
            if config.push_enabled {
                self.push.start();
            } else {
                self.push.stop();
            }
        }

        if previous.pull_enabled != config.pull_enabled {
            if config.pull_enabled {
                self.pull.enable();
            } else {
                self.pull.disable();
            }
        } else if config.pull_enabled {
            self.pull.restart();
        }
        Ok(())
    }

    pub fn set_push_enabled(&self, enabled: bool) -> Result<()> {
        self.reconfigure(SyncConfig {
            push_enabled: enabled,
            ..self.config()
        })
    }

    pub fn set_pull_enabled(&self, enabled: bool) -> Result<()> {
        self.reconfigure(SyncConfig {
            pull_enabled: enabled,
            ..self.config()
        })
    }

    /// Stop both loops and the listeners, waiting for them to exit.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.pull.shutdown().await;
        self.push.shutdown().await;

        let listeners: Vec<_> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for listener in listeners {
            let _ = listener.await;
        }
        info!("Clipboard sync stopped");
    }

    /// Current configuration.
    pub fn config(&self) -> SyncConfig {
        self.config.borrow().clone()
    }

    pub fn pull_state(&self) -> LoopState {
        self.pull.state()
    }

    pub fn push(&self) -> &Arc<PushLoop> {
        &self.push
    }

    pub fn pull(&self) -> &Arc<PullLoop> {
        &self.pull
    }

    pub fn suppressor(&self) -> &FeedbackSuppressor {
        &self.ctx.suppressor
    }

    /// Observe push-started (`true`) and push-stopped (`false`).
    pub fn subscribe_push(&self) -> watch::Receiver<bool> {
        self.ctx.suppressor.subscribe_push()
    }

    /// Observe pull-started (`true`) and pull-stopped (`false`).
    pub fn subscribe_pull(&self) -> watch::Receiver<bool> {
        self.ctx.suppressor.subscribe_pull()
    }
}

/// Trigger a push for every local change.
///
/// Missed notifications still mean the content changed, so a lagged
/// receiver triggers once for all of them.
async fn forward_local_changes(
    mut changes: broadcast::Receiver<LocalChange>,
    push: Arc<PushLoop>,
    shutdown: CancellationToken,
) {
    loop {
        let change = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            change = changes.recv() => change,
        };
        match change {
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Local change listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
        // Sessions run detached; their outcome is reported through status.
        let _ = push.trigger();
    }
    debug!("Local change listener stopped");
}

/// Suspend the pull loop while any push session is active.
async fn follow_push_activity(
    mut pushing: watch::Receiver<bool>,
    pull: Arc<PullLoop>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            changed = pushing.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if *pushing.borrow_and_update() {
            pull.suspend();
        } else {
            pull.resume();
        }
    }
    debug!("Push activity listener stopped");
}
