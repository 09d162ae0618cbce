//! Built-in sync server lifecycle.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use syncboard_common::Result;
use syncboard_storage::PAYLOAD_DIRNAME;
use syncboard_sync::{Notifier, StatusSink};

use crate::config::ServerConfig;
use crate::routes::router;

/// Status service name of the sync server.
pub const SERVER_SERVICE: &str = "server";

/// Notification title when the server cannot start.
pub const STARTUP_FAILED_TITLE: &str = "Sync server failed to start";

struct RunningServer {
    address: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

struct ServerState {
    config: ServerConfig,
    running: Option<RunningServer>,
}

/// Serves a remote directory to other devices over HTTP.
///
/// The server follows its configuration: it restarts whenever the
/// configuration changes and stays down while switched off. Startup
/// failures are reported as an error status and one notification.
pub struct ServerService {
    root: PathBuf,
    status: Arc<dyn StatusSink>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<ServerState>,
}

impl ServerService {
    /// Create a stopped server for the layout under `root`.
    pub fn new(root: impl AsRef<Path>, status: Arc<dyn StatusSink>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            status,
            notifier,
            state: Mutex::new(ServerState {
                config: ServerConfig::default(),
                running: None,
            }),
        }
    }

    /// Apply `config` and (re)start the server if it is switched on.
    ///
    /// # Errors
    /// - Invalid configuration, unusable root, or the address cannot be bound
    pub async fn start(&self, config: ServerConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        state.config = config;
        self.restart(&mut state).await
    }

    /// Apply `config`, restarting only when it differs from the current one.
    ///
    /// # Errors
    /// - See [`start`](Self::start)
    pub async fn reconfigure(&self, config: ServerConfig) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.config == config {
            return Ok(());
        }
        debug!("Server configuration changed");
        state.config = config;
        self.restart(&mut state).await
    }

    /// Stop serving and wait for the server task to exit.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        halt(&mut state).await;
        self.status.set_status(SERVER_SERVICE, "Stopped.", false);
    }

    /// Address the server is listening on, if running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .await
            .running
            .as_ref()
            .map(|running| running.address)
    }

    pub async fn config(&self) -> ServerConfig {
        self.state.lock().await.config.clone()
    }

    async fn restart(&self, state: &mut ServerState) -> Result<()> {
        halt(state).await;
        self.status.set_status(SERVER_SERVICE, "Stopped.", false);
        if !state.config.switch_on {
            return Ok(());
        }

        match self.launch(&state.config).await {
            Ok(running) => {
                info!(address = %running.address, root = %self.root.display(), "Sync server listening");
                state.running = Some(running);
                self.status.set_status(SERVER_SERVICE, "Running.", false);
                Ok(())
            }
            Err(err) => {
                error!("Failed to start sync server: {}", err);
                let message = err.to_string();
                self.status.set_status(SERVER_SERVICE, &message, true);
                self.notifier.notify(STARTUP_FAILED_TITLE, &message);
                Err(err)
            }
        }
    }

    async fn launch(&self, config: &ServerConfig) -> Result<RunningServer> {
        config.validate()?;
        tokio::fs::create_dir_all(self.root.join(PAYLOAD_DIRNAME)).await?;

        let listener = TcpListener::bind(config.address()).await?;
        let address = listener.local_addr()?;
        let app = router(self.root.clone(), config);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
            {
                error!("Sync server failed: {}", err);
            }
        });

        Ok(RunningServer {
            address,
            shutdown,
            task,
        })
    }
}

async fn halt(state: &mut ServerState) {
    if let Some(running) = state.running.take() {
        running.shutdown.cancel();
        let _ = running.task.await;
        debug!(address = %running.address, "Sync server stopped");
    }
}
