//! Remote to local reconciliation.
//!
//! The pull loop polls the remote profile on an interval and writes changed
//! content to the local clipboard. It stops while a push is active and is
//! started again from outside; it never restarts itself.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use syncboard_common::{ContentKind, ContentSnapshot, Result};

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::retry::RetryReporter;
use crate::session::{cancellable, remote_call, sleep_or_cancel, SyncSession};
use crate::state::{LoopState, PullOutcome};
use crate::status::{Activity, StatusSink, PULL_SERVICE};

/// Title of the notification sent when pulls keep failing.
const FAILURE_TITLE: &str = "Clipboard download failed";

/// State carried from one iteration to the next.
///
/// Held for a whole iteration, which keeps iterations strictly sequential
/// even across a stop and restart.
struct PullMemory {
    last_known_remote: Option<ContentSnapshot>,
    last_oversized: Option<ContentSnapshot>,
    reporter: RetryReporter,
}

/// The loop task currently scheduled.
struct RunningLoop {
    session: SyncSession,
    task: JoinHandle<()>,
}

/// Downloads remote clipboard changes.
pub struct PullLoop {
    ctx: SyncContext,
    switched_on: AtomicBool,
    running: Mutex<Option<RunningLoop>>,
    next_id: AtomicU64,
    memory: tokio::sync::Mutex<PullMemory>,
}

impl PullLoop {
    pub fn new(ctx: SyncContext) -> Self {
        let reporter = RetryReporter::new(
            PULL_SERVICE,
            ctx.config().retry_times,
            FAILURE_TITLE,
            ctx.status.clone(),
            ctx.notifier.clone(),
        );
        Self {
            ctx,
            switched_on: AtomicBool::new(false),
            running: Mutex::new(None),
            next_id: AtomicU64::new(0),
            memory: tokio::sync::Mutex::new(PullMemory {
                last_known_remote: None,
                last_oversized: None,
                reporter,
            }),
        }
    }

    /// Switch the loop on and start it, unless a push is in progress; the
    /// end of that push starts it instead.
    pub fn enable(self: &Arc<Self>) {
        let was_on = self.switched_on.swap(true, Ordering::SeqCst);
        if was_on && self.state() == LoopState::Running {
            return;
        }
        if self.ctx.suppressor.is_pushing() {
            debug!("Pull enabled, waiting for push to finish");
            return;
        }
        self.launch();
    }

    /// Switch the loop off and cancel the running iteration.
    pub fn disable(&self) {
        self.switched_on.store(false, Ordering::SeqCst);
        self.halt();
        self.ctx.status.set_status(PULL_SERVICE, "Stopped.", false);
    }

    /// Stop for the duration of a push.
    pub fn suspend(&self) {
        if self.halt().is_some() {
            debug!("Push started, pull suspended");
        }
    }

    /// Start again after a push, if still switched on and enabled.
    pub fn resume(self: &Arc<Self>) {
        if self.is_wanted() {
            debug!("Push stopped, pull resumed");
            self.launch();
        }
    }

    /// Restart with the current configuration, if switched on.
    pub fn restart(self: &Arc<Self>) {
        self.halt();
        if self.is_wanted() && !self.ctx.suppressor.is_pushing() {
            self.launch();
        }
    }

    /// Stop for good and wait until the loop task has exited.
    pub async fn shutdown(&self) {
        self.switched_on.store(false, Ordering::SeqCst);
        if let Some(task) = self.halt() {
            let _ = task.await;
        }
        self.ctx.status.set_status(PULL_SERVICE, "Stopped.", false);
    }

    pub fn state(&self) -> LoopState {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        match running.as_ref() {
            Some(current) if !current.session.token.is_cancelled() && !current.task.is_finished() => {
                LoopState::Running
            }
            _ => LoopState::Stopped,
        }
    }

    /// Remote snapshot seen by the last iteration that reached a decision.
    pub async fn last_known_remote(&self) -> Option<ContentSnapshot> {
        self.memory.lock().await.last_known_remote.clone()
    }

    /// Run one iteration.
    ///
    /// Failures are reported through status and, at the threshold, one
    /// notification; they are also returned to the caller. Cancellation is
    /// returned but never reported.
    pub async fn poll_once(&self, cancel: &CancellationToken) -> Result<PullOutcome> {
        let config = self.ctx.config();
        let mut memory = cancellable(cancel, async { Ok(self.memory.lock().await) }).await?;
        memory.reporter.set_threshold(config.retry_times);

        self.ctx
            .status
            .set_status(PULL_SERVICE, "Reading remote profile.", false);

        match self.reconcile(&mut memory, &config, cancel).await {
            Ok(outcome) => {
                memory.reporter.record_success();
                self.ctx.status.set_status(PULL_SERVICE, "Running.", false);
                Ok(outcome)
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                warn!(transient = e.is_transient(), "Pull failed: {}", e);
                memory.reporter.record_failure(&e);
                Err(e)
            }
        }
    }

    fn is_wanted(&self) -> bool {
        self.switched_on.load(Ordering::SeqCst) && self.ctx.config().pull_enabled
    }

    /// Replace whatever loop task is scheduled with a fresh one.
    fn launch(self: &Arc<Self>) {
        let session = SyncSession {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            token: CancellationToken::new(),
            started: Instant::now(),
        };
        let this = Arc::clone(self);
        let loop_session = session.clone();
        let task = tokio::spawn(async move { this.run(loop_session).await });

        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(RunningLoop { session, task });
        if let Some(previous) = previous {
            previous.session.token.cancel();
        }
    }

    /// Cancel the scheduled loop task, handing it back to the caller.
    fn halt(&self) -> Option<JoinHandle<()>> {
        let previous = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        previous.session.token.cancel();
        Some(previous.task)
    }

    async fn run(self: Arc<Self>, session: SyncSession) {
        info!(session = session.id, "Pull loop started");
        loop {
            match self.poll_once(&session.token).await {
                Ok(outcome) => debug!(session = session.id, ?outcome, "Pull iteration finished"),
                Err(e) if e.is_cancelled() => break,
                Err(_) => {}
            }

            let interval = self.ctx.config().poll_interval;
            if sleep_or_cancel(&session.token, interval).await.is_err() {
                break;
            }
        }
        info!(
            session = session.id,
            elapsed_ms = session.elapsed().as_millis() as u64,
            "Pull loop stopped"
        );
    }

    async fn reconcile(
        &self,
        memory: &mut PullMemory,
        config: &SyncConfig,
        cancel: &CancellationToken,
    ) -> Result<PullOutcome> {
        let gate = self.ctx.gate.acquire(PULL_SERVICE, cancel).await?;

        let remote = remote_call(
            cancel,
            config.request_timeout,
            self.ctx.remote.fetch_snapshot(cancel),
        )
        .await?;
        debug!("Remote is {}", remote);

        if remote.kind() == ContentKind::Unknown {
            return Ok(PullOutcome::Unsyncable);
        }
        if remote.same_as(memory.last_known_remote.as_ref()) {
            return Ok(PullOutcome::Unchanged);
        }
        if remote.is_file_like() && remote.size().unwrap_or(0) > config.max_file_size {
            if !remote.same_as(memory.last_oversized.as_ref()) {
                info!("Not pulling {}, larger than {} bytes", remote, config.max_file_size);
                self.ctx.notifier.notify(
                    "Remote content too large",
                    &format!("{} was not downloaded", remote.describe()),
                );
                memory.last_oversized = Some(remote);
            }
            return Ok(PullOutcome::Oversized);
        }

        let local = cancellable(cancel, self.ctx.local.capture()).await?;
        if local.kind() == ContentKind::Unknown {
            debug!("Local content is not syncable, skipping pull");
            return Ok(PullOutcome::Unsyncable);
        }
        if local.same(&remote) {
            memory.last_known_remote = Some(remote);
            return Ok(PullOutcome::InSync);
        }

        let _downloading = Downloading::start(self.ctx.status.clone());
        let materialized = self.materialize(&remote, cancel).await?;
        drop(gate);

        self.write_local(&materialized, config).await?;
        info!("Clipboard synced from remote: {}", remote.describe());
        memory.last_known_remote = Some(remote);
        Ok(PullOutcome::Applied)
    }

    /// Fetch the payload of file-like content. The local clipboard is only
    /// written once this has completed.
    async fn materialize(
        &self,
        remote: &ContentSnapshot,
        cancel: &CancellationToken,
    ) -> Result<ContentSnapshot> {
        if remote.is_materialized() {
            return Ok(remote.clone());
        }

        let subject = remote.file_name().unwrap_or_else(|| remote.describe());
        let progress = self.ctx.notifier.progress("Downloading remote file", &subject);
        let fetched = cancellable(
            cancel,
            self.ctx.remote.fetch_payload(remote, cancel, progress.as_ref()),
        )
        .await;

        match fetched {
            Ok(data) => Ok(remote.with_payload(data)),
            Err(e) => {
                progress.cancel();
                Err(e)
            }
        }
    }

    /// Write to the local clipboard with push suppressed.
    ///
    /// The pull-started signal stays up for the settle delay after the
    /// write, because the clipboard may report the change late. The delay is
    /// not cancellable.
    async fn write_local(&self, snapshot: &ContentSnapshot, config: &SyncConfig) -> Result<()> {
        let _pulling = self.ctx.suppressor.pull_started();
        self.ctx.local.apply(snapshot).await?;
        tokio::time::sleep(config.settle_delay).await;
        Ok(())
    }
}

/// Downloading visual state; cleared on drop.
struct Downloading {
    status: Arc<dyn StatusSink>,
}

impl Downloading {
    fn start(status: Arc<dyn StatusSink>) -> Self {
        status.set_activity(Activity::Downloading, true);
        Self { status }
    }
}

impl Drop for Downloading {
    fn drop(&mut self) {
        self.status.set_activity(Activity::Downloading, false);
    }
}
