//! Local to remote reconciliation.
//!
//! Every local change starts a push session. A new session supersedes the
//! one in flight, but the "uploading" indicator follows the number of live
//! sessions, so it clears only once the last of them has finished.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use syncboard_common::{ContentKind, ContentSnapshot, Error, Result};

use crate::config::SyncConfig;
use crate::context::SyncContext;
use crate::retry::RetryReporter;
use crate::session::{cancellable, remote_call, sleep_or_cancel, SessionCounter, SessionSlot, SyncSession};
use crate::state::PushOutcome;
use crate::status::{Activity, StatusSink, PUSH_SERVICE};
use crate::suppress::FeedbackSuppressor;

/// Uploads local clipboard changes.
pub struct PushLoop {
    ctx: SyncContext,
    slot: SessionSlot,
    sessions: Arc<SessionCounter>,
}

impl PushLoop {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx,
            slot: SessionSlot::new(),
            sessions: Arc::new(SessionCounter::new()),
        }
    }

    /// Mark the loop as accepting changes.
    pub fn start(&self) {
        self.ctx.status.set_status(PUSH_SERVICE, "Running.", false);
    }

    /// Cancel the session in flight and stop reporting.
    pub fn stop(&self) {
        self.slot.cancel();
        self.ctx.status.set_status(PUSH_SERVICE, "Stopped.", false);
    }

    /// Sessions started and not yet finished.
    pub fn active_sessions(&self) -> u32 {
        self.sessions.active()
    }

    /// Cancel the session in flight and wait until every session has
    /// finished its cleanup.
    pub async fn shutdown(&self) {
        self.slot.cancel();
        self.sessions.wait_idle().await;
        self.ctx.status.set_status(PUSH_SERVICE, "Stopped.", false);
    }

    /// React to one local change notification.
    ///
    /// Returns `None` when push is disabled or the change was written by a
    /// pull; no session is started and nothing touches the network.
    pub fn trigger(self: &Arc<Self>) -> Option<JoinHandle<PushOutcome>> {
        let config = self.ctx.config();
        if !config.push_enabled {
            debug!("Push disabled, ignoring local change");
            return None;
        }
        if self.ctx.suppressor.is_pulling() {
            debug!("Local change written by pull, not pushing");
            return None;
        }

        let (session, active) = self.begin();
        let this = Arc::clone(self);
        Some(tokio::spawn(async move {
            this.run(session, active, config).await
        }))
    }

    /// Push the current local content and wait for the outcome.
    ///
    /// Runs regardless of the enabled flag, superseding any session in flight.
    pub async fn sync_now(&self) -> PushOutcome {
        let config = self.ctx.config();
        let (session, active) = self.begin();
        self.run(session, active, config).await
    }

    /// Register a session before any await point, so overlapping triggers
    /// observe each other in order.
    fn begin(&self) -> (SyncSession, ActiveSession) {
        let active = ActiveSession::enter(
            self.sessions.clone(),
            self.ctx.status.clone(),
            self.ctx.suppressor.clone(),
        );
        let session = self.slot.supersede();
        debug!(session = session.id, "Push session started");
        (session, active)
    }

    async fn run(&self, session: SyncSession, _active: ActiveSession, config: SyncConfig) -> PushOutcome {
        let local = match cancellable(&session.token, self.ctx.local.capture()).await {
            Ok(local) => local,
            Err(Error::Cancelled) => return PushOutcome::Cancelled,
            Err(e) => {
                warn!(session = session.id, "Failed to read local clipboard: {}", e);
                self.ctx
                    .status
                    .set_status(PUSH_SERVICE, &format!("Error. {}", e), true);
                return PushOutcome::Failed { attempts: 0 };
            }
        };

        if local.kind() == ContentKind::Unknown {
            debug!(session = session.id, "Local content is not syncable");
            return PushOutcome::Unsyncable;
        }

        let attempts = config.attempts();
        let mut reporter = RetryReporter::new(
            PUSH_SERVICE,
            attempts,
            format!("Upload failed: {}", local.describe()),
            self.ctx.status.clone(),
            self.ctx.notifier.clone(),
        );

        for attempt in 1..=attempts {
            match self.attempt(&local, &session.token, &config).await {
                Ok(true) => {
                    reporter.record_success();
                    info!(session = session.id, attempt, "Uploaded {}", local);
                    return PushOutcome::Uploaded { attempts: attempt };
                }
                Ok(false) => {
                    reporter.record_success();
                    debug!(session = session.id, "Remote is same as local, won't push");
                    return PushOutcome::InSync { attempts: attempt };
                }
                Err(Error::Cancelled) => {
                    debug!(session = session.id, "Push cancelled");
                    return PushOutcome::Cancelled;
                }
                Err(e) => {
                    warn!(
                        session = session.id,
                        attempt,
                        transient = e.is_transient(),
                        "Upload attempt failed: {}",
                        e
                    );
                    reporter.record_failure(&e);
                }
            }

            if attempt < attempts
                && sleep_or_cancel(&session.token, config.retry_interval).await.is_err()
            {
                debug!(session = session.id, "Push cancelled between attempts");
                return PushOutcome::Cancelled;
            }
        }

        PushOutcome::Failed { attempts }
    }

    /// One gate-protected compare-and-upload. Returns whether anything was
    /// uploaded.
    async fn attempt(
        &self,
        local: &ContentSnapshot,
        cancel: &CancellationToken,
        config: &SyncConfig,
    ) -> Result<bool> {
        let _gate = self.ctx.gate.acquire(PUSH_SERVICE, cancel).await?;

        let remote = remote_call(
            cancel,
            config.request_timeout,
            self.ctx.remote.fetch_snapshot(cancel),
        )
        .await?;
        if remote.same(local) {
            return Ok(false);
        }

        remote_call(
            cancel,
            config.request_timeout,
            self.ctx.remote.upload(local, cancel),
        )
        .await?;
        Ok(true)
    }
}

/// A registered push session; unregisters on drop.
///
/// The last session to leave clears the uploading state and signals
/// push-stopped, whether it finished, failed, was cancelled or aborted.
struct ActiveSession {
    sessions: Arc<SessionCounter>,
    status: Arc<dyn StatusSink>,
    suppressor: FeedbackSuppressor,
}

impl ActiveSession {
    fn enter(
        sessions: Arc<SessionCounter>,
        status: Arc<dyn StatusSink>,
        suppressor: FeedbackSuppressor,
    ) -> Self {
        sessions.enter();
        status.set_activity(Activity::Uploading, true);
        status.set_status(PUSH_SERVICE, "Uploading.", false);
        suppressor.push_started();
        Self {
            sessions,
            status,
            suppressor,
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if self.sessions.leave() {
            self.status.set_activity(Activity::Uploading, false);
            self.status.set_status(PUSH_SERVICE, "Running.", false);
            self.suppressor.push_stopped();
        }
        self.sessions.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryClipboard;
    use crate::status::{RecordingNotifier, RecordingStatus};
    use std::time::Duration;
    use syncboard_storage::{Fault, MemoryRemote, Operation};
    use tokio::sync::watch;

    struct Fixture {
        push: Arc<PushLoop>,
        remote: Arc<MemoryRemote>,
        local: Arc<MemoryClipboard>,
        status: Arc<RecordingStatus>,
        notifier: Arc<RecordingNotifier>,
        suppressor: FeedbackSuppressor,
        _config: watch::Sender<SyncConfig>,
    }

    fn test_config() -> SyncConfig {
        SyncConfig {
            retry_times: 3,
            retry_interval: Duration::from_millis(5),
            request_timeout: Duration::from_millis(200),
            ..SyncConfig::default()
        }
    }

    fn fixture(remote: MemoryRemote, local: MemoryClipboard, config: SyncConfig) -> Fixture {
        let remote = Arc::new(remote);
        let local = Arc::new(local);
        let status = Arc::new(RecordingStatus::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let (tx, rx) = watch::channel(config);
        let ctx = SyncContext::new(
            remote.clone(),
            local.clone(),
            status.clone(),
            notifier.clone(),
            rx,
        );
        let suppressor = ctx.suppressor.clone();
        Fixture {
            push: Arc::new(PushLoop::new(ctx)),
            remote,
            local,
            status,
            notifier,
            suppressor,
            _config: tx,
        }
    }

    #[tokio::test]
    async fn test_same_content_is_not_uploaded() {
        let remote = MemoryRemote::with_content(&ContentSnapshot::text("hello"))
            .await
            .unwrap();
        let local = MemoryClipboard::with_content(ContentSnapshot::text("hello"));
        let f = fixture(remote, local, test_config());

        let outcome = f.push.trigger().unwrap().await.unwrap();

        assert_eq!(outcome, PushOutcome::InSync { attempts: 1 });
        assert_eq!(f.remote.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_different_content_uploaded_once() {
        let remote = MemoryRemote::with_content(&ContentSnapshot::text("b"))
            .await
            .unwrap();
        let local = MemoryClipboard::with_content(ContentSnapshot::text("a"));
        let f = fixture(remote, local, test_config());

        let outcome = f.push.trigger().unwrap().await.unwrap();

        assert_eq!(outcome, PushOutcome::Uploaded { attempts: 1 });
        let uploaded = f.remote.uploaded().await;
        assert_eq!(uploaded.len(), 1);
        assert_eq!(uploaded[0].as_text(), Some("a"));
        assert_eq!(f.status.last_status(PUSH_SERVICE).unwrap().message, "Running.");
        assert!(!f.suppressor.is_pushing());
    }

    #[tokio::test]
    async fn test_transient_failures_below_threshold_are_silent() {
        let local = MemoryClipboard::with_content(ContentSnapshot::text("a"));
        let f = fixture(MemoryRemote::new(), local, test_config());
        f.remote
            .fail_next(Operation::Upload, 2, Fault::Transport("reset".to_string()))
            .await;

        let outcome = f.push.sync_now().await;

        assert_eq!(outcome, PushOutcome::Uploaded { attempts: 3 });
        assert_eq!(f.remote.upload_count(), 3);
        assert_eq!(f.notifier.count(), 0);
        assert!(f
            .status
            .statuses()
            .iter()
            .any(|record| record.is_error && record.message.contains("Failed times: 2")));
    }

    #[tokio::test]
    async fn test_exhausted_retries_notify_once_with_last_error() {
        let local = MemoryClipboard::with_content(ContentSnapshot::text("a"));
        let f = fixture(MemoryRemote::new(), local, test_config());
        f.remote
            .fail_next(Operation::FetchSnapshot, 2, Fault::Timeout)
            .await;
        f.remote
            .fail_next(Operation::FetchSnapshot, 1, Fault::Transport("host unreachable".to_string()))
            .await;

        let outcome = f.push.sync_now().await;

        assert_eq!(outcome, PushOutcome::Failed { attempts: 3 });
        let notifications = f.notifier.notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, "Upload failed: a");
        assert!(notifications[0].1.contains("host unreachable"));
        assert_eq!(f.remote.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_local_content_is_skipped() {
        let f = fixture(MemoryRemote::new(), MemoryClipboard::new(), test_config());

        let outcome = f.push.sync_now().await;

        assert_eq!(outcome, PushOutcome::Unsyncable);
        assert_eq!(f.remote.call_count(), 0);
        assert_eq!(f.notifier.count(), 0);
    }

    #[tokio::test]
    async fn test_change_during_pull_is_ignored() {
        let local = MemoryClipboard::with_content(ContentSnapshot::text("pulled"));
        let f = fixture(MemoryRemote::new(), local, test_config());

        let pulling = f.suppressor.pull_started();
        assert!(f.push.trigger().is_none());
        drop(pulling);

        assert_eq!(f.remote.call_count(), 0);
        assert_eq!(f.local.capture_count(), 0);
        assert_eq!(f.push.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_disabled_push_ignores_changes() {
        let config = SyncConfig {
            push_enabled: false,
            ..test_config()
        };
        let local = MemoryClipboard::with_content(ContentSnapshot::text("a"));
        let f = fixture(MemoryRemote::new(), local, config);

        assert!(f.push.trigger().is_none());
        assert_eq!(f.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_superseded_session_keeps_counter_consistent() {
        let local = MemoryClipboard::with_content(ContentSnapshot::text("first"));
        let f = fixture(MemoryRemote::new(), local, test_config());
        f.remote.set_latency(Duration::from_millis(50)).await;

        let first = f.push.trigger().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.local.set(ContentSnapshot::text("second")).await;
        let second = f.push.trigger().unwrap();
        assert_eq!(f.push.active_sessions(), 2);

        assert_eq!(first.await.unwrap(), PushOutcome::Cancelled);
        assert!(f.status.cleared(Activity::Uploading) == 0);
        assert!(f.suppressor.is_pushing());

        assert_eq!(second.await.unwrap(), PushOutcome::Uploaded { attempts: 1 });
        assert_eq!(f.push.active_sessions(), 0);
        assert_eq!(f.status.cleared(Activity::Uploading), 1);
        assert!(!f.suppressor.is_pushing());

        let content = f.remote.content().await.unwrap();
        assert_eq!(content.as_text(), Some("second"));
    }

    #[tokio::test]
    async fn test_stop_cancels_session_between_attempts() {
        let config = SyncConfig {
            retry_interval: Duration::from_secs(60),
            ..test_config()
        };
        let local = MemoryClipboard::with_content(ContentSnapshot::text("a"));
        let f = fixture(MemoryRemote::new(), local, config);
        f.remote.fail_next(Operation::Upload, 1, Fault::Timeout).await;

        let session = f.push.trigger().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        f.push.stop();

        let outcome = tokio::time::timeout(Duration::from_secs(1), session).await;
        assert!(matches!(outcome, Ok(Ok(PushOutcome::Cancelled))));
        assert_eq!(f.notifier.count(), 0);
        assert_eq!(f.push.active_sessions(), 0);
    }
}
