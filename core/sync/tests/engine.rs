//! End-to-end tests driving the engine with in-memory endpoints.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use syncboard_common::ContentSnapshot;
use syncboard_storage::{Fault, MemoryRemote, Operation};
use syncboard_sync::{
    Activity, LoopState, MemoryClipboard, RecordingNotifier, RecordingStatus, SyncConfig,
    SyncEngine, PUSH_SERVICE,
};

struct Harness {
    engine: SyncEngine,
    remote: Arc<MemoryRemote>,
    local: Arc<MemoryClipboard>,
    status: Arc<RecordingStatus>,
    notifier: Arc<RecordingNotifier>,
}

fn fast_config() -> SyncConfig {
    SyncConfig {
        retry_times: 3,
        retry_interval: Duration::from_millis(10),
        poll_interval: Duration::from_millis(20),
        settle_delay: Duration::from_millis(50),
        request_timeout: Duration::from_millis(500),
        ..SyncConfig::default()
    }
}

fn harness(remote: MemoryRemote, local: MemoryClipboard, config: SyncConfig) -> Harness {
    let remote = Arc::new(remote);
    let local = Arc::new(local);
    let status = Arc::new(RecordingStatus::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = SyncEngine::new(
        remote.clone(),
        local.clone(),
        status.clone(),
        notifier.clone(),
        config,
    )
    .unwrap();
    Harness {
        engine,
        remote,
        local,
        status,
        notifier,
    }
}

/// Poll `condition` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_local_change_is_uploaded() {
    let remote = MemoryRemote::with_content(&ContentSnapshot::text("b"))
        .await
        .unwrap();
    let h = harness(
        remote,
        MemoryClipboard::new(),
        SyncConfig {
            pull_enabled: false,
            ..fast_config()
        },
    );
    h.engine.start();

    h.local.set(ContentSnapshot::text("a")).await;

    let remote = h.remote.clone();
    assert!(eventually(|| {
        let remote = remote.clone();
        async move { remote.upload_count() == 1 }
    })
    .await);
    let status = h.status.clone();
    assert!(eventually(|| {
        let status = status.clone();
        async move {
            status
                .last_status(PUSH_SERVICE)
                .is_some_and(|record| record.message == "Running.")
        }
    })
    .await);

    let uploaded = h.remote.uploaded().await;
    assert_eq!(uploaded.len(), 1);
    assert_eq!(uploaded[0].as_text(), Some("a"));
    assert_eq!(h.status.cleared(Activity::Uploading), 1);
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_identical_content_moves_nothing() {
    let remote = MemoryRemote::with_content(&ContentSnapshot::text("hello"))
        .await
        .unwrap();
    let h = harness(
        remote,
        MemoryClipboard::with_content(ContentSnapshot::text("hello")),
        fast_config(),
    );
    h.engine.start();

    let pull = h.engine.pull().clone();
    assert!(eventually(|| {
        let pull = pull.clone();
        async move { pull.last_known_remote().await.is_some() }
    })
    .await);
    let outcome = h.engine.push().sync_now().await;

    assert!(outcome.is_synced());
    assert_eq!(h.remote.upload_count(), 0);
    assert_eq!(h.local.apply_count(), 0);
    let cached = h.engine.pull().last_known_remote().await.unwrap();
    assert_eq!(cached.as_text(), Some("hello"));
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_pulled_content_is_not_pushed_back() {
    let h = harness(
        MemoryRemote::new(),
        MemoryClipboard::with_content(ContentSnapshot::text("local")),
        fast_config(),
    );
    // The clipboard reports the write late, but within the settle delay.
    h.local.set_notify_lag(Duration::from_millis(10)).await;
    h.engine.start();

    h.remote
        .set_content(&ContentSnapshot::text("from another device"))
        .await
        .unwrap();

    let local = h.local.clone();
    assert!(eventually(|| {
        let local = local.clone();
        async move { local.apply_count() == 1 }
    })
    .await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.remote.upload_count(), 0);
    assert_eq!(
        h.local.content().await.as_text(),
        Some("from another device")
    );
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_own_upload_is_not_pulled_back() {
    let h = harness(
        MemoryRemote::new(),
        MemoryClipboard::with_content(ContentSnapshot::text("start")),
        fast_config(),
    );
    h.engine.start();

    h.local.set(ContentSnapshot::text("typed")).await;

    let remote = h.remote.clone();
    assert!(eventually(|| {
        let remote = remote.clone();
        async move { remote.upload_count() == 1 }
    })
    .await);
    let pull = h.engine.pull().clone();
    assert!(eventually(|| {
        let pull = pull.clone();
        async move {
            pull.last_known_remote()
                .await
                .is_some_and(|remote| remote.as_text() == Some("typed"))
        }
    })
    .await);

    assert_eq!(h.local.apply_count(), 0);
    assert_eq!(h.remote.payload_fetch_count(), 0);
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_pull_suspended_during_push() {
    let h = harness(
        MemoryRemote::new(),
        MemoryClipboard::with_content(ContentSnapshot::text("start")),
        fast_config(),
    );
    h.remote.set_latency(Duration::from_millis(60)).await;
    h.engine.start();
    assert_eq!(h.engine.pull().state(), LoopState::Running);

    let session = h.engine.push().trigger().unwrap();
    let pull = h.engine.pull().clone();
    assert!(eventually(|| {
        let pull = pull.clone();
        async move { pull.state() == LoopState::Stopped }
    })
    .await);

    session.await.unwrap();
    assert!(eventually(|| {
        let pull = pull.clone();
        async move { pull.state() == LoopState::Running }
    })
    .await);
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_rapid_changes_clear_uploading_once() {
    let h = harness(
        MemoryRemote::new(),
        MemoryClipboard::new(),
        SyncConfig {
            pull_enabled: false,
            ..fast_config()
        },
    );
    h.remote.set_latency(Duration::from_millis(20)).await;
    h.engine.start();

    for text in ["one", "two", "three"] {
        h.local.set(ContentSnapshot::text(text)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let push = h.engine.push().clone();
    assert!(eventually(|| {
        let push = push.clone();
        async move { push.active_sessions() == 0 }
    })
    .await);

    assert_eq!(h.status.cleared(Activity::Uploading), 1);
    assert!(!h.engine.suppressor().is_pushing());
    let content = h.remote.content().await.unwrap();
    assert_eq!(content.as_text(), Some("three"));
    h.engine.shutdown().await;
}

#[tokio::test]
async fn test_failed_upload_notifies_once() {
    let h = harness(
        MemoryRemote::new(),
        MemoryClipboard::with_content(ContentSnapshot::text("doomed")),
        SyncConfig {
            pull_enabled: false,
            ..fast_config()
        },
    );
    h.remote
        .fail_next(Operation::Upload, 3, Fault::Transport("503 Service Unavailable".to_string()))
        .await;

    let outcome = h.engine.push().sync_now().await;

    assert!(!outcome.is_synced());
    let notifications = h.notifier.notifications();
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].0.contains("doomed"));
    assert!(notifications[0].1.contains("503"));
    assert_eq!(
        h.status.last_status(PUSH_SERVICE).unwrap().message,
        "Running."
    );
}

#[tokio::test]
async fn test_disabling_push_at_runtime() {
    let h = harness(
        MemoryRemote::new(),
        MemoryClipboard::new(),
        SyncConfig {
            pull_enabled: false,
            ..fast_config()
        },
    );
    h.engine.start();
    h.engine.set_push_enabled(false).unwrap();

    h.local.set(ContentSnapshot::text("private")).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.remote.call_count(), 0);
    h.engine.shutdown().await;
}
