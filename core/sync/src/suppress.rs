//! Feedback suppression between the push and pull loops.
//!
//! A pull that writes to the local clipboard causes a local change
//! notification, which must not be pushed back to the remote. A push that
//! rewrites the remote must not be pulled back either. Both directions
//! publish a started/stopped flag; the flags are boolean and last-state-wins,
//! so repeated signals are idempotent and only the latest state matters.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Push/pull activity flags shared by both loops.
#[derive(Debug, Clone)]
pub struct FeedbackSuppressor {
    push: Arc<watch::Sender<bool>>,
    pull: Arc<watch::Sender<bool>>,
}

impl FeedbackSuppressor {
    /// Create a suppressor with both directions idle.
    pub fn new() -> Self {
        let (push, _) = watch::channel(false);
        let (pull, _) = watch::channel(false);
        Self {
            push: Arc::new(push),
            pull: Arc::new(pull),
        }
    }

    /// A push session became active.
    pub fn push_started(&self) {
        if set(&self.push, true) {
            debug!("Push started");
        }
    }

    /// The last push session finished.
    pub fn push_stopped(&self) {
        if set(&self.push, false) {
            debug!("Push stopped");
        }
    }

    /// A pull is about to write locally. The returned guard emits
    /// pull-stopped when dropped.
    pub fn pull_started(&self) -> PullActivity {
        if set(&self.pull, true) {
            debug!("Pull started, local changes are suppressed");
        }
        PullActivity {
            suppressor: self.clone(),
        }
    }

    /// The pull finished writing locally.
    pub fn pull_stopped(&self) {
        if set(&self.pull, false) {
            debug!("Pull stopped, local changes are pushed again");
        }
    }

    /// Whether local changes currently originate from a pull.
    pub fn is_pulling(&self) -> bool {
        *self.pull.borrow()
    }

    /// Whether any push session is active.
    pub fn is_pushing(&self) -> bool {
        *self.push.borrow()
    }

    /// Observe push activity.
    pub fn subscribe_push(&self) -> watch::Receiver<bool> {
        self.push.subscribe()
    }

    /// Observe pull activity.
    pub fn subscribe_pull(&self) -> watch::Receiver<bool> {
        self.pull.subscribe()
    }
}

impl Default for FeedbackSuppressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Set a flag, waking subscribers only on an actual change.
fn set(flag: &watch::Sender<bool>, value: bool) -> bool {
    flag.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}

/// Pull write in progress; emits pull-stopped on drop.
#[must_use = "pull-stopped is emitted as soon as the guard is dropped"]
pub struct PullActivity {
    suppressor: FeedbackSuppressor,
}

impl Drop for PullActivity {
    fn drop(&mut self) {
        self.suppressor.pull_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_guard_suppresses_until_dropped() {
        let suppressor = FeedbackSuppressor::new();
        assert!(!suppressor.is_pulling());

        let guard = suppressor.pull_started();
        assert!(suppressor.is_pulling());

        drop(guard);
        assert!(!suppressor.is_pulling());
    }

    #[test]
    fn test_signals_are_idempotent() {
        let suppressor = FeedbackSuppressor::new();
        let mut rx = suppressor.subscribe_push();

        suppressor.push_started();
        suppressor.push_started();
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());

        suppressor.push_started();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_last_state_wins() {
        let suppressor = FeedbackSuppressor::new();
        let mut rx = suppressor.subscribe_push();

        suppressor.push_started();
        suppressor.push_stopped();
        suppressor.push_started();

        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(suppressor.is_pushing());
    }

    #[test]
    fn test_clones_share_state() {
        let suppressor = FeedbackSuppressor::new();
        let other = suppressor.clone();

        let _guard = other.pull_started();
        assert!(suppressor.is_pulling());
    }
}
