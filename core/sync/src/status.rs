//! Status and notification collaborators.
//!
//! The coordinator reports what it is doing through a [`StatusSink`]
//! (frequent, fire-and-forget) and tells the user about failure episodes
//! through a [`Notifier`] (rare). Neither may block the calling loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use syncboard_storage::{NoProgress, ProgressReporter};

/// Status service name of the push loop.
pub const PUSH_SERVICE: &str = "push";

/// Status service name of the pull loop.
pub const PULL_SERVICE: &str = "pull";

/// Transfer shown as a visual state (an animated tray icon, for instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Activity {
    Uploading,
    Downloading,
}

/// Receives status text and visual activity changes.
pub trait StatusSink: Send + Sync {
    /// Replace the status line of `service`.
    fn set_status(&self, service: &str, message: &str, is_error: bool);

    /// Show or clear a transfer activity.
    fn set_activity(&self, _activity: Activity, _active: bool) {}
}

/// Delivers user-visible notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);

    /// Progress display for a download.
    fn progress(&self, _title: &str, _subject: &str) -> Box<dyn ProgressReporter> {
        Box::new(NoProgress)
    }
}

/// Status sink writing to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatus;

impl StatusSink for TracingStatus {
    fn set_status(&self, service: &str, message: &str, is_error: bool) {
        if is_error {
            warn!(service, "{}", message);
        } else {
            debug!(service, "{}", message);
        }
    }

    fn set_activity(&self, activity: Activity, active: bool) {
        debug!(?activity, active, "Activity changed");
    }
}

/// Notifier writing to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, title: &str, message: &str) {
        warn!("{}: {}", title, message);
    }

    fn progress(&self, title: &str, subject: &str) -> Box<dyn ProgressReporter> {
        Box::new(LoggedProgress {
            label: format!("{} {}", title, subject),
            last_quarter: AtomicU64::new(0),
        })
    }
}

/// Logs a download every quarter of the way.
struct LoggedProgress {
    label: String,
    last_quarter: AtomicU64,
}

impl ProgressReporter for LoggedProgress {
    fn report(&self, transferred: u64, total: Option<u64>) {
        let Some(total) = total.filter(|total| *total > 0) else {
            return;
        };
        let quarter = transferred.saturating_mul(4) / total;
        if quarter > self.last_quarter.swap(quarter, Ordering::SeqCst) {
            debug!("{}: {}%", self.label, (quarter * 25).min(100));
        }
    }

    fn finish(&self) {
        info!("{}: done", self.label);
    }

    fn cancel(&self) {
        debug!("{}: cancelled", self.label);
    }
}

/// A status update captured by [`RecordingStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub service: String,
    pub message: String,
    pub is_error: bool,
}

/// Status sink that keeps every update, for tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingStatus {
    statuses: Mutex<Vec<StatusRecord>>,
    activities: Mutex<Vec<(Activity, bool)>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All status updates, oldest first.
    pub fn statuses(&self) -> Vec<StatusRecord> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Latest status of `service`.
    pub fn last_status(&self, service: &str) -> Option<StatusRecord> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|record| record.service == service)
            .cloned()
    }

    /// All activity changes, oldest first.
    pub fn activities(&self) -> Vec<(Activity, bool)> {
        self.activities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// How many times `activity` was cleared.
    pub fn cleared(&self, activity: Activity) -> usize {
        self.activities()
            .iter()
            .filter(|(recorded, active)| *recorded == activity && !*active)
            .count()
    }
}

impl StatusSink for RecordingStatus {
    fn set_status(&self, service: &str, message: &str, is_error: bool) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(StatusRecord {
                service: service.to_string(),
                message: message.to_string(),
                is_error,
            });
    }

    fn set_activity(&self, activity: Activity, active: bool) {
        self.activities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((activity, active));
    }
}

/// Notifier that keeps every notification, for tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(title, message)` pairs, oldest first.
    pub fn notifications(&self) -> Vec<(String, String)> {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.notifications().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((title.to_string(), message.to_string()));
    }
}
