//! Failure escalation policy shared by the push and pull loops.
//!
//! Every failed attempt updates the status line with the running failure
//! count. Reaching the threshold sends one notification; further failures
//! of the same episode stay on the status line only. A success ends the
//! episode.

use std::sync::Arc;
use tracing::{debug, error};

use syncboard_common::Error;

use crate::status::{Notifier, StatusSink};

/// What a recorded failure led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Status updated; below the threshold.
    Reported { failures: u32 },
    /// Threshold reached; the user was notified.
    Notified { failures: u32 },
    /// Past the threshold; already notified this episode.
    Suppressed { failures: u32 },
}

/// Turns consecutive failures into status updates and one notification.
pub struct RetryReporter {
    service: &'static str,
    threshold: u32,
    title: String,
    failures: u32,
    status: Arc<dyn StatusSink>,
    notifier: Arc<dyn Notifier>,
}

impl RetryReporter {
    /// Create a reporter notifying with `title` on the `threshold`-th
    /// consecutive failure.
    pub fn new(
        service: &'static str,
        threshold: u32,
        title: impl Into<String>,
        status: Arc<dyn StatusSink>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            service,
            threshold: threshold.max(1),
            title: title.into(),
            failures: 0,
            status,
            notifier,
        }
    }

    /// Change the threshold for the rest of the episode.
    pub fn set_threshold(&mut self, threshold: u32) {
        self.threshold = threshold.max(1);
    }

    /// Consecutive failures in the current episode.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failed attempt.
    pub fn record_failure(&mut self, err: &Error) -> Escalation {
        self.failures += 1;
        let failures = self.failures;

        self.status.set_status(
            self.service,
            &format!("Error. Failed times: {}. {}", failures, err),
            true,
        );

        if failures == self.threshold {
            error!(service = self.service, failures, "{}: {}", self.title, err);
            self.notifier.notify(&self.title, &err.to_string());
            Escalation::Notified { failures }
        } else if failures > self.threshold {
            Escalation::Suppressed { failures }
        } else {
            Escalation::Reported { failures }
        }
    }

    /// Record a success. Returns true if it ended a failure episode.
    pub fn record_success(&mut self) -> bool {
        let recovered = self.failures > 0;
        if recovered {
            debug!(service = self.service, failures = self.failures, "Recovered");
        }
        self.failures = 0;
        recovered
    }
}
