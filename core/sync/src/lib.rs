//! Syncboard sync coordinator
//!
//! Keeps the local clipboard and a remote clipboard profile consistent:
//! - A push loop uploads local changes, with bounded retries
//! - A pull loop polls the remote and applies changes locally
//! - A remote gate serializes all remote access between the two
//! - Feedback suppression stops each direction from re-triggering the other
//! - A retry reporter turns failure streaks into status and one notification

pub mod config;
pub mod context;
pub mod engine;
pub mod gate;
pub mod local;
pub mod pull;
pub mod push;
pub mod retry;
pub mod session;
pub mod state;
pub mod status;
pub mod suppress;

// Re-export main types
pub use config::SyncConfig;
pub use context::SyncContext;
pub use engine::SyncEngine;
pub use gate::{GateGuard, RemoteGate};
pub use local::{LocalChange, LocalEndpoint, MemoryClipboard};
pub use pull::PullLoop;
pub use push::PushLoop;
pub use retry::{Escalation, RetryReporter};
pub use session::{SessionCounter, SessionSlot, SyncSession};
pub use state::{LoopState, PullOutcome, PushOutcome};
pub use status::{
    Activity, Notifier, RecordingNotifier, RecordingStatus, StatusRecord, StatusSink,
    TracingNotifier, TracingStatus, PULL_SERVICE, PUSH_SERVICE,
};
pub use suppress::{FeedbackSuppressor, PullActivity};
