//! Loop states and session outcomes.

use std::fmt;

/// Run state of the pull loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// No iteration is scheduled.
    Stopped,
    /// Iterations run on the poll interval.
    Running,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Stopped => write!(f, "stopped"),
            LoopState::Running => write!(f, "running"),
        }
    }
}

/// How a push session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Local content was uploaded.
    Uploaded { attempts: u32 },
    /// Remote already held the local content; nothing was transferred.
    InSync { attempts: u32 },
    /// Local content cannot be synchronized.
    Unsyncable,
    /// Superseded or stopped before finishing.
    Cancelled,
    /// Every attempt failed.
    Failed { attempts: u32 },
}

impl PushOutcome {
    /// Whether remote and local agree after the session.
    pub fn is_synced(&self) -> bool {
        matches!(self, PushOutcome::Uploaded { .. } | PushOutcome::InSync { .. })
    }
}

/// How a pull iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote content was written locally.
    Applied,
    /// Local already held the remote content.
    InSync,
    /// Remote content has not changed since the last iteration.
    Unchanged,
    /// Remote or local content cannot be synchronized.
    Unsyncable,
    /// Remote file-like content exceeds the size ceiling.
    Oversized,
}
