//! Coordinator configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use syncboard_common::{Error, Result};

/// Configuration for the push and pull loops.
///
/// Loops read a snapshot of this at session or loop start; changes take
/// effect through [`SyncEngine::reconfigure`](crate::SyncEngine::reconfigure).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upload local changes.
    pub push_enabled: bool,
    /// Poll and apply remote changes.
    pub pull_enabled: bool,
    /// Upload attempts per push session, and pull failures before notifying.
    pub retry_times: u32,
    /// Delay between upload attempts.
    #[serde(with = "millis")]
    pub retry_interval: Duration,
    /// Delay between pull iterations.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Largest file-like remote content pulled automatically, in bytes.
    pub max_file_size: u64,
    /// Time the pull-started signal stays up after a local write.
    #[serde(with = "millis")]
    pub settle_delay: Duration,
    /// Deadline for a single remote metadata or upload request.
    #[serde(with = "millis")]
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_enabled: true,
            pull_enabled: true,
            retry_times: 3,
            retry_interval: Duration::from_secs(3),
            poll_interval: Duration::from_secs(3),
            max_file_size: 20 * 1024 * 1024,
            settle_delay: Duration::from_millis(50),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Upload attempts per push session; always at least one.
    pub fn attempts(&self) -> u32 {
        self.retry_times.max(1)
    }

    /// Check the configuration can drive the loops.
    ///
    /// # Errors
    /// - Zero poll interval (the pull loop would spin)
    /// - Zero request timeout
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll_interval must be positive".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::Config("request_timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Durations as whole milliseconds.
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
