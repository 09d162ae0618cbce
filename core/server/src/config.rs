//! Sync server configuration.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use syncboard_common::{Error, Result};

/// Configuration of the built-in sync server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Serve at all.
    pub switch_on: bool,
    pub bind: IpAddr,
    /// Listening port; 0 picks a free one.
    pub port: u16,
    /// Basic authentication user.
    pub user_name: String,
    pub password: String,
    /// Largest accepted request body, in bytes.
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            switch_on: false,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5033,
            user_name: "admin".to_string(),
            password: "admin".to_string(),
            max_upload_size: 100 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Socket address to listen on.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Check the configuration can start a server.
    ///
    /// # Errors
    /// - Empty user name, or one containing `:` (unusable in basic auth)
    pub fn validate(&self) -> Result<()> {
        if self.user_name.is_empty() || self.user_name.contains(':') {
            return Err(Error::Config(format!(
                "Invalid server user name: {:?}",
                self.user_name
            )));
        }
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize configuration from JSON. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_off() {
        let config = ServerConfig::default();
        assert!(!config.switch_on);
        assert_eq!(config.address().port(), 5033);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ServerConfig::from_json(r#"{"switch_on": true, "port": 8080}"#).unwrap();

        assert!(config.switch_on);
        assert_eq!(config.port, 8080);
        assert_eq!(config.user_name, "admin");
    }

    #[test]
    fn test_colon_in_user_name_rejected() {
        let config = ServerConfig {
            user_name: "a:b".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
