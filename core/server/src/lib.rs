//! Built-in sync server for Syncboard.
//!
//! Serves a remote directory (the profile document plus the `file/` payload
//! folder) over HTTP with basic authentication, so other devices can use this
//! machine as their clipboard server. The server restarts whenever its
//! configuration changes.

pub mod config;
pub mod routes;
pub mod service;

pub use config::ServerConfig;
pub use routes::router;
pub use service::{ServerService, SERVER_SERVICE, STARTUP_FAILED_TITLE};
