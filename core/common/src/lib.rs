//! Common utilities and types shared across Syncboard modules.
//!
//! This module provides the clipboard content model and the error taxonomy
//! used by the remote stores and the synchronization coordinator.

pub mod error;
pub mod snapshot;

pub use error::{Error, Result};
pub use snapshot::{ContentKind, ContentSnapshot, Descriptor, FileDescriptor, ImageDescriptor, Payload};
