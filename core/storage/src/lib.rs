//! Remote store abstraction for Syncboard.
//!
//! The synchronization coordinator talks to the remote side only through the
//! [`RemoteStore`] trait. This crate provides the trait, an in-memory store
//! with fault injection, and a directory-backed store using the shared
//! profile layout.
//!
//! # Design Principles
//! - Remote stores know nothing about push/pull policy
//! - Every call takes the session's cancellation token
//! - Remote state is described by a profile document plus an optional payload file

pub mod directory;
pub mod memory;
pub mod profile;
pub mod provider;

pub use directory::{payload_path, write_atomic, DirectoryRemote};
pub use memory::{Fault, MemoryRemote, Operation};
pub use profile::{RemoteProfile, PROFILE_FILENAME, PAYLOAD_DIRNAME};
pub use provider::{load_payload, NoProgress, ProgressReporter, RemoteStore};
