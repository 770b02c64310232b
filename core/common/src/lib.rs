//! Common utilities and types shared across VaultSync crates.
//!
//! This module provides the path and timestamp types every replica
//! operation is expressed in, and the shared error type.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{SyncPath, Timestamp};
