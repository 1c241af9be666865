//! Durable byte storage keyed by shard.
//!
//! [Store] is the seam between a [crate::repository::Repository] and the medium that holds
//! its bytes. A backend only needs to put, get, remove, stat, and scan opaque values by
//! [Key]; it never interprets what it stores.
//!
//! # Backends
//!
//! - [memory::Memory]: an in-process map, useful for tests and ephemeral deployments.
//! - [disk::Disk]: one file per key in a directory, replaced atomically on write.
//! - [remote::Remote]: objects in a bucket reached through a [remote::Client].
//! - [metered::Metered]: wraps any other backend and records throughput metrics.
//!
//! # Atomicity
//!
//! [Store::put] must replace any previous value atomically: a concurrent [Store::get] observes
//! either the complete old value or the complete new value, never a mix of the two.
//!
//! # Invalid Keys
//!
//! [Store::put] rejects keys that fail [validate_key]. Because such keys can never be stored,
//! every other operation treats them as absent rather than as an error.

use crate::Key;
use bytes::Bytes;
use std::io;
use thiserror::Error;

pub mod disk;
pub mod memory;
pub mod metered;
pub mod remote;

/// The longest [Key] a [Store] accepts.
///
/// Hex-encoding a key of this length plus a temporary suffix still fits within the 255 byte file
/// name limit of common filesystems.
pub const MAX_KEY_LENGTH: usize = 125;

/// Errors that can occur when interacting with a [Store].
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("key invalid: {0}")]
    KeyInvalid(Key),
    #[error("prefix invalid, must only contain alphanumeric, dash ('-'), or underscore ('_') characters: {0}")]
    PrefixInvalid(String),
    #[error("directory corrupt: {0}")]
    DirectoryCorrupt(String),
    #[error("remote {operation} failed for {object}: {message}")]
    Remote {
        operation: &'static str,
        object: String,
        message: String,
    },
}

/// Validate that a key is non-empty and at most [MAX_KEY_LENGTH] bytes.
pub fn validate_key(key: &Key) -> Result<(), Error> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(Error::KeyInvalid(key.clone()));
    }
    Ok(())
}

/// Validate that a namespace prefix contains only allowed characters.
pub(crate) fn validate_prefix(prefix: &str) -> Result<(), Error> {
    if prefix.is_empty()
        || prefix
            .chars()
            .any(|c| !(c.is_ascii_alphanumeric() || ['_', '-'].contains(&c)))
    {
        return Err(Error::PrefixInvalid(prefix.into()));
    }
    Ok(())
}

/// Interface that any medium holding serialized indexes must implement.
pub trait Store: Send + Sync {
    /// Store `value` under `key`, atomically replacing any previous value.
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error>;

    /// Get the value stored under `key`, if any.
    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error>;

    /// Remove the value stored under `key`.
    ///
    /// Returns `true` if a value was removed, `false` if none was present.
    fn remove(&self, key: &Key) -> Result<bool, Error>;

    /// Get the size of the value stored under `key` without reading it.
    fn stat(&self, key: &Key) -> Result<Option<u64>, Error>;

    /// List every key with a stored value, in ascending order.
    fn scan(&self) -> Result<Vec<Key>, Error>;
}
