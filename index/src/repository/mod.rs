//! A durable store of per-shard [full::FullIndex]es.
//!
//! [Repository] keeps one serialized [full::FullIndex] per shard [Key] in any [crate::store::Store]
//! and answers questions about what it holds (existence, exact stored size, count, total size,
//! and the set of keys) without reading the indexes themselves.
//!
//! # Accounting
//!
//! On [Repository::init], the store is scanned and the size of every stored value is recorded
//! in an in-memory directory. [Repository::stat], [Repository::len], [Repository::size], and
//! [Repository::keys] are answered from this directory. The size reported for a key is exactly
//! the number of bytes [full::FullIndex::marshal] produced when it was added.
//!
//! The directory assumes the [Repository] is the only writer to its store.
//!
//! # Concurrency
//!
//! All operations take `&self` and may be called from many threads. Writes ([Repository::add]
//! and [Repository::remove]) are serialized with each other and update the directory as soon as
//! the store mutation returns. The directory is only locked for that in-memory update, so
//! [Repository::stat], [Repository::len], [Repository::size], and [Repository::keys] never wait
//! on the medium. Reads ([Repository::get]) go straight to the store and are never blocked by
//! writes; because the store replaces values atomically, a read observes either the previous or
//! the new index.
//!
//! # Errors
//!
//! Callers can always distinguish an absent index ([Error::NotFound]) from a corrupt one
//! ([Error::Format]) and from a failure of the underlying medium ([Error::Store]). Nothing is
//! retried.
//!
//! A store mutation that fails may still have been applied (for example, a rename that landed
//! before the directory sync failed). Before returning the error, the entry for that key is
//! re-read from the store so accounting matches whatever was actually stored.
//!
//! # Example
//!
//! ```rust
//! use cid::Cid;
//! use commonware_index::{
//!     full::{FullIndex, Index},
//!     repository::{Config, Repository},
//!     store::memory::Memory,
//!     Key,
//! };
//! use prometheus_client::registry::Registry;
//!
//! // Create a repository
//! let mut registry = Registry::default();
//! let repository = Repository::init(Memory::default(), Config::default(), &mut registry).unwrap();
//!
//! // Add an index
//! let cid = Cid::try_from("bafykbzaceaeqhm77anl5mv2wjkmh4ofyf6s6eww3ujfmhtsfab65vi3rlccaq").unwrap();
//! let mut index = Index::default();
//! index.set(cid, 10);
//! let key = Key::from("shard-key-1");
//! repository.add(&key, &index).unwrap();
//! assert_eq!(repository.stat(&key).size, index.encoded_len() as u64);
//!
//! // Look up an offset
//! let index: Index = repository.get(&key).unwrap();
//! assert_eq!(index.offset(&cid).unwrap(), 10);
//!
//! // Remove the index
//! assert!(repository.remove(&key).unwrap());
//! assert!(repository.is_empty());
//! ```

use crate::{full, store, Key};
use thiserror::Error;

mod storage;
pub use storage::{Keys, Repository};

/// Errors that can occur when interacting with a [Repository].
#[derive(Debug, Error)]
pub enum Error {
    #[error("index not found: {0}")]
    NotFound(Key),
    #[error("index corrupt: {0}: {1}")]
    Format(Key, full::Error),
    #[error("marshal failed: {0}")]
    Marshal(full::Error),
    #[error("store error: {0}")]
    Store(#[from] store::Error),
}

/// Configuration for a [Repository].
#[derive(Clone, Default)]
pub struct Config {
    /// The configuration used when decoding stored indexes.
    pub codec_config: full::Config,
}

/// The result of [Repository::stat].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stat {
    /// Whether an index is stored under the key.
    pub exists: bool,

    /// The exact number of bytes stored under the key (zero if it does not exist).
    pub size: u64,
}
