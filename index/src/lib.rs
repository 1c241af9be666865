//! Persist and retrieve per-shard content indexes.
//!
//! A shard is an immutable archive of content-addressed blocks. Each shard has a
//! [full::FullIndex]: the complete mapping from [cid::Cid] to the byte offset of that
//! content within the shard. A [repository::Repository] durably stores these indexes,
//! keyed by shard [Key], on top of any [store::Store] backend (memory, disk, or remote
//! object storage).
//!
//! # Status
//!
//! `commonware-index` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.

pub mod full;
mod key;
pub use key::Key;
pub mod repository;
pub mod store;
