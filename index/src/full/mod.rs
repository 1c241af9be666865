//! A complete mapping from content identifier to byte offset within a shard.
//!
//! [FullIndex] is the contract every index implementation satisfies: [FullIndex::set] an
//! offset, look it up with [FullIndex::offset], and move the whole mapping to and from a byte
//! stream with [FullIndex::marshal] and [FullIndex::unmarshal]. [Index] is the production
//! implementation. [mocks::Index] is a minimal reference implementation for exercising
//! components that consume indexes; both produce identical bytes for identical mappings.
//!
//! # Format
//!
//! A marshaled index is a fixed header, a count, the entries in ascending order of their
//! encoded [Cid] bytes, and a trailing checksum:
//!
//! ```text
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 | 8 | 9 |10 |  ...  |   |   |   |   |...|   |   |   |   |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//! |  Magic "FIDX" |Ver|  Count (u32)  |Len(u16)|  CID1 |  Offset1 (u64)  |...| CRC32 (u32)   |
//! +---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+---+
//!
//! Len = Length of the encoded CID that follows
//! ... = Other entries (Len2|CID2|Offset2, Len3|CID3|Offset3, ...)
//! ```
//!
//! All integers are big-endian. The checksum covers every byte before it.
//!
//! _Because entries are ordered by their encoded CID, marshaling an unchanged mapping always
//! yields the same bytes. Decoders reject entries that are out of order (or duplicated) so that
//! any accepted input re-marshals to exactly itself._
//!
//! # Example
//!
//! ```rust
//! use cid::Cid;
//! use commonware_index::full::{Config, FullIndex, Index};
//!
//! let cid = Cid::try_from("bafykbzaceaeqhm77anl5mv2wjkmh4ofyf6s6eww3ujfmhtsfab65vi3rlccaq").unwrap();
//!
//! // Build an index
//! let mut index = Index::default();
//! index.set(cid, 10);
//!
//! // Marshal it
//! let mut buf = Vec::new();
//! index.marshal(&mut buf).unwrap();
//! assert_eq!(buf.len(), index.encoded_len());
//!
//! // Unmarshal it
//! let restored = Index::unmarshal(&mut buf.as_slice(), &Config::default()).unwrap();
//! assert_eq!(restored.offset(&cid).unwrap(), 10);
//! ```

use cid::Cid;
use std::io;
use thiserror::Error;

mod index;
pub use index::Index;
pub mod mocks;

/// Magic bytes identifying a marshaled index.
pub const MAGIC: [u8; 4] = *b"FIDX";

/// The only format version this crate reads and writes.
pub const VERSION: u8 = 1;

/// Size of the magic bytes and version.
pub const HEADER_SIZE: usize = MAGIC.len() + 1;

/// Size of the trailing checksum.
pub const CHECKSUM_SIZE: usize = 4;

/// Longest encoded [Cid] accepted when decoding.
pub const MAX_CID_LENGTH: usize = 128;

/// Errors that can occur when interacting with a [FullIndex].
#[derive(Debug, Error)]
pub enum Error {
    #[error("cid not found: {0}")]
    NotFound(Cid),
    #[error("invalid magic: {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("checksum mismatch: stored={stored} computed={computed}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns true if the error was caused by bytes that are not a valid index.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::InvalidMagic(_)
                | Self::UnsupportedVersion(_)
                | Self::ChecksumMismatch { .. }
                | Self::Codec(_)
        )
    }
}

/// Configuration for decoding a [FullIndex].
#[derive(Clone, Debug)]
pub struct Config {
    /// The maximum number of entries accepted when decoding.
    pub max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: u32::MAX as usize,
        }
    }
}

/// An in-memory mapping from [Cid] to byte offset for a single shard.
pub trait FullIndex: Sized {
    /// Insert or overwrite the offset of `cid`.
    fn set(&mut self, cid: Cid, offset: u64);

    /// Get the offset of `cid`, or [Error::NotFound] if it was never set.
    fn offset(&self, cid: &Cid) -> Result<u64, Error>;

    /// The number of entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the mapping to `writer` in the versioned format described in the [module
    /// documentation](self).
    ///
    /// Fails only if `writer` fails.
    fn marshal(&self, writer: &mut impl io::Write) -> Result<(), Error>;

    /// Read a mapping previously written by [FullIndex::marshal] until `reader` is exhausted.
    fn unmarshal(reader: &mut impl io::Read, cfg: &Config) -> Result<Self, Error>;
}
