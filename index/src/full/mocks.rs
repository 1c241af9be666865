//! A minimal [FullIndex] for testing components that consume indexes.

use super::{Config, Error, FullIndex};
use cid::Cid;
use commonware_codec::Error as CodecError;
use std::{collections::HashMap, io};

/// A [FullIndex] backed by a [HashMap].
///
/// Marshals to the same bytes as [super::Index] for the same mapping.
#[derive(Clone, Debug, Default)]
pub struct Index {
    offsets: HashMap<Cid, u64>,
}

impl FullIndex for Index {
    fn set(&mut self, cid: Cid, offset: u64) {
        self.offsets.insert(cid, offset);
    }

    fn offset(&self, cid: &Cid) -> Result<u64, Error> {
        self.offsets.get(cid).copied().ok_or(Error::NotFound(*cid))
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn marshal(&self, writer: &mut impl io::Write) -> Result<(), Error> {
        let mut canonical = super::Index::default();
        for (cid, offset) in self.offsets.iter() {
            canonical.set(*cid, *offset);
        }
        canonical.marshal(writer)
    }

    fn unmarshal(reader: &mut impl io::Read, cfg: &Config) -> Result<Self, Error> {
        let canonical = super::Index::unmarshal(reader, cfg)?;
        let mut offsets = HashMap::with_capacity(canonical.len());
        for (raw, offset) in canonical.iter() {
            let cid = Cid::try_from(raw)
                .map_err(|_| CodecError::Invalid("full::mocks::Index", "invalid cid"))?;
            offsets.insert(cid, offset);
        }
        Ok(Self { offsets })
    }
}
