use super::{
    Config, Error, FullIndex, CHECKSUM_SIZE, HEADER_SIZE, MAGIC, MAX_CID_LENGTH, VERSION,
};
use bytes::{Buf, BufMut, BytesMut};
use cid::Cid;
use commonware_codec::{EncodeSize, Error as CodecError, Read, Write};
use std::{collections::BTreeMap, io};

/// Size of an entry excluding the encoded [Cid] (length prefix and offset).
const ENTRY_OVERHEAD: usize = 2 + 8;

/// Size of the entry count.
const COUNT_SIZE: usize = 4;

/// A [FullIndex] that keeps its entries in canonical (encoded) order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    entries: BTreeMap<Vec<u8>, u64>,

    /// Sum of the encoded size of all entries.
    entries_size: usize,
}

impl Index {
    fn insert(&mut self, cid: Vec<u8>, offset: u64) {
        let size = ENTRY_OVERHEAD + cid.len();
        if self.entries.insert(cid, offset).is_none() {
            self.entries_size += size;
        }
    }

    /// Remove `cid`, returning its offset if it was present.
    pub fn remove(&mut self, cid: &Cid) -> Option<u64> {
        let cid = cid.to_bytes();
        let offset = self.entries.remove(&cid)?;
        self.entries_size -= ENTRY_OVERHEAD + cid.len();
        Some(offset)
    }

    /// Iterate over all `(encoded cid, offset)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], u64)> {
        self.entries
            .iter()
            .map(|(cid, offset)| (cid.as_slice(), *offset))
    }

    /// The exact number of bytes [FullIndex::marshal] writes.
    pub fn encoded_len(&self) -> usize {
        self.encode_size() + CHECKSUM_SIZE
    }
}

/// Verify the magic and version at the start of `buf` without consuming it.
fn check_header(buf: &[u8]) -> Result<(), Error> {
    if buf.len() < HEADER_SIZE {
        return Err(CodecError::EndOfBuffer.into());
    }
    let mut magic = [0u8; MAGIC.len()];
    magic.copy_from_slice(&buf[..MAGIC.len()]);
    if magic != MAGIC {
        return Err(Error::InvalidMagic(magic));
    }
    let version = buf[MAGIC.len()];
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    Ok(())
}

impl FullIndex for Index {
    fn set(&mut self, cid: Cid, offset: u64) {
        self.insert(cid.to_bytes(), offset);
    }

    fn offset(&self, cid: &Cid) -> Result<u64, Error> {
        self.entries
            .get(&cid.to_bytes())
            .copied()
            .ok_or(Error::NotFound(*cid))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn marshal(&self, writer: &mut impl io::Write) -> Result<(), Error> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.write(&mut buf);
        let checksum = crc32fast::hash(&buf);
        buf.put_u32(checksum);
        writer.write_all(&buf)?;
        Ok(())
    }

    fn unmarshal(reader: &mut impl io::Read, cfg: &Config) -> Result<Self, Error> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        // Reject unknown formats before trusting anything else
        check_header(&buf)?;
        if buf.len() < HEADER_SIZE + COUNT_SIZE + CHECKSUM_SIZE {
            return Err(CodecError::EndOfBuffer.into());
        }

        // Verify integrity
        let (mut body, mut trailer) = buf.split_at(buf.len() - CHECKSUM_SIZE);
        let stored = trailer.get_u32();
        let computed = crc32fast::hash(body);
        if stored != computed {
            return Err(Error::ChecksumMismatch { stored, computed });
        }

        // Decode entries
        let index = Self::read_cfg(&mut body, cfg)?;
        if body.has_remaining() {
            return Err(CodecError::ExtraData(body.remaining()).into());
        }
        Ok(index)
    }
}

impl EncodeSize for Index {
    fn encode_size(&self) -> usize {
        HEADER_SIZE + COUNT_SIZE + self.entries_size
    }
}

impl Write for Index {
    fn write(&self, buf: &mut impl BufMut) {
        buf.put_slice(&MAGIC);
        buf.put_u8(VERSION);
        buf.put_u32(self.entries.len() as u32);
        for (cid, offset) in self.entries.iter() {
            buf.put_u16(cid.len() as u16);
            buf.put_slice(cid);
            buf.put_u64(*offset);
        }
    }
}

impl Read for Index {
    type Cfg = Config;

    fn read_cfg(buf: &mut impl Buf, cfg: &Self::Cfg) -> Result<Self, CodecError> {
        if buf.remaining() < HEADER_SIZE + COUNT_SIZE {
            return Err(CodecError::EndOfBuffer);
        }
        let mut magic = [0u8; MAGIC.len()];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(CodecError::Invalid("full::Index", "invalid magic"));
        }
        if buf.get_u8() != VERSION {
            return Err(CodecError::Invalid("full::Index", "unsupported version"));
        }
        let count = buf.get_u32() as usize;
        if count > cfg.max_entries {
            return Err(CodecError::InvalidLength(count));
        }

        let mut index = Self::default();
        for _ in 0..count {
            if buf.remaining() < 2 {
                return Err(CodecError::EndOfBuffer);
            }
            let len = buf.get_u16() as usize;
            if len == 0 || len > MAX_CID_LENGTH {
                return Err(CodecError::InvalidLength(len));
            }
            if buf.remaining() < len + 8 {
                return Err(CodecError::EndOfBuffer);
            }
            let mut raw = vec![0u8; len];
            buf.copy_to_slice(&mut raw);
            let offset = buf.get_u64();

            // Only accept canonical CIDs so that decoding then encoding is the identity
            let cid = Cid::try_from(raw.as_slice())
                .map_err(|_| CodecError::Invalid("full::Index", "invalid cid"))?;
            if cid.to_bytes() != raw {
                return Err(CodecError::Invalid("full::Index", "non-canonical cid"));
            }
            if let Some((last, _)) = index.entries.last_key_value() {
                if *last >= raw {
                    return Err(CodecError::Invalid("full::Index", "entries not sorted"));
                }
            }
            index.insert(raw, offset);
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::full::tests::random_cid;
    use commonware_macros::test_traced;
    use rand::{rngs::StdRng, SeedableRng};
    use test_case::test_case;

    fn populated(entries: usize) -> (Index, Vec<u8>) {
        let mut rng = StdRng::seed_from_u64(0);
        let mut index = Index::default();
        for i in 0..entries as u64 {
            index.set(random_cid(&mut rng), i);
        }
        let mut buf = Vec::new();
        index.marshal(&mut buf).unwrap();
        (index, buf)
    }

    /// Recompute the trailing checksum after tampering with the body.
    fn reseal(buf: &mut Vec<u8>) {
        buf.truncate(buf.len() - CHECKSUM_SIZE);
        let checksum = crc32fast::hash(buf);
        buf.extend_from_slice(&checksum.to_be_bytes());
    }

    fn unmarshal(buf: &[u8]) -> Result<Index, Error> {
        Index::unmarshal(&mut &buf[..], &Config::default())
    }

    #[test_traced]
    fn test_encoded_len_tracks_mutations() {
        let (mut index, buf) = populated(10);
        assert_eq!(index.encoded_len(), buf.len());

        // Overwriting does not change the size
        let (cid, offset) = index.iter().next().map(|(c, o)| (c.to_vec(), o)).unwrap();
        let cid = Cid::try_from(cid.as_slice()).unwrap();
        index.set(cid, offset + 1);
        assert_eq!(index.encoded_len(), buf.len());

        // Removing shrinks it
        assert_eq!(index.remove(&cid), Some(offset + 1));
        assert_eq!(index.remove(&cid), None);
        let mut shrunk = Vec::new();
        index.marshal(&mut shrunk).unwrap();
        assert_eq!(index.encoded_len(), shrunk.len());
        assert_eq!(
            buf.len() - shrunk.len(),
            ENTRY_OVERHEAD + cid.to_bytes().len()
        );
    }

    #[test_traced]
    fn test_iter_is_sorted() {
        let (index, _) = populated(64);
        let keys: Vec<_> = index.iter().map(|(cid, _)| cid.to_vec()).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test_case(0; "empty")]
    #[test_case(HEADER_SIZE - 1; "partial header")]
    #[test_case(HEADER_SIZE + 2; "partial count")]
    #[test_case(HEADER_SIZE + COUNT_SIZE + CHECKSUM_SIZE + 5; "partial entry")]
    fn test_truncated(len: usize) {
        let (_, buf) = populated(3);
        let err = unmarshal(&buf[..len]).unwrap_err();
        assert!(err.is_format(), "{err:?}");
    }

    #[test]
    fn test_truncated_and_resealed() {
        let (_, mut buf) = populated(3);
        buf.truncate(buf.len() - CHECKSUM_SIZE - 3);
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        reseal(&mut buf);
        assert!(matches!(
            unmarshal(&buf),
            Err(Error::Codec(CodecError::EndOfBuffer))
        ));
    }

    #[test]
    fn test_invalid_magic() {
        let (_, mut buf) = populated(1);
        buf[0] = b'X';
        assert!(matches!(unmarshal(&buf), Err(Error::InvalidMagic(m)) if m[0] == b'X'));
    }

    #[test]
    fn test_unsupported_version() {
        let (_, mut buf) = populated(1);
        buf[MAGIC.len()] = VERSION + 1;
        reseal(&mut buf);
        assert!(matches!(
            unmarshal(&buf),
            Err(Error::UnsupportedVersion(v)) if v == VERSION + 1
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let (_, mut buf) = populated(2);
        let last_offset_byte = buf.len() - CHECKSUM_SIZE - 1;
        buf[last_offset_byte] ^= 0xff;
        let err = unmarshal(&buf).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { .. }));
        assert!(err.is_format());
    }

    #[test]
    fn test_extra_data() {
        let (_, mut buf) = populated(2);
        buf.truncate(buf.len() - CHECKSUM_SIZE);
        buf.push(0);
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        reseal(&mut buf);
        assert!(matches!(
            unmarshal(&buf),
            Err(Error::Codec(CodecError::ExtraData(1)))
        ));
    }

    #[test]
    fn test_unsorted_entries() {
        let (index, _) = populated(2);
        let entries: Vec<_> = index.iter().map(|(c, o)| (c.to_vec(), o)).collect();

        // Write the entries in descending order
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&2u32.to_be_bytes());
        for (cid, offset) in entries.iter().rev() {
            buf.extend_from_slice(&(cid.len() as u16).to_be_bytes());
            buf.extend_from_slice(cid);
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        reseal(&mut buf);
        assert!(matches!(
            unmarshal(&buf),
            Err(Error::Codec(CodecError::Invalid(_, "entries not sorted")))
        ));
    }

    #[test]
    fn test_duplicate_entries() {
        let (index, _) = populated(1);
        let (cid, offset) = index.iter().next().map(|(c, o)| (c.to_vec(), o)).unwrap();

        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&2u32.to_be_bytes());
        for _ in 0..2 {
            buf.extend_from_slice(&(cid.len() as u16).to_be_bytes());
            buf.extend_from_slice(&cid);
            buf.extend_from_slice(&offset.to_be_bytes());
        }
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        reseal(&mut buf);
        assert!(unmarshal(&buf).unwrap_err().is_format());
    }

    #[test]
    fn test_invalid_cid() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&3u16.to_be_bytes());
        buf.extend_from_slice(&[0xff, 0xff, 0xff]);
        buf.extend_from_slice(&7u64.to_be_bytes());
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        reseal(&mut buf);
        assert!(matches!(
            unmarshal(&buf),
            Err(Error::Codec(CodecError::Invalid(_, "invalid cid")))
        ));
    }

    #[test_case(0; "zero")]
    #[test_case(MAX_CID_LENGTH + 1; "too long")]
    fn test_invalid_cid_length(len: usize) {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&(len as u16).to_be_bytes());
        buf.extend_from_slice(&vec![0u8; len]);
        buf.extend_from_slice(&7u64.to_be_bytes());
        buf.extend_from_slice(&[0u8; CHECKSUM_SIZE]);
        reseal(&mut buf);
        assert!(matches!(
            unmarshal(&buf),
            Err(Error::Codec(CodecError::InvalidLength(l))) if l == len
        ));
    }

    #[test]
    fn test_max_entries() {
        let (_, buf) = populated(5);
        let cfg = Config { max_entries: 4 };
        assert!(matches!(
            Index::unmarshal(&mut buf.as_slice(), &cfg),
            Err(Error::Codec(CodecError::InvalidLength(5)))
        ));
        let cfg = Config { max_entries: 5 };
        assert_eq!(Index::unmarshal(&mut buf.as_slice(), &cfg).unwrap().len(), 5);
    }
}
