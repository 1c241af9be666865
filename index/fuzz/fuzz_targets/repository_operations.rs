#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use commonware_index::{
    full::{FullIndex, Index},
    repository::{Config, Error, Repository, Stat},
    store::{memory::Memory, validate_key, Store},
    Key,
};
use libfuzzer_sys::fuzz_target;
use prometheus_client::registry::Registry;
use std::collections::BTreeMap;

#[derive(Arbitrary, Debug)]
enum Operation {
    Add { key: Vec<u8>, offsets: Vec<u64> },
    Get { key: Vec<u8> },
    Remove { key: Vec<u8> },
    Stat { key: Vec<u8> },
    Corrupt { key: Vec<u8>, value: Vec<u8> },
    Keys,
    Reopen,
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    operations: Vec<Operation>,
}

/// Build a CIDv1 (raw, identity multihash) from `seed`.
fn cid(seed: u64) -> cid::Cid {
    let mut raw = vec![0x01, 0x55, 0x00, 0x08];
    raw.extend_from_slice(&seed.to_be_bytes());
    cid::Cid::try_from(raw.as_slice()).unwrap()
}

fn open(store: &Memory) -> Repository<Memory> {
    Repository::init(store.clone(), Config::default(), &mut Registry::default()).unwrap()
}

fn fuzz(input: FuzzInput) {
    let store = Memory::default();
    let mut repository = open(&store);
    let mut expected: BTreeMap<Key, Option<Index>> = BTreeMap::new();
    let mut sizes: BTreeMap<Key, u64> = BTreeMap::new();

    for op in input.operations {
        match op {
            Operation::Add { key, offsets } => {
                let key = Key::new(key);
                let mut index = Index::default();
                for (i, offset) in offsets.into_iter().enumerate() {
                    index.set(cid(i as u64), offset);
                }
                match repository.add(&key, &index) {
                    Ok(()) => {
                        sizes.insert(key.clone(), index.encoded_len() as u64);
                        expected.insert(key, Some(index));
                    }
                    Err(_) => assert!(validate_key(&key).is_err()),
                }
            }
            Operation::Get { key } => {
                let key = Key::new(key);
                match (repository.get::<Index>(&key), expected.get(&key)) {
                    (Ok(index), Some(Some(stored))) => assert_eq!(&index, stored),
                    (Err(Error::NotFound(_)), None) => {}
                    (Err(Error::Format(..)), Some(None)) => {}
                    (result, stored) => panic!("unexpected get: {result:?} {stored:?}"),
                }
            }
            Operation::Remove { key } => {
                let key = Key::new(key);
                let removed = repository.remove(&key).unwrap();
                assert_eq!(removed, expected.remove(&key).is_some());
                sizes.remove(&key);
            }
            Operation::Stat { key } => {
                let key = Key::new(key);
                let stat = match sizes.get(&key) {
                    Some(size) => Stat {
                        exists: true,
                        size: *size,
                    },
                    None => Stat::default(),
                };
                assert_eq!(repository.stat(&key), stat);
            }
            Operation::Corrupt { key, value } => {
                // Writes behind the repository are only visible after reopening
                let key = Key::new(key);
                if validate_key(&key).is_err() {
                    continue;
                }
                sizes.insert(key.clone(), value.len() as u64);
                let index = Index::unmarshal(&mut value.as_slice(), &Default::default()).ok();
                store.put(&key, Bytes::from(value)).unwrap();
                expected.insert(key, index);
                repository = open(&store);
            }
            Operation::Keys => {
                let keys: Vec<Key> = repository.keys().collect();
                assert_eq!(keys, expected.keys().cloned().collect::<Vec<_>>());
            }
            Operation::Reopen => {
                repository = open(&store);
            }
        }

        assert_eq!(repository.len(), expected.len());
        assert_eq!(repository.size(), sizes.values().sum::<u64>());
    }
}

fuzz_target!(|input: FuzzInput| {
    fuzz(input);
});
