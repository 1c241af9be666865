//! Store values as objects in a remote bucket.
//!
//! [Remote] maps each [Key] to the object `<prefix>/<hex(key)>` and reaches the bucket through a
//! [Client]. Implement [Client] over whichever object storage SDK a deployment uses;
//! [mocks::Bucket] is an in-memory implementation for tests.
//!
//! Object stores replace whole objects on write, so [Store::put] is atomic as long as the
//! [Client] uploads `data` in a single request.

use super::{validate_key, validate_prefix, Error, Store};
use crate::Key;
use bytes::Bytes;
use commonware_utils::{from_hex, hex};

pub mod mocks;

/// A page of object names returned by [Client::list_objects].
#[derive(Clone, Debug, Default)]
pub struct Page {
    /// Object names in ascending order.
    pub objects: Vec<String>,

    /// Token to pass to the next [Client::list_objects] call, if more objects remain.
    pub next: Option<String>,
}

/// Abstraction over the object storage operations [Remote] relies on.
pub trait Client: Send + Sync {
    /// Upload `data` as `object`, replacing any existing object.
    fn put_object(&self, object: &str, data: Bytes) -> Result<(), Error>;

    /// Download `object`, if it exists.
    fn get_object(&self, object: &str) -> Result<Option<Bytes>, Error>;

    /// Get the size of `object`, if it exists.
    fn head_object(&self, object: &str) -> Result<Option<u64>, Error>;

    /// Delete `object`.
    ///
    /// Deleting an object that does not exist is not an error.
    fn delete_object(&self, object: &str) -> Result<(), Error>;

    /// List objects whose name starts with `prefix`, resuming after `continuation` if provided.
    fn list_objects(&self, prefix: &str, continuation: Option<&str>) -> Result<Page, Error>;
}

/// Configuration for [Remote] storage.
#[derive(Clone)]
pub struct Config {
    /// The namespace (within the bucket) holding all objects.
    pub prefix: String,
}

/// Object storage implementation of [Store].
pub struct Remote<C: Client> {
    client: C,
    prefix: String,
}

impl<C: Client> Remote<C> {
    pub fn new(client: C, cfg: Config) -> Result<Self, Error> {
        validate_prefix(&cfg.prefix)?;
        Ok(Self {
            client,
            prefix: format!("{}/", cfg.prefix),
        })
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn object(&self, key: &Key) -> String {
        format!("{}{}", self.prefix, hex(key.as_bytes()))
    }
}

impl<C: Client> Store for Remote<C> {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        validate_key(key)?;
        self.client.put_object(&self.object(key), value)
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        self.client.get_object(&self.object(key))
    }

    fn remove(&self, key: &Key) -> Result<bool, Error> {
        if validate_key(key).is_err() {
            return Ok(false);
        }

        // Deletes are idempotent, so check for existence first
        let object = self.object(key);
        if self.client.head_object(&object)?.is_none() {
            return Ok(false);
        }
        self.client.delete_object(&object)?;
        Ok(true)
    }

    fn stat(&self, key: &Key) -> Result<Option<u64>, Error> {
        if validate_key(key).is_err() {
            return Ok(None);
        }
        self.client.head_object(&self.object(key))
    }

    fn scan(&self) -> Result<Vec<Key>, Error> {
        let mut keys = Vec::new();
        let mut continuation = None;
        loop {
            let page = self
                .client
                .list_objects(&self.prefix, continuation.as_deref())?;
            for object in page.objects {
                let key = object
                    .strip_prefix(&self.prefix)
                    .and_then(from_hex)
                    .ok_or_else(|| Error::DirectoryCorrupt(object.clone()))?;
                keys.push(Key::new(key));
            }
            match page.next {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::run_store_tests;
    use commonware_macros::test_traced;

    fn remote(bucket: mocks::Bucket, prefix: &str) -> Remote<mocks::Bucket> {
        Remote::new(
            bucket,
            Config {
                prefix: prefix.into(),
            },
        )
        .unwrap()
    }

    #[test_traced]
    fn test_remote_store() {
        let store = remote(mocks::Bucket::default(), "indexes");
        run_store_tests(&store);
    }

    #[test_traced]
    fn test_remote_store_paginated() {
        let store = remote(mocks::Bucket::new(2), "indexes");
        run_store_tests(&store);

        let keys: Vec<Key> = (0..7u8).map(|i| Key::new(vec![b'k', i])).collect();
        for key in &keys {
            store.put(key, Bytes::from_static(b"value")).unwrap();
        }
        assert_eq!(store.scan().unwrap(), keys);
    }

    #[test_traced]
    fn test_prefixes_are_isolated() {
        let bucket = mocks::Bucket::default();
        let first = remote(bucket.clone(), "first");
        let second = remote(bucket.clone(), "first-but-longer");
        let key = Key::from("shard");
        first.put(&key, Bytes::from_static(b"one")).unwrap();
        second.put(&key, Bytes::from_static(b"two")).unwrap();

        assert_eq!(first.scan().unwrap(), vec![key.clone()]);
        assert_eq!(second.scan().unwrap(), vec![key.clone()]);
        assert_eq!(first.get(&key).unwrap().unwrap(), &b"one"[..]);
        assert!(first.remove(&key).unwrap());
        assert_eq!(second.stat(&key).unwrap(), Some(3));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn test_invalid_prefix() {
        for prefix in ["", "a/b", "spaces here"] {
            let result = Remote::new(
                mocks::Bucket::default(),
                Config {
                    prefix: prefix.into(),
                },
            );
            assert!(matches!(result, Err(Error::PrefixInvalid(p)) if p == prefix));
        }
    }

    #[test]
    fn test_foreign_objects() {
        let bucket = mocks::Bucket::default();
        let store = remote(bucket.clone(), "indexes");
        bucket
            .put_object("indexes/zz", Bytes::from_static(b"value"))
            .unwrap();
        assert!(matches!(store.scan(), Err(Error::DirectoryCorrupt(o)) if o == "indexes/zz"));
    }

    #[test]
    fn test_client_failures_propagate() {
        let bucket = mocks::Bucket::default();
        let store = remote(bucket.clone(), "indexes");
        let key = Key::from("shard");
        store.put(&key, Bytes::from_static(b"value")).unwrap();

        bucket.set_failing(true);
        assert!(matches!(
            store.put(&key, Bytes::from_static(b"other")),
            Err(Error::Remote { operation: "put", .. })
        ));
        assert!(matches!(store.get(&key), Err(Error::Remote { .. })));
        assert!(matches!(store.stat(&key), Err(Error::Remote { .. })));
        assert!(matches!(store.remove(&key), Err(Error::Remote { .. })));
        assert!(matches!(store.scan(), Err(Error::Remote { .. })));

        bucket.set_failing(false);
        assert_eq!(store.get(&key).unwrap().unwrap(), &b"value"[..]);
    }
}
