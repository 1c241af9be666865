use super::{validate_key, Error, Store};
use crate::Key;
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    sync::{Arc, PoisonError, RwLock},
};

/// In-memory implementation of [Store].
///
/// Clones share the same contents.
#[derive(Clone, Default)]
pub struct Memory {
    values: Arc<RwLock<BTreeMap<Key, Bytes>>>,
}

impl Store for Memory {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        validate_key(key)?;
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.clone(), value);
        Ok(())
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn remove(&self, key: &Key) -> Result<bool, Error> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        Ok(values.remove(key).is_some())
    }

    fn stat(&self, key: &Key) -> Result<Option<u64>, Error> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).map(|value| value.len() as u64))
    }

    fn scan(&self) -> Result<Vec<Key>, Error> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        Ok(values.keys().cloned().collect())
    }
}
