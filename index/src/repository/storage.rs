use super::{Config, Error, Stat};
use crate::{full::FullIndex, store::Store, Key};
use bytes::Bytes;
use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use std::{
    collections::BTreeMap,
    iter::FusedIterator,
    ops::Bound,
    sync::{Mutex, PoisonError, RwLock},
};
use tracing::{debug, warn};

struct Metrics {
    indexes: Gauge,
    bytes: Gauge,
    adds: Counter,
    removes: Counter,
    gets: Counter,
}

impl Metrics {
    fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            indexes: Gauge::default(),
            bytes: Gauge::default(),
            adds: Counter::default(),
            removes: Counter::default(),
            gets: Counter::default(),
        };
        registry.register(
            "indexes",
            "Number of stored indexes",
            metrics.indexes.clone(),
        );
        registry.register(
            "bytes",
            "Total size of stored indexes",
            metrics.bytes.clone(),
        );
        registry.register("adds", "Number of indexes added", metrics.adds.clone());
        registry.register(
            "removes",
            "Number of indexes removed",
            metrics.removes.clone(),
        );
        registry.register("gets", "Number of indexes read", metrics.gets.clone());
        metrics
    }
}

/// The size of every stored index, kept in step with the [Store].
#[derive(Default)]
struct Directory {
    sizes: BTreeMap<Key, u64>,
    total: u64,
}

impl Directory {
    fn insert(&mut self, key: Key, size: u64) {
        if let Some(previous) = self.sizes.insert(key, size) {
            self.total -= previous;
        }
        self.total += size;
    }

    fn remove(&mut self, key: &Key) -> Option<u64> {
        let size = self.sizes.remove(key)?;
        self.total -= size;
        Some(size)
    }
}

/// A durable store of [FullIndex]es keyed by shard.
pub struct Repository<S: Store> {
    store: S,
    cfg: Config,

    /// Held across every store mutation.
    writes: Mutex<()>,
    directory: RwLock<Directory>,

    metrics: Metrics,
}

impl<S: Store> Repository<S> {
    /// Initialize a [Repository] over `store`, recovering any indexes it already holds.
    pub fn init(store: S, cfg: Config, registry: &mut Registry) -> Result<Self, Error> {
        // Rebuild the directory from the store
        let mut directory = Directory::default();
        for key in store.scan()? {
            let Some(size) = store.stat(&key)? else {
                continue;
            };
            directory.insert(key, size);
        }
        debug!(
            indexes = directory.sizes.len(),
            bytes = directory.total,
            "initialized repository"
        );

        let metrics = Metrics::new(registry);
        metrics.indexes.set(directory.sizes.len() as i64);
        metrics.bytes.set(directory.total as i64);
        Ok(Self {
            store,
            cfg,
            writes: Mutex::new(()),
            directory: RwLock::new(directory),
            metrics,
        })
    }

    /// Store `index` under `key`, replacing any index already stored there.
    pub fn add(&self, key: &Key, index: &impl FullIndex) -> Result<(), Error> {
        let mut buf = Vec::new();
        index.marshal(&mut buf).map_err(Error::Marshal)?;
        let size = buf.len() as u64;

        // Serialize writers without blocking readers of the directory
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = self.store.put(key, Bytes::from(buf)) {
            self.reconcile(key);
            return Err(err.into());
        }
        let mut directory = self.directory.write().unwrap_or_else(PoisonError::into_inner);
        directory.insert(key.clone(), size);
        self.record(&directory);
        drop(directory);

        self.metrics.adds.inc();
        debug!(%key, size, "added index");
        Ok(())
    }

    /// Read the index stored under `key` into a fresh `I`.
    ///
    /// The returned index is independent of the stored bytes.
    pub fn get<I: FullIndex>(&self, key: &Key) -> Result<I, Error> {
        let value = self
            .store
            .get(key)?
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        self.metrics.gets.inc();
        I::unmarshal(&mut &value[..], &self.cfg.codec_config)
            .map_err(|err| Error::Format(key.clone(), err))
    }

    /// Remove the index stored under `key`.
    ///
    /// Returns `true` if an index was removed, `false` if none was stored.
    pub fn remove(&self, key: &Key) -> Result<bool, Error> {
        let _guard = self.writes.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = match self.store.remove(key) {
            Ok(removed) => removed,
            Err(err) => {
                self.reconcile(key);
                return Err(err.into());
            }
        };
        let mut directory = self.directory.write().unwrap_or_else(PoisonError::into_inner);
        let size = directory.remove(key);
        self.record(&directory);
        drop(directory);

        if removed {
            self.metrics.removes.inc();
            debug!(%key, ?size, "removed index");
        }
        Ok(removed)
    }

    /// Get the existence and stored size of the index under `key`.
    pub fn stat(&self, key: &Key) -> Stat {
        let directory = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        match directory.sizes.get(key) {
            Some(size) => Stat {
                exists: true,
                size: *size,
            },
            None => Stat::default(),
        }
    }

    /// The number of stored indexes.
    pub fn len(&self) -> usize {
        let directory = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        directory.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The total size, in bytes, of all stored indexes.
    pub fn size(&self) -> u64 {
        let directory = self.directory.read().unwrap_or_else(PoisonError::into_inner);
        directory.total
    }

    /// Iterate over stored keys in ascending order.
    ///
    /// Keys are fetched one at a time without holding a lock between calls. Every key stored for
    /// the whole iteration is yielded exactly once and no key is yielded twice; keys added or
    /// removed during iteration may or may not be yielded.
    pub fn keys(&self) -> Keys<'_, S> {
        Keys {
            repository: self,
            last: None,
            done: false,
        }
    }

    /// Call `visitor` with each stored key (in the order of [Repository::keys]) until it returns
    /// `Ok(false)` or an error.
    ///
    /// An error returned by `visitor` is returned unchanged.
    pub fn for_each<E>(
        &self,
        mut visitor: impl FnMut(&Key) -> Result<bool, E>,
    ) -> Result<(), E> {
        for key in self.keys() {
            if !visitor(&key)? {
                break;
            }
        }
        Ok(())
    }

    /// Get the underlying [Store].
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bring the directory entry for `key` back in line with the store after a failed mutation
    /// (which may still have been applied).
    ///
    /// Must be called while holding `writes`.
    fn reconcile(&self, key: &Key) {
        let stored = match self.store.stat(key) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(%key, ?err, "unable to reconcile index after failed write");
                return;
            }
        };
        let mut directory = self.directory.write().unwrap_or_else(PoisonError::into_inner);
        match stored {
            Some(size) => directory.insert(key.clone(), size),
            None => {
                directory.remove(key);
            }
        }
        self.record(&directory);
        debug!(%key, ?stored, "reconciled index after failed write");
    }

    fn record(&self, directory: &Directory) {
        self.metrics.indexes.set(directory.sizes.len() as i64);
        self.metrics.bytes.set(directory.total as i64);
    }
}

/// Iterator over the keys of a [Repository]. See [Repository::keys].
pub struct Keys<'a, S: Store> {
    repository: &'a Repository<S>,
    last: Option<Key>,
    done: bool,
}

impl<S: Store> Iterator for Keys<'_, S> {
    type Item = Key;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let directory = self
            .repository
            .directory
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let next = match &self.last {
            Some(last) => directory
                .sizes
                .range::<Key, _>((Bound::Excluded(last), Bound::Unbounded))
                .next(),
            None => directory.sizes.iter().next(),
        }
        .map(|(key, _)| key.clone());
        drop(directory);

        match &next {
            Some(key) => self.last = Some(key.clone()),
            None => self.done = true,
        }
        next
    }
}

impl<S: Store> FusedIterator for Keys<'_, S> {}
