use super::{Error, Store};
use crate::Key;
use bytes::Bytes;
use prometheus_client::{metrics::counter::Counter, registry::Registry};

struct Metrics {
    reads: Counter,
    read_bytes: Counter,
    writes: Counter,
    write_bytes: Counter,
    removes: Counter,
}

impl Metrics {
    /// Initialize the `Metrics` struct and register the metrics in the provided registry.
    fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            reads: Counter::default(),
            read_bytes: Counter::default(),
            writes: Counter::default(),
            write_bytes: Counter::default(),
            removes: Counter::default(),
        };

        registry.register(
            "store_reads",
            "Total number of values read from the store",
            metrics.reads.clone(),
        );
        registry.register(
            "store_read_bytes",
            "Total amount of data read from the store",
            metrics.read_bytes.clone(),
        );
        registry.register(
            "store_writes",
            "Total number of values written to the store",
            metrics.writes.clone(),
        );
        registry.register(
            "store_write_bytes",
            "Total amount of data written to the store",
            metrics.write_bytes.clone(),
        );
        registry.register(
            "store_removes",
            "Total number of values removed from the store",
            metrics.removes.clone(),
        );

        metrics
    }
}

/// A wrapper around a [Store] implementation that tracks metrics.
pub struct Metered<S: Store> {
    inner: S,
    metrics: Metrics,
}

impl<S: Store> Metered<S> {
    pub fn new(inner: S, registry: &mut Registry) -> Self {
        Self {
            inner,
            metrics: Metrics::new(registry),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Store> Store for Metered<S> {
    fn put(&self, key: &Key, value: Bytes) -> Result<(), Error> {
        let len = value.len() as u64;
        self.inner.put(key, value)?;
        self.metrics.writes.inc();
        self.metrics.write_bytes.inc_by(len);
        Ok(())
    }

    fn get(&self, key: &Key) -> Result<Option<Bytes>, Error> {
        let value = self.inner.get(key)?;
        if let Some(value) = &value {
            self.metrics.reads.inc();
            self.metrics.read_bytes.inc_by(value.len() as u64);
        }
        Ok(value)
    }

    fn remove(&self, key: &Key) -> Result<bool, Error> {
        let removed = self.inner.remove(key)?;
        if removed {
            self.metrics.removes.inc();
        }
        Ok(removed)
    }

    fn stat(&self, key: &Key) -> Result<Option<u64>, Error> {
        self.inner.stat(key)
    }

    fn scan(&self) -> Result<Vec<Key>, Error> {
        self.inner.scan()
    }
}
