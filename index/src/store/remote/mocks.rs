//! An in-memory [Client] for testing.

use super::{Client, Error, Page};
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
};

/// Default number of objects returned per [Page].
const DEFAULT_PAGE_SIZE: usize = 1_000;

/// An in-memory bucket.
///
/// Clones share the same objects, so a test can keep a handle to inspect (or break) the bucket
/// after handing it to a [super::Remote].
#[derive(Clone)]
pub struct Bucket {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
    page_size: usize,
    failing: Arc<AtomicBool>,
}

impl Default for Bucket {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Bucket {
    /// Create an empty bucket that lists at most `page_size` objects at a time.
    pub fn new(page_size: usize) -> Self {
        assert!(page_size > 0, "page size must be positive");
        Self {
            objects: Arc::default(),
            page_size,
            failing: Arc::default(),
        }
    }

    /// When `true`, every request fails with [Error::Remote].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// The number of objects in the bucket.
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, operation: &'static str, object: &str) -> Result<(), Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Remote {
                operation,
                object: object.into(),
                message: "injected failure".into(),
            });
        }
        Ok(())
    }
}

impl Client for Bucket {
    fn put_object(&self, object: &str, data: Bytes) -> Result<(), Error> {
        self.check("put", object)?;
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.insert(object.into(), data);
        Ok(())
    }

    fn get_object(&self, object: &str) -> Result<Option<Bytes>, Error> {
        self.check("get", object)?;
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.get(object).cloned())
    }

    fn head_object(&self, object: &str) -> Result<Option<u64>, Error> {
        self.check("head", object)?;
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects.get(object).map(|data| data.len() as u64))
    }

    fn delete_object(&self, object: &str) -> Result<(), Error> {
        self.check("delete", object)?;
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        objects.remove(object);
        Ok(())
    }

    fn list_objects(&self, prefix: &str, continuation: Option<&str>) -> Result<Page, Error> {
        self.check("list", prefix)?;
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let start = match continuation {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        let mut matching = objects
            .range((start, Bound::Unbounded))
            .map(|(name, _)| name)
            .take_while(|name| name.starts_with(prefix));

        let mut page = Page::default();
        for name in matching.by_ref().take(self.page_size) {
            page.objects.push(name.clone());
        }
        if matching.next().is_some() {
            page.next = page.objects.last().cloned();
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_pages() {
        let bucket = Bucket::new(2);
        for name in ["a/1", "a/2", "a/3", "b/1"] {
            bucket.put_object(name, Bytes::new()).unwrap();
        }

        let page = bucket.list_objects("a/", None).unwrap();
        assert_eq!(page.objects, vec!["a/1", "a/2"]);
        assert_eq!(page.next.as_deref(), Some("a/2"));

        let page = bucket.list_objects("a/", page.next.as_deref()).unwrap();
        assert_eq!(page.objects, vec!["a/3"]);
        assert!(page.next.is_none());

        let page = bucket.list_objects("c/", None).unwrap();
        assert!(page.objects.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn test_delete_idempotent() {
        let bucket = Bucket::default();
        bucket.put_object("a", Bytes::new()).unwrap();
        bucket.delete_object("a").unwrap();
        bucket.delete_object("a").unwrap();
        assert!(bucket.is_empty());
    }
}
