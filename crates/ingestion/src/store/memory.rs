//! In-memory object store for tests.

use async_trait::async_trait;
use bytes::Bytes;
use liquidation_core::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use super::{ListPage, ObjectStore};

/// In-memory object store with S3-like paging.
///
/// Pages never carry `next_marker`, so callers must fall back to the last key.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
    unavailable: RwLock<BTreeSet<String>>,
    page_size: usize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MemoryObjectStore {
    /// Create an empty store returning at most `page_size` keys per page.
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            unavailable: RwLock::new(BTreeSet::new()),
            page_size: page_size.max(1),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Insert or replace an object.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(key.into(), data.into());
        }
    }

    /// Keep a key listed but make fetching it fail.
    pub fn make_unavailable(&self, key: impl Into<String>) {
        if let Ok(mut unavailable) = self.unavailable.write() {
            unavailable.insert(key.into());
        }
    }

    /// Number of listing requests served.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Number of fetch requests served.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::Relaxed)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects(&self, prefix: &str, marker: Option<&str>) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::catalog("object map poisoned"))?;

        let mut matching = objects
            .keys()
            .filter(|k| k.starts_with(prefix) && !k[prefix.len()..].contains('/'))
            .filter(|k| marker.map_or(true, |m| k.as_str() > m));

        let keys: Vec<String> = matching.by_ref().take(self.page_size).cloned().collect();
        let is_truncated = matching.next().is_some();

        Ok(ListPage {
            keys,
            is_truncated,
            next_marker: None,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        let unavailable = self
            .unavailable
            .read()
            .map_err(|_| Error::download("unavailable set poisoned"))?;
        if unavailable.contains(key) {
            return Err(Error::download(format!("HTTP 503 for {}", key)));
        }
        let objects = self
            .objects
            .read()
            .map_err(|_| Error::download("object map poisoned"))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::download(format!("HTTP 404 for {}", key)))
    }
}
