use std::collections::HashMap;
use std::sync::RwLock;

use crate::metrics::get_metrics;
use crate::models::{DeviceUrl, Platform, UrlRecord};

/// In-memory mirror of the `urls` table, keyed by short code.
///
/// This is the authoritative read path for redirects: a code that is not in
/// here does not exist. Mutations hold the write lock only for the map swap;
/// the `urls_stored` gauge is updated inside the same critical section so it
/// never disagrees with the map.
pub struct UrlCache {
    inner: RwLock<HashMap<String, UrlRecord>>,
}

impl UrlCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the cache contents with a full scan of the database.
    pub fn warm(&self, records: HashMap<String, UrlRecord>) {
        let mut map = self.inner.write().unwrap();
        *map = records;
        set_gauge(map.len());
    }

    pub fn get(&self, short_code: &str) -> Option<UrlRecord> {
        self.inner.read().unwrap().get(short_code).cloned()
    }

    pub fn contains(&self, short_code: &str) -> bool {
        self.inner.read().unwrap().contains_key(short_code)
    }

    pub fn insert(&self, record: UrlRecord) {
        let mut map = self.inner.write().unwrap();
        map.insert(record.short_code.clone(), record);
        set_gauge(map.len());
    }

    /// Remove an entry, returning whether it was present.
    pub fn remove(&self, short_code: &str) -> bool {
        let mut map = self.inner.write().unwrap();
        let removed = map.remove(short_code).is_some();
        set_gauge(map.len());
        removed
    }

    /// Attach hydrated device URLs to an existing entry.
    pub fn set_device_urls(&self, short_code: &str, device_urls: HashMap<Platform, DeviceUrl>) {
        let mut map = self.inner.write().unwrap();
        if let Some(record) = map.get_mut(short_code) {
            record.device_urls = Some(device_urls);
        }
    }

    /// Mutate an existing entry in place; returns false if it is absent.
    pub fn update_entry(&self, short_code: &str, f: impl FnOnce(&mut UrlRecord)) -> bool {
        let mut map = self.inner.write().unwrap();
        match map.get_mut(short_code) {
            Some(record) => {
                f(record);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

impl Default for UrlCache {
    fn default() -> Self {
        Self::new()
    }
}

fn set_gauge(len: usize) {
    if let Some(metrics) = get_metrics() {
        metrics.urls_stored.set(len as i64);
    }
}
