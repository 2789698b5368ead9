//! Cache API
//!
//! In-memory only. One [`CacheStorage`] lives for the whole process and is
//! shared by every worker version, so a new worker can read what the previous
//! one precached, and an activate step can prune old caches.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CacheError;
use crate::fetch::{FetchRequest, FetchResponse};

/// A single named cache
pub struct Cache {
    name: String,
    entries: RwLock<HashMap<String, FetchResponse>>,
}

impl Cache {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cache name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a request against the cache
    pub fn match_request(&self, request: &FetchRequest) -> Option<FetchResponse> {
        self.match_url(&request.url)
    }

    /// Match a URL against the cache
    pub fn match_url(&self, url: &str) -> Option<FetchResponse> {
        self.entries.read().get(url).cloned()
    }

    /// Store a response for `request`
    pub fn put(&self, request: &FetchRequest, response: FetchResponse) -> Result<(), CacheError> {
        if response.status == 206 {
            return Err(CacheError::PartialResponse(request.url.clone()));
        }
        self.entries.write().insert(request.url.clone(), response);
        Ok(())
    }

    /// Delete a cached entry
    pub fn delete(&self, request: &FetchRequest) -> bool {
        self.entries.write().remove(&request.url).is_some()
    }

    /// All cached request URLs
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("entry_count", &self.len())
            .finish()
    }
}

/// All caches, by name
#[derive(Default)]
pub struct CacheStorage {
    caches: RwLock<HashMap<String, Arc<Cache>>>,
}

impl CacheStorage {
    /// Create an empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if needed
    pub fn open(&self, name: &str) -> Arc<Cache> {
        if let Some(cache) = self.caches.read().get(name) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Cache::new(name.to_string()))),
        )
    }

    /// Check if a cache exists
    pub fn has(&self, name: &str) -> bool {
        self.caches.read().contains_key(name)
    }

    /// Delete a cache
    pub fn delete(&self, name: &str) -> bool {
        self.caches.write().remove(name).is_some()
    }

    /// Get all cache names, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Match a request against all caches
    pub fn match_request(&self, request: &FetchRequest) -> Option<FetchResponse> {
        self.caches
            .read()
            .values()
            .find_map(|cache| cache.match_request(request))
    }
}

impl std::fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStorage")
            .field("cache_count", &self.caches.read().len())
            .finish()
    }
}
