//! Cache abstractions for storing fetched data.
//!
//! This module provides a `Cache` trait and implementations for keeping
//! catalog metadata, partition payloads and resolved endpoints between
//! requests.
//!
//! # Implementations
//!
//! - [`MemoryCache`]: In-memory cache with optional size limits
//! - [`NoCache`]: Passthrough implementation that caches nothing
//!
//! Cache calls are synchronous. They never suspend a request chain and must
//! be safe to call from any worker thread.

use crate::error::Result;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

/// Which eviction rules apply to a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    /// Resolved service endpoints. Never evicted by size pressure.
    Endpoint,
    /// Data that may change server-side (volatile layers, latest versions,
    /// catalog configuration). Evicted first under size pressure.
    Mutable,
    /// Content-addressed data that never changes once written (versioned
    /// partitions). Only evicted under size pressure once no mutable entries
    /// remain, or explicitly.
    Protected,
}

/// A cache for storing fetched data.
///
/// The cache is keyed by composite strings of the form
/// `hrn::layer::partition::version::kind` and stores raw bytes. Updates
/// replace whole values: a concurrent reader sees either the old or the new
/// value.
pub trait Cache: Send + Sync {
    /// Get data from the cache.
    ///
    /// Returns `Ok(Some(data))` if the data is cached and not expired,
    /// `Ok(None)` if not cached, or an error if the cache operation failed.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store data in the cache, replacing any previous value for `key`.
    ///
    /// An `expiry` makes the entry invisible once that much time has passed.
    fn put(&self, key: &str, data: Vec<u8>, scope: CacheScope, expiry: Option<Duration>)
    -> Result<()>;

    /// Check if data exists in the cache without retrieving it.
    fn contains(&self, key: &str) -> Result<bool>;

    /// Remove one entry.
    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry whose key starts with `prefix`.
    fn remove_prefix(&self, prefix: &str) -> Result<()>;

    /// Clear all cached data.
    fn clear(&self) -> Result<()>;
}

/// A cache that stores nothing (passthrough).
///
/// This is useful when caching is not desired or for testing.
#[derive(Debug, Clone, Default)]
pub struct NoCache;

impl NoCache {
    /// Create a new no-op cache.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Cache for NoCache {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(
        &self,
        _key: &str,
        _data: Vec<u8>,
        _scope: CacheScope,
        _expiry: Option<Duration>,
    ) -> Result<()> {
        Ok(())
    }

    fn contains(&self, _key: &str) -> Result<bool> {
        Ok(false)
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn remove_prefix(&self, _prefix: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// An in-memory cache.
///
/// This cache stores data in a `HashMap` protected by a `RwLock`. It's
/// suitable for short-lived applications or when disk caching is not needed.
///
/// The cache has an optional maximum size in bytes covering the mutable and
/// protected scopes. When the limit is exceeded, the least recently used
/// mutable entries are evicted first, then the least recently used protected
/// ones. A hit through [`Cache::get`] counts as a use; [`Cache::contains`]
/// does not. An entry larger than the whole limit is not stored. Endpoint
/// entries do not count against the limit.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    data: Arc<RwLock<MemoryCacheInner>>,
    max_size: Option<usize>,
}

#[derive(Debug)]
struct Entry {
    data: Vec<u8>,
    scope: CacheScope,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }

    fn weight(&self) -> usize {
        match self.scope {
            CacheScope::Endpoint => 0,
            CacheScope::Mutable | CacheScope::Protected => self.data.len(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Entry>,
    /// Least recently used first, per evictable scope.
    mutable_order: VecDeque<String>,
    protected_order: VecDeque<String>,
    current_size: usize,
}

impl MemoryCacheInner {
    fn order_mut(&mut self, scope: CacheScope) -> Option<&mut VecDeque<String>> {
        match scope {
            CacheScope::Endpoint => None,
            CacheScope::Mutable => Some(&mut self.mutable_order),
            CacheScope::Protected => Some(&mut self.protected_order),
        }
    }

    fn touch(&mut self, key: &str, scope: CacheScope) {
        let Some(order) = self.order_mut(scope) else {
            return;
        };
        if let Some(position) = order.iter().position(|k| k == key) {
            order.remove(position);
            order.push_back(key.to_string());
        }
    }

    fn remove_entry(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.current_size -= entry.weight();
            if let Some(order) = self.order_mut(entry.scope) {
                order.retain(|k| k != key);
            }
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .mutable_order
            .pop_front()
            .or_else(|| self.protected_order.pop_front());
        let Some(oldest) = oldest else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&oldest) {
            self.current_size -= entry.weight();
            tracing::trace!(key = %oldest, "evicted");
        }
        true
    }
}

impl MemoryCache {
    /// Create a new memory cache with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_size: None,
        }
    }

    /// Create a new memory cache with a maximum size in bytes.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_size: Some(max_size),
        }
    }

    /// Get the current size of evictable data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().current_size
    }

    /// Get the number of cached entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryCacheInner> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryCacheInner> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut cache = self.write();
        let Some(entry) = cache.entries.get(key).filter(|entry| entry.is_live(now)) else {
            return Ok(None);
        };
        let (data, scope) = (entry.data.clone(), entry.scope);
        cache.touch(key, scope);
        Ok(Some(data))
    }

    fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        scope: CacheScope,
        expiry: Option<Duration>,
    ) -> Result<()> {
        let mut cache = self.write();

        // If the entry already exists, remove it first.
        cache.remove_entry(key);

        let entry = Entry {
            data,
            scope,
            expires_at: expiry.map(|expiry| Instant::now() + expiry),
        };
        let weight = entry.weight();

        // Evict least recently used entries if we have a size limit.
        if let Some(max_size) = self.max_size {
            if weight > max_size {
                tracing::debug!(key, weight, max_size, "entry exceeds cache size, not stored");
                return Ok(());
            }
            while cache.current_size + weight > max_size && cache.evict_oldest() {}
        }

        if let Some(order) = cache.order_mut(scope) {
            order.push_back(key.to_string());
        }
        cache.entries.insert(key.to_string(), entry);
        cache.current_size += weight;
        Ok(())
    }

    fn contains(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .read()
            .entries
            .get(key)
            .is_some_and(|entry| entry.is_live(now)))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write().remove_entry(key);
        Ok(())
    }

    fn remove_prefix(&self, prefix: &str) -> Result<()> {
        let mut cache = self.write();
        let keys: Vec<String> = cache
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            cache.remove_entry(key);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut cache = self.write();
        cache.entries.clear();
        cache.mutable_order.clear();
        cache.protected_order.clear();
        cache.current_size = 0;
        Ok(())
    }
}
