//! Read-through cache for offering list pages.
//!
//! A page is keyed by the exact filter set and page number.  Entries live
//! for a fixed TTL; any offering write flushes every cached page at once.
//! The cache is an optimisation only: if the store misbehaves, the request
//! is answered straight from the database.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use tutorhub_shared::constants::OFFERING_CACHE_PREFIX;
use tutorhub_store::{Offering, OfferingFilters, Page};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    #[error("cache encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A string key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Drop every entry whose key starts with `prefix`.
    async fn flush_prefix(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Evict expired entries.
    async fn purge_expired(&self) -> usize;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CachedEntry {
    value: String,
    expires_at: Instant,
}

impl CachedEntry {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, CachedEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| entry.value.clone()))
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            CachedEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn flush_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before - entries.len())
    }

    async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_fresh());
        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, "Purged expired page cache entries");
        }
        removed
    }
}

// ---------------------------------------------------------------------------
// Offering page cache
// ---------------------------------------------------------------------------

/// Cache key for one listing page.
///
/// The filter struct serializes every field, absent ones as `null`, so two
/// requests share a key exactly when they ask for the same thing.
pub fn cache_key(filters: &OfferingFilters, page: u32) -> String {
    let canonical = serde_json::to_string(filters).unwrap_or_default();
    let digest = blake3::hash(format!("{canonical}|page={page}").as_bytes());
    format!("{OFFERING_CACHE_PREFIX}{}", digest.to_hex())
}

#[derive(Clone)]
pub struct OfferingPageCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl OfferingPageCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Return the cached page, or run `load` and remember its result.
    pub async fn get_page<F, E>(
        &self,
        filters: &OfferingFilters,
        page: u32,
        load: F,
    ) -> Result<Page<Offering>, E>
    where
        F: FnOnce() -> Result<Page<Offering>, E>,
    {
        let key = cache_key(filters, page);

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(page) => {
                    debug!(key = %key, "offering page cache hit");
                    return Ok(page);
                }
                Err(e) => warn!(key = %key, error = %e, "discarding unreadable cached page"),
            },
            Ok(None) => debug!(key = %key, "offering page cache miss"),
            Err(e) => warn!(key = %key, error = %e, "page cache read failed, querying directly"),
        }

        let fresh = load()?;

        match serde_json::to_string(&fresh) {
            Ok(raw) => {
                if let Err(e) = self.store.put(&key, raw, self.ttl).await {
                    warn!(key = %key, error = %e, "page cache write failed");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "could not encode page for the cache"),
        }

        Ok(fresh)
    }

    /// Forget every cached listing page.
    pub async fn invalidate_all(&self) {
        match self.store.flush_prefix(OFFERING_CACHE_PREFIX).await {
            Ok(flushed) => debug!(flushed, "offering page cache flushed"),
            Err(e) => warn!(error = %e, "offering page cache flush failed"),
        }
    }

    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tutorhub_shared::{OfferingStatus, SortOrder};

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn put(&self, _: &str, _: String, _: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn flush_prefix(&self, _: &str) -> Result<usize, CacheError> {
            Err(CacheError::Unavailable("connection refused".into()))
        }
        async fn purge_expired(&self) -> usize {
            0
        }
    }

    fn empty_page(total: u64) -> Page<Offering> {
        Page::new(Vec::new(), 1, 10, total)
    }

    #[test]
    fn key_depends_on_every_filter_and_the_page() {
        let none = OfferingFilters::default();
        let pending = OfferingFilters {
            status: Some(OfferingStatus::Pending),
            ..Default::default()
        };
        let sorted = OfferingFilters {
            sort: Some(SortOrder::BudgetHigh),
            ..Default::default()
        };

        assert_eq!(cache_key(&none, 1), cache_key(&OfferingFilters::default(), 1));
        assert_ne!(cache_key(&none, 1), cache_key(&none, 2));
        assert_ne!(cache_key(&none, 1), cache_key(&pending, 1));
        assert_ne!(cache_key(&pending, 1), cache_key(&sorted, 1));
        assert!(cache_key(&none, 1).starts_with(OFFERING_CACHE_PREFIX));
    }

    #[tokio::test]
    async fn hit_skips_the_loader() {
        let cache = OfferingPageCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(300));
        let filters = OfferingFilters::default();
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok::<_, ()>(empty_page(3))
        };

        assert_eq!(cache.get_page(&filters, 1, load).await.unwrap().total, 3);
        assert_eq!(cache.get_page(&filters, 1, load).await.unwrap().total, 3);
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn invalidation_forces_a_reload() {
        let cache = OfferingPageCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(300));
        let filters = OfferingFilters::default();

        cache
            .get_page(&filters, 1, || Ok::<_, ()>(empty_page(1)))
            .await
            .unwrap();
        cache.invalidate_all().await;
        let page = cache
            .get_page(&filters, 1, || Ok::<_, ()>(empty_page(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
    }

    #[tokio::test]
    async fn expired_entries_are_reloaded_and_purged() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = OfferingPageCache::new(store.clone(), Duration::ZERO);
        let filters = OfferingFilters::default();

        cache
            .get_page(&filters, 1, || Ok::<_, ()>(empty_page(1)))
            .await
            .unwrap();
        let page = cache
            .get_page(&filters, 1, || Ok::<_, ()>(empty_page(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn broken_store_falls_through() {
        let cache = OfferingPageCache::new(Arc::new(BrokenStore), Duration::from_secs(300));
        let page = cache
            .get_page(&OfferingFilters::default(), 1, || Ok::<_, ()>(empty_page(7)))
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        cache.invalidate_all().await;
    }

    #[tokio::test]
    async fn loader_errors_propagate() {
        let cache = OfferingPageCache::new(Arc::new(MemoryCacheStore::new()), Duration::from_secs(300));
        let result = cache
            .get_page(&OfferingFilters::default(), 1, || Err::<Page<Offering>, _>("db down"))
            .await;
        assert_eq!(result.unwrap_err(), "db down");
    }
}
