//! Cache storage.
//!
//! # Responsibilities
//! - Hold cached response variants per primary key
//! - Stay safe under concurrent reads/writes from parallel calls
//!
//! # Design Decisions
//! - The store is pluggable; hosts may back it with a shared cache
//! - Each primary key holds a list of variants discriminated by `vary` values
//! - The in-memory store is bounded; inserts beyond capacity evict an arbitrary key

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use http_cache_semantics::CachePolicy;

/// One stored response variant.
///
/// The policy owns freshness, `vary` matching and revalidation headers.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub policy: CachePolicy,
}

/// Shared cache storage consumed by the caching transport.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Vec<CachedResponse>>;
    fn put(&self, key: &str, variants: Vec<CachedResponse>);
    fn remove(&self, key: &str);
}

/// Bounded in-process store.
#[derive(Debug, Clone)]
pub struct MemoryCacheStore {
    inner: Arc<DashMap<String, Vec<CachedResponse>>>,
    max_entries: usize,
}

impl MemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<Vec<CachedResponse>> {
        self.inner.get(key).map(|r| r.value().clone())
    }

    fn put(&self, key: &str, variants: Vec<CachedResponse>) {
        if !self.inner.contains_key(key) && self.inner.len() >= self.max_entries {
            let victim = self.inner.iter().next().map(|r| r.key().clone());
            if let Some(victim) = victim {
                self.inner.remove(&victim);
            }
        }
        self.inner.insert(key.to_string(), variants);
    }

    fn remove(&self, key: &str) {
        self.inner.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(body: &'static str) -> CachedResponse {
        let request = http::Request::get("http://x/").body(()).unwrap();
        let response = http::Response::builder()
            .header("cache-control", "max-age=60")
            .body(())
            .unwrap();
        CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            policy: CachePolicy::new(&request, &response),
        }
    }

    #[test]
    fn test_store_operations() {
        let store = MemoryCacheStore::new(10);
        assert!(store.get("GET http://x/").is_none());

        store.put("GET http://x/", vec![entry("a")]);
        let variants = store.get("GET http://x/").unwrap();
        assert_eq!(variants.len(), 1);
        assert_eq!(variants[0].body, Bytes::from_static(b"a"));

        store.remove("GET http://x/");
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_is_bounded() {
        let store = MemoryCacheStore::new(2);
        store.put("a", vec![entry("a")]);
        store.put("b", vec![entry("b")]);
        store.put("c", vec![entry("c")]);
        assert_eq!(store.len(), 2);
        assert!(store.get("c").is_some());
    }
}
