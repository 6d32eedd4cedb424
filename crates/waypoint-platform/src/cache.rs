use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use waypoint_cbor::Hash;

/// Identity of a memoised route payload: logical route, resolved path and search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub route: String,
    pub path: String,
    pub search: String,
    pub digest: Hash,
}

#[derive(Serialize)]
struct KeyFields<'a> {
    route: &'a str,
    path: &'a str,
    search: &'a str,
}

impl CacheKey {
    pub fn new(
        route: impl Into<String>,
        path: impl Into<String>,
        search: impl Into<String>,
    ) -> Result<Self, serde_cbor::Error> {
        let (route, path, search) = (route.into(), path.into(), search.into());
        let digest = Hash::of_cbor(&KeyFields {
            route: &route,
            path: &path,
            search: &search,
        })?;
        Ok(Self {
            route,
            path,
            search,
            digest,
        })
    }
}

/// Keyed memo consumed by the cache stage.
pub trait MemoCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> bool;
    fn set(&self, key: CacheKey);
    fn clear(&self, predicate: &dyn Fn(&CacheKey) -> bool);
}

#[derive(Debug, Clone, Default)]
pub struct MemCache {
    keys: Arc<RwLock<HashSet<CacheKey>>>,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoCache for MemCache {
    fn get(&self, key: &CacheKey) -> bool {
        self.keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    fn set(&self, key: CacheKey) {
        log::trace!("memoised {} ({})", key.path, key.digest.short());
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    fn clear(&self, predicate: &dyn Fn(&CacheKey) -> bool) {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|key| !predicate(key));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_depends_on_every_field() {
        let a = CacheKey::new("orders", "/orders/7", "?page=1").unwrap();
        let b = CacheKey::new("orders", "/orders/7", "?page=2").unwrap();
        let c = CacheKey::new("orders", "/orders/7", "?page=1").unwrap();
        assert_ne!(a.digest, b.digest);
        assert_eq!(a, c);
    }

    #[test]
    fn clear_honours_predicate() {
        let cache = MemCache::new();
        cache.set(CacheKey::new("orders", "/orders/1", "").unwrap());
        cache.set(CacheKey::new("orders", "/orders/2", "").unwrap());
        cache.set(CacheKey::new("profile", "/me", "").unwrap());
        cache.clear(&|key| key.route == "orders");
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::new("profile", "/me", "").unwrap()));
        assert!(!cache.get(&CacheKey::new("orders", "/orders/1", "").unwrap()));
    }
}
