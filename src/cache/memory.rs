use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{CacheStorage, CachedEntry};
use crate::errors::IronlogError;
use crate::network::{Request, Response};

/// Response caches held in memory, keyed by bucket then request identity
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RefCell<BTreeMap<String, BTreeMap<String, CachedEntry>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn open(&self, bucket: &str) -> Result<(), IronlogError> {
        self.buckets
            .borrow_mut()
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }

    fn bucket_names(&self) -> Result<Vec<String>, IronlogError> {
        Ok(self.buckets.borrow().keys().cloned().collect())
    }

    fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), IronlogError> {
        self.buckets
            .borrow_mut()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                request.identity(),
                CachedEntry {
                    request: request.clone(),
                    response: response.clone(),
                },
            );
        Ok(())
    }

    fn match_in(&self, bucket: &str, request: &Request) -> Result<Option<Response>, IronlogError> {
        Ok(self
            .buckets
            .borrow()
            .get(bucket)
            .and_then(|entries| entries.get(&request.identity()))
            .map(|entry| entry.response.clone()))
    }

    fn requests(&self, bucket: &str) -> Result<Vec<Request>, IronlogError> {
        Ok(self
            .buckets
            .borrow()
            .get(bucket)
            .map(|entries| entries.values().map(|e| e.request.clone()).collect())
            .unwrap_or_default())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool, IronlogError> {
        Ok(self.buckets.borrow_mut().remove(bucket).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_entry() {
        let cache = MemoryCacheStorage::new();
        let request = Request::get("/index.html");

        cache.put("b", &request, &Response::ok("/index.html", "v1")).unwrap();
        cache.put("b", &request, &Response::ok("/index.html", "v2")).unwrap();

        assert_eq!(cache.match_in("b", &request).unwrap().unwrap().text(), "v2");
        assert_eq!(cache.requests("b").unwrap(), vec![request]);
    }

    #[test]
    fn test_method_is_part_of_identity() {
        let cache = MemoryCacheStorage::new();
        cache
            .put("b", &Request::get("/api"), &Response::ok("/api", "get"))
            .unwrap();

        assert!(cache.match_in("b", &Request::new("POST", "/api")).unwrap().is_none());
    }

    #[test]
    fn test_delete_bucket() {
        let cache = MemoryCacheStorage::new();
        cache.open("b").unwrap();

        assert!(cache.delete_bucket("b").unwrap());
        assert!(!cache.delete_bucket("b").unwrap());
        assert!(cache.bucket_names().unwrap().is_empty());
        assert!(cache.requests("b").unwrap().is_empty());
    }
}
