// Offline cache
// Versioned buckets of pre-fetched responses and the service worker lifecycle
// that fills, serves and evicts them.

pub mod file;
pub mod memory;
pub mod worker;

pub use file::FileCacheStorage;
pub use memory::MemoryCacheStorage;
pub use worker::{ServiceWorker, WorkerConfig, WorkerRegistration, WorkerState};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::IronlogError;
use crate::network::{Request, Response};

const BUCKET_PREFIX: &str = "ironlog-cache-v";

/// Name of the cache generation belonging to `version`. Characters that
/// cannot appear in a bucket name (e.g. `+` in semver build metadata) become `_`.
pub fn bucket_name(version: &str) -> String {
    let version: String = version
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{BUCKET_PREFIX}{version}")
}

/// A stored request/response pair
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CachedEntry {
    pub request: Request,
    pub response: Response,
}

/// Trait defining the interface for named response caches
pub trait CacheStorage {
    /// Create `bucket` if it does not exist yet
    fn open(&self, bucket: &str) -> Result<(), IronlogError>;

    /// Names of all existing buckets, sorted
    fn bucket_names(&self) -> Result<Vec<String>, IronlogError>;

    /// Store `response` for `request` in `bucket`, replacing an earlier entry
    fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), IronlogError>;

    /// Look `request` up in a single bucket
    fn match_in(&self, bucket: &str, request: &Request) -> Result<Option<Response>, IronlogError>;

    /// Requests stored in `bucket`
    fn requests(&self, bucket: &str) -> Result<Vec<Request>, IronlogError>;

    /// Delete `bucket`, returning whether it existed
    fn delete_bucket(&self, bucket: &str) -> Result<bool, IronlogError>;

    /// Look `request` up across all buckets, oldest name first
    fn match_any(&self, request: &Request) -> Result<Option<Response>, IronlogError> {
        for bucket in self.bucket_names()? {
            if let Some(response) = self.match_in(&bucket, request)? {
                debug!("Cache hit for {} in {}", request.identity(), bucket);
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

impl<T: CacheStorage + ?Sized> CacheStorage for &T {
    fn open(&self, bucket: &str) -> Result<(), IronlogError> {
        (**self).open(bucket)
    }

    fn bucket_names(&self) -> Result<Vec<String>, IronlogError> {
        (**self).bucket_names()
    }

    fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), IronlogError> {
        (**self).put(bucket, request, response)
    }

    fn match_in(&self, bucket: &str, request: &Request) -> Result<Option<Response>, IronlogError> {
        (**self).match_in(bucket, request)
    }

    fn requests(&self, bucket: &str) -> Result<Vec<Request>, IronlogError> {
        (**self).requests(bucket)
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool, IronlogError> {
        (**self).delete_bucket(bucket)
    }
}
