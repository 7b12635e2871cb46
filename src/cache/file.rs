// File-backed response caches
// Each bucket is a JSON-lines file of request/response pairs; later lines
// supersede earlier ones for the same request.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use log::{debug, warn};

use super::{CacheStorage, CachedEntry};
use crate::errors::IronlogError;
use crate::network::{Request, Response};
use crate::storage::validate_key;

const BUCKET_EXTENSION: &str = "jsonl";

pub struct FileCacheStorage {
    cache_path: PathBuf,
}

impl FileCacheStorage {
    pub fn new(cache_path: PathBuf) -> Result<Self, IronlogError> {
        if !cache_path.exists() {
            fs::create_dir_all(&cache_path).map_err(|e| IronlogError::CacheIo {
                bucket: cache_path.display().to_string(),
                operation: "create_dir".to_string(),
                source: e,
            })?;
        }

        Ok(Self { cache_path })
    }

    /// Get the default location of the offline caches
    pub fn default_cache_path() -> Result<PathBuf, IronlogError> {
        let app_data_dir = dirs::data_dir().ok_or(IronlogError::NoDataDir)?;
        Ok(app_data_dir.join("ironlog").join("offline_cache"))
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, IronlogError> {
        validate_key(bucket)?;
        Ok(self
            .cache_path
            .join(format!("{bucket}.{BUCKET_EXTENSION}")))
    }

    fn io_error(bucket: &str, operation: &str, source: io::Error) -> IronlogError {
        IronlogError::CacheIo {
            bucket: bucket.to_string(),
            operation: operation.to_string(),
            source,
        }
    }

    /// Latest entry per request identity. A missing bucket reads as empty.
    fn load_entries(&self, bucket: &str) -> Result<BTreeMap<String, CachedEntry>, IronlogError> {
        let path = self.bucket_path(bucket)?;
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let lines = serde_jsonlines::json_lines::<CachedEntry, _>(&path)
            .map_err(|e| Self::io_error(bucket, "read", e))?;

        let mut entries = BTreeMap::new();
        for line in lines {
            match line {
                Ok(entry) => {
                    entries.insert(entry.request.identity(), entry);
                }
                Err(e) => {
                    warn!("Skipping unreadable entry in cache bucket {bucket}: {e}");
                }
            }
        }
        Ok(entries)
    }
}

impl CacheStorage for FileCacheStorage {
    fn open(&self, bucket: &str) -> Result<(), IronlogError> {
        let path = self.bucket_path(bucket)?;
        if !path.exists() {
            fs::File::create(&path).map_err(|e| Self::io_error(bucket, "create", e))?;
            debug!("Opened cache bucket {bucket}");
        }
        Ok(())
    }

    fn bucket_names(&self) -> Result<Vec<String>, IronlogError> {
        let entries = fs::read_dir(&self.cache_path)
            .map_err(|e| Self::io_error(&self.cache_path.display().to_string(), "list", e))?;

        Ok(entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|s| s.to_str()) == Some(BUCKET_EXTENSION)
            })
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            })
            .sorted()
            .collect())
    }

    fn put(
        &self,
        bucket: &str,
        request: &Request,
        response: &Response,
    ) -> Result<(), IronlogError> {
        let path = self.bucket_path(bucket)?;
        let entry = CachedEntry {
            request: request.clone(),
            response: response.clone(),
        };

        serde_jsonlines::append_json_lines(&path, [&entry])
            .map_err(|e| Self::io_error(bucket, "append", e))?;
        debug!("Cached {} in {}", request.identity(), bucket);
        Ok(())
    }

    fn match_in(&self, bucket: &str, request: &Request) -> Result<Option<Response>, IronlogError> {
        Ok(self
            .load_entries(bucket)?
            .remove(&request.identity())
            .map(|entry| entry.response))
    }

    fn requests(&self, bucket: &str) -> Result<Vec<Request>, IronlogError> {
        Ok(self
            .load_entries(bucket)?
            .into_values()
            .map(|entry| entry.request)
            .collect())
    }

    fn delete_bucket(&self, bucket: &str) -> Result<bool, IronlogError> {
        let path = self.bucket_path(bucket)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(bucket, "delete", e)),
        }
    }
}
