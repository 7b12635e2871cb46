// File-backed implementation of local key/value storage

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{KeyValueStore, entry_size, validate_key};
use crate::errors::IronlogError;

const ITEM_EXTENSION: &str = "item";

/// Stores each key in its own file under a directory
pub struct FileKeyValueStore {
    /// Base directory holding one file per key
    storage_path: PathBuf,
    /// Maximum bytes (keys plus values) the store may hold
    quota_bytes: Option<usize>,
}

impl FileKeyValueStore {
    /// Create a new file-backed store, creating the directory if needed
    pub fn new(storage_path: PathBuf) -> Result<Self, IronlogError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path).map_err(|e| IronlogError::StorageIo {
                operation: "create_dir".to_string(),
                key: storage_path.display().to_string(),
                source: e,
            })?;
        }

        Ok(Self {
            storage_path,
            quota_bytes: None,
        })
    }

    pub fn with_quota(mut self, quota_bytes: Option<usize>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Get the default storage path for local items
    pub fn default_storage_path() -> Result<PathBuf, IronlogError> {
        let app_data_dir = dirs::data_dir().ok_or(IronlogError::NoDataDir)?;
        Ok(app_data_dir.join("ironlog").join("local_storage"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn file_path_for_key(&self, key: &str) -> PathBuf {
        self.storage_path.join(format!("{key}.{ITEM_EXTENSION}"))
    }

    fn io_error(operation: &str, key: &str, source: io::Error) -> IronlogError {
        IronlogError::StorageIo {
            operation: operation.to_string(),
            key: key.to_string(),
            source,
        }
    }

    /// Bytes used by every key except `excluded`
    fn used_bytes_excluding(&self, excluded: &str) -> Result<usize, IronlogError> {
        let mut used = 0;
        for key in self.keys()? {
            if key == excluded {
                continue;
            }
            let len = fs::metadata(self.file_path_for_key(&key))
                .map(|m| m.len() as usize)
                .unwrap_or(0);
            used += key.len() + len;
        }
        Ok(used)
    }

    fn check_quota(&self, key: &str, value: &str) -> Result<(), IronlogError> {
        let Some(quota) = self.quota_bytes else {
            return Ok(());
        };

        let required = self.used_bytes_excluding(key)? + entry_size(key, value);
        if required > quota {
            warn!("Refusing to store {key}: {required} bytes exceeds quota of {quota}");
            return Err(IronlogError::StorageQuotaExceeded {
                key: key.to_string(),
                required,
                quota,
            });
        }
        Ok(())
    }

    /// Write to a temporary file first, then atomically move it in place
    fn write_atomically(&self, key: &str, value: &str) -> Result<(), IronlogError> {
        let file_path = self.file_path_for_key(key);
        let temp_path = file_path.with_extension(format!("{ITEM_EXTENSION}.tmp"));

        {
            let mut temp_file =
                fs::File::create(&temp_path).map_err(|e| Self::io_error("create_temp", key, e))?;
            temp_file
                .write_all(value.as_bytes())
                .map_err(|e| Self::io_error("write_temp", key, e))?;
            temp_file
                .sync_all()
                .map_err(|e| Self::io_error("sync_temp", key, e))?;
        }

        fs::rename(&temp_path, &file_path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            Self::io_error("atomic_move", key, e)
        })
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, IronlogError> {
        validate_key(key)?;
        let file_path = self.file_path_for_key(key);

        match fs::read_to_string(&file_path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_error("read", key, e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), IronlogError> {
        validate_key(key)?;
        self.check_quota(key, value)?;
        self.write_atomically(key, value)?;
        debug!("Stored {} bytes under {}", value.len(), key);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), IronlogError> {
        validate_key(key)?;
        match fs::remove_file(self.file_path_for_key(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_error("remove", key, e)),
        }
    }

    fn keys(&self) -> Result<Vec<String>, IronlogError> {
        let entries = fs::read_dir(&self.storage_path)
            .map_err(|e| Self::io_error("list", &self.storage_path.display().to_string(), e))?;

        let mut keys = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some(ITEM_EXTENSION)
            {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}
