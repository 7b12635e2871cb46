// In-process implementation of local key/value storage

use std::cell::RefCell;
use std::collections::BTreeMap;

use log::debug;

use super::{KeyValueStore, entry_size, validate_key};
use crate::errors::IronlogError;

/// Key/value storage held in memory, optionally bounded by a byte quota
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: RefCell<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: RefCell::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently counted against the quota
    pub fn used_bytes(&self) -> usize {
        self.items
            .borrow()
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, IronlogError> {
        validate_key(key)?;
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), IronlogError> {
        validate_key(key)?;
        if let Some(quota) = self.quota_bytes {
            let others: usize = self
                .items
                .borrow()
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| entry_size(k, v))
                .sum();
            let required = others + entry_size(key, value);
            if required > quota {
                return Err(IronlogError::StorageQuotaExceeded {
                    key: key.to_string(),
                    required,
                    quota,
                });
            }
        }

        debug!("Storing {} bytes under {}", value.len(), key);
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), IronlogError> {
        validate_key(key)?;
        self.items.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, IronlogError> {
        Ok(self.items.borrow().keys().cloned().collect())
    }
}
