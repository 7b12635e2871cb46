// Durable key/value storage with the browser local-storage contract.
// Every value is an opaque string; callers own serialization.

pub mod file;
pub mod memory;

pub use file::FileKeyValueStore;
pub use memory::MemoryKeyValueStore;

use crate::errors::IronlogError;

/// Trait defining the interface for local key/value storage operations
pub trait KeyValueStore {
    /// Read the value stored under `key`, `None` if absent
    fn get_item(&self, key: &str) -> Result<Option<String>, IronlogError>;

    /// Store `value` under `key`, replacing any previous value
    fn set_item(&self, key: &str, value: &str) -> Result<(), IronlogError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove_item(&self, key: &str) -> Result<(), IronlogError>;

    /// List all keys currently present, sorted
    fn keys(&self) -> Result<Vec<String>, IronlogError>;

    fn contains_key(&self, key: &str) -> Result<bool, IronlogError> {
        Ok(self.get_item(key)?.is_some())
    }
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for &T {
    fn get_item(&self, key: &str) -> Result<Option<String>, IronlogError> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), IronlogError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<(), IronlogError> {
        (**self).remove_item(key)
    }

    fn keys(&self) -> Result<Vec<String>, IronlogError> {
        (**self).keys()
    }
}

/// Size an entry counts against a quota. Browsers count key and value alike.
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// Keys end up as file names, so they are restricted to a safe alphabet.
pub(crate) fn validate_key(key: &str) -> Result<(), IronlogError> {
    if key.is_empty() {
        return Err(IronlogError::InvalidUserInput {
            field: "key".to_string(),
            reason: "Storage key cannot be empty".to_string(),
        });
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(IronlogError::InvalidUserInput {
            field: "key".to_string(),
            reason: format!(
                "Storage key {key:?} must contain only alphanumeric characters, underscores, hyphens and dots"
            ),
        });
    }

    Ok(())
}
