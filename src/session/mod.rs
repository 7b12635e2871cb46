// In-progress workout persistence
// Keeps the single workout being logged, plus the copy taken before a version
// transition, in local storage under fixed keys.

pub mod context;

pub use context::{CompletedWorkout, SessionContext, SetEntry};

use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::IronlogError;
use crate::storage::KeyValueStore;

pub const SESSION_KEY: &str = "ironlog_session";
pub const BACKUP_SESSION_KEY: &str = "ironlog_session_backup";

/// A workout being logged that has not been committed to the remote store yet
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InProgressSession {
    pub routine_id: String,
    /// Exercise/set entries, kept as an opaque JSON object
    pub data: Value,
    /// Epoch milliseconds of the last save
    pub timestamp: i64,
    /// Epoch milliseconds the workout began. Absent in sessions saved without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
}

/// Reads and writes the in-progress session and its backup
pub struct SessionStore<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Save the session stamped with the current time, overwriting any prior value
    pub fn save(&self, routine_id: &str, data: &Value) -> Result<InProgressSession, IronlogError> {
        self.save_at(routine_id, data, Utc::now().timestamp_millis())
    }

    pub fn save_at(
        &self,
        routine_id: &str,
        data: &Value,
        timestamp: i64,
    ) -> Result<InProgressSession, IronlogError> {
        self.save_session(routine_id, data, timestamp, None)
    }

    /// Save the session stamped with the current time, recording when the
    /// workout began so it survives reloads
    pub fn save_started(
        &self,
        routine_id: &str,
        data: &Value,
        started_at: i64,
    ) -> Result<InProgressSession, IronlogError> {
        self.save_session(
            routine_id,
            data,
            Utc::now().timestamp_millis(),
            Some(started_at),
        )
    }

    fn save_session(
        &self,
        routine_id: &str,
        data: &Value,
        timestamp: i64,
        started_at: Option<i64>,
    ) -> Result<InProgressSession, IronlogError> {
        if routine_id.is_empty() {
            return Err(IronlogError::InvalidUserInput {
                field: "routine_id".to_string(),
                reason: "Routine ID cannot be empty".to_string(),
            });
        }
        if !data.is_object() {
            return Err(IronlogError::InvalidUserInput {
                field: "data".to_string(),
                reason: "Session data must be a JSON object".to_string(),
            });
        }

        let session = InProgressSession {
            routine_id: routine_id.to_string(),
            data: data.clone(),
            timestamp,
            started_at,
        };
        self.write(SESSION_KEY, &session)?;
        debug!("Saved in-progress session for routine {routine_id}");
        Ok(session)
    }

    /// Load the in-progress session. Missing or unreadable data degrades to `None`.
    pub fn load(&self) -> Option<InProgressSession> {
        self.read(SESSION_KEY)
    }

    pub fn clear(&self) -> Result<(), IronlogError> {
        self.store.remove_item(SESSION_KEY)
    }

    /// Copy the in-progress session to the backup key.
    /// Returns whether there was a session to back up.
    pub fn backup(&self) -> Result<bool, IronlogError> {
        match self.load() {
            Some(session) => {
                self.write(BACKUP_SESSION_KEY, &session)?;
                info!(
                    "Backed up in-progress session for routine {}",
                    session.routine_id
                );
                Ok(true)
            }
            None => {
                debug!("No in-progress session to back up");
                Ok(false)
            }
        }
    }

    pub fn load_backup(&self) -> Option<InProgressSession> {
        self.read(BACKUP_SESSION_KEY)
    }

    pub fn has_backup(&self) -> Result<bool, IronlogError> {
        self.store.contains_key(BACKUP_SESSION_KEY)
    }

    /// Move the backup into the active session slot and drop the backup.
    /// An unreadable backup is discarded and reported as `None`.
    pub fn restore_backup(&self) -> Result<Option<InProgressSession>, IronlogError> {
        let Some(session) = self.load_backup() else {
            self.clear_backup()?;
            return Ok(None);
        };

        self.write(SESSION_KEY, &session)?;
        self.clear_backup()?;
        info!("Restored session for routine {} from backup", session.routine_id);
        Ok(Some(session))
    }

    pub fn clear_backup(&self) -> Result<(), IronlogError> {
        self.store.remove_item(BACKUP_SESSION_KEY)
    }

    fn write(&self, key: &str, session: &InProgressSession) -> Result<(), IronlogError> {
        let json = serde_json::to_string(session)
            .map_err(|e| IronlogError::SessionSerialize { source: e })?;
        self.store.set_item(key, &json)
    }

    fn read(&self, key: &str) -> Option<InProgressSession> {
        let json = match self.store.get_item(key) {
            Ok(Some(json)) => json,
            Ok(None) => return None,
            Err(e) => {
                warn!("Could not read {key}: {e}");
                return None;
            }
        };

        match serde_json::from_str(&json) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Ignoring corrupted session data under {key}: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyValueStore;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_data() -> Value {
        json!({
            "Squats": [{"weight": 100.0, "reps": 5}],
            "Bench Press": []
        })
    }

    #[test]
    fn test_save_and_load() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);

        let saved = store.save_at("routine-a", &sample_data(), 1_700_000_000_000).unwrap();
        assert_eq!(store.load(), Some(saved));
    }

    #[test]
    fn test_save_uses_camel_case_fields() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);
        store.save_at("routine-a", &json!({}), 42).unwrap();

        let raw: Value = serde_json::from_str(&kv.get_item(SESSION_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw, json!({"routineId": "routine-a", "data": {}, "timestamp": 42}));
    }

    #[test]
    fn test_save_started_records_start_time() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);
        let saved = store.save_started("routine-a", &json!({}), 7).unwrap();
        assert_eq!(saved.started_at, Some(7));

        let raw: Value = serde_json::from_str(&kv.get_item(SESSION_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["startedAt"], json!(7));

        // sessions written without a start time still load
        kv.set_item(
            SESSION_KEY,
            r#"{"routineId": "routine-a", "data": {}, "timestamp": 42}"#,
        )
        .unwrap();
        assert_eq!(store.load().unwrap().started_at, None);
    }

    #[test]
    fn test_save_overwrites() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);

        store.save_at("routine-a", &json!({}), 1).unwrap();
        store.save_at("routine-b", &json!({}), 2).unwrap();
        assert_eq!(store.load().unwrap().routine_id, "routine-b");
    }

    #[test]
    fn test_save_stamps_current_time() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);

        let before = Utc::now().timestamp_millis();
        let saved = store.save("routine-a", &json!({})).unwrap();
        assert!(saved.timestamp >= before);
    }

    #[test]
    fn test_save_rejects_non_object_data() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);

        assert!(matches!(
            store.save("routine-a", &json!([1, 2])),
            Err(IronlogError::InvalidUserInput { .. })
        ));
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_quota_exceeded() {
        let kv = MemoryKeyValueStore::with_quota(32);
        let store = SessionStore::new(&kv);

        let err = store.save("routine-a", &sample_data()).unwrap_err();
        assert!(matches!(err, IronlogError::StorageQuotaExceeded { .. }));
    }

    #[test]
    fn test_load_empty_store() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);
        assert_eq!(store.load(), None);
        assert_eq!(store.load_backup(), None);
    }

    #[test]
    fn test_load_corrupted_data() {
        let kv = MemoryKeyValueStore::new();
        kv.set_item(SESSION_KEY, "{not json").unwrap();
        kv.set_item(BACKUP_SESSION_KEY, "{\"routineId\": 5}").unwrap();

        let store = SessionStore::new(&kv);
        assert_eq!(store.load(), None);
        assert_eq!(store.load_backup(), None);
    }

    #[test]
    fn test_backup_and_restore() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);

        assert!(!store.backup().unwrap());
        assert!(!store.has_backup().unwrap());

        let saved = store.save_at("routine-a", &sample_data(), 10).unwrap();
        assert!(store.backup().unwrap());
        assert_eq!(store.load_backup(), Some(saved.clone()));

        store.clear().unwrap();
        assert_eq!(store.restore_backup().unwrap(), Some(saved.clone()));
        assert_eq!(store.load(), Some(saved));
        assert!(!store.has_backup().unwrap());
    }

    #[test]
    fn test_restore_corrupted_backup_discards_it() {
        let kv = MemoryKeyValueStore::new();
        kv.set_item(BACKUP_SESSION_KEY, "garbage").unwrap();

        let store = SessionStore::new(&kv);
        assert_eq!(store.restore_backup().unwrap(), None);
        assert!(!store.has_backup().unwrap());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_clear_backup_is_idempotent() {
        let kv = MemoryKeyValueStore::new();
        let store = SessionStore::new(&kv);

        store.save_at("routine-a", &json!({}), 1).unwrap();
        store.backup().unwrap();
        store.clear_backup().unwrap();
        store.clear_backup().unwrap();
        assert!(store.load_backup().is_none());
        // the active session is untouched
        assert!(store.load().is_some());
    }

    fn arb_data() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(
            "[A-Za-z ]{1,16}",
            prop::collection::vec((0u32..500, 1u32..30), 0..6),
            0..5,
        )
        .prop_map(|exercises| {
            let map = exercises
                .into_iter()
                .map(|(name, sets)| {
                    let sets = sets
                        .into_iter()
                        .map(|(weight, reps)| json!({"weight": weight, "reps": reps}))
                        .collect::<Vec<_>>();
                    (name, Value::Array(sets))
                })
                .collect::<serde_json::Map<_, _>>();
            Value::Object(map)
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_save_load_round_trip(
            routine_id in "[a-z0-9-]{1,24}",
            data in arb_data(),
            timestamp in 0i64..4_102_444_800_000,
        ) {
            let kv = MemoryKeyValueStore::new();
            let store = SessionStore::new(&kv);

            let saved = store.save_at(&routine_id, &data, timestamp).unwrap();
            prop_assert_eq!(store.load(), Some(saved));
        }

        #[test]
        fn prop_clear_is_idempotent(routine_id in "[a-z0-9-]{1,24}", data in arb_data()) {
            let once = MemoryKeyValueStore::new();
            let twice = MemoryKeyValueStore::new();

            for kv in [&once, &twice] {
                SessionStore::new(kv).save(&routine_id, &data).unwrap();
            }
            SessionStore::new(&once).clear().unwrap();
            let store = SessionStore::new(&twice);
            store.clear().unwrap();
            store.clear().unwrap();

            prop_assert_eq!(once.keys().unwrap(), twice.keys().unwrap());
            prop_assert!(store.load().is_none());
        }

        #[test]
        fn prop_garbage_never_loads(garbage in ".*") {
            let kv = MemoryKeyValueStore::new();
            kv.set_item(SESSION_KEY, &garbage).unwrap();

            // whatever is stored, load never panics and never errors
            let _ = SessionStore::new(&kv).load();
        }
    }
}
