use chrono::Utc;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{InProgressSession, SessionStore};
use crate::errors::IronlogError;
use crate::storage::KeyValueStore;

/// One logged set of an exercise
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SetEntry {
    pub weight: f64,
    pub reps: u32,
}

/// A finished workout, ready for the history journal and the remote store
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedWorkout {
    pub routine_id: String,
    pub data: Value,
    /// Epoch milliseconds
    pub started_at: i64,
    /// Epoch milliseconds
    pub completed_at: i64,
}

/// The workout currently being logged.
///
/// Passed explicitly to whatever records sets or runs the autosave tick; there
/// is no process-wide "current routine".
#[derive(Clone, Debug, PartialEq)]
pub struct SessionContext {
    routine_id: String,
    /// Start of the workout. Sessions stored without a start time fall back
    /// to their last save time.
    started_at: i64,
    data: Map<String, Value>,
}

impl SessionContext {
    pub fn begin(routine_id: &str) -> Result<Self, IronlogError> {
        if routine_id.is_empty() {
            return Err(IronlogError::InvalidUserInput {
                field: "routine_id".to_string(),
                reason: "Routine ID cannot be empty".to_string(),
            });
        }

        info!("Starting workout for routine {routine_id}");
        Ok(Self {
            routine_id: routine_id.to_string(),
            started_at: Utc::now().timestamp_millis(),
            data: Map::new(),
        })
    }

    /// Pick a stored session back up, e.g. after a reload or a restored backup
    pub fn resume(session: InProgressSession) -> Self {
        let data = match session.data {
            Value::Object(map) => map,
            other => {
                warn!("Discarding non-object session data: {other}");
                Map::new()
            }
        };

        info!("Resuming workout for routine {}", session.routine_id);
        Self {
            routine_id: session.routine_id,
            started_at: session.started_at.unwrap_or(session.timestamp),
            data,
        }
    }

    pub fn routine_id(&self) -> &str {
        &self.routine_id
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn data(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn record_set(&mut self, exercise: &str, weight: f64, reps: u32) -> Result<(), IronlogError> {
        if exercise.trim().is_empty() {
            return Err(IronlogError::InvalidUserInput {
                field: "exercise".to_string(),
                reason: "Exercise name cannot be empty".to_string(),
            });
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(IronlogError::InvalidUserInput {
                field: "weight".to_string(),
                reason: format!("Weight must be a non-negative number, got {weight}"),
            });
        }
        if reps == 0 {
            return Err(IronlogError::InvalidUserInput {
                field: "reps".to_string(),
                reason: "Reps must be at least 1".to_string(),
            });
        }

        let entry = serde_json::to_value(SetEntry { weight, reps })
            .map_err(|e| IronlogError::SessionSerialize { source: e })?;

        let sets = self
            .data
            .entry(exercise.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match sets {
            Value::Array(sets) => sets.push(entry),
            // stored data from an older client used another shape for this exercise
            other => *other = Value::Array(vec![entry]),
        }

        debug!("Recorded {reps} x {weight} for {exercise}");
        Ok(())
    }

    /// Sets logged for `exercise`. Entries that do not parse as sets are skipped.
    pub fn sets(&self, exercise: &str) -> Vec<SetEntry> {
        match self.data.get(exercise) {
            Some(Value::Array(entries)) => entries
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn exercises(&self) -> Vec<&str> {
        self.data.keys().map(String::as_str).collect()
    }

    /// The autosave tick: persist the current state, overwriting the last save
    pub fn autosave<S: KeyValueStore>(
        &self,
        store: &SessionStore<S>,
    ) -> Result<InProgressSession, IronlogError> {
        store.save_started(&self.routine_id, &self.data(), self.started_at)
    }

    /// Snapshot of the workout as finished now, without touching storage
    pub fn finish(&self) -> CompletedWorkout {
        CompletedWorkout {
            routine_id: self.routine_id.clone(),
            data: self.data(),
            started_at: self.started_at,
            completed_at: Utc::now().timestamp_millis(),
        }
    }

    /// Finish the workout and drop the in-progress copy
    pub fn complete<S: KeyValueStore>(
        self,
        store: &SessionStore<S>,
    ) -> Result<CompletedWorkout, IronlogError> {
        let completed = self.finish();
        store.clear()?;
        info!("Completed workout for routine {}", self.routine_id);
        Ok(completed)
    }

    pub fn discard<S: KeyValueStore>(self, store: &SessionStore<S>) -> Result<(), IronlogError> {
        store.clear()?;
        info!("Discarded workout for routine {}", self.routine_id);
        Ok(())
    }
}
