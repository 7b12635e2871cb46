use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use log::{info, warn};

use crate::errors::IronlogError;
use crate::session::CompletedWorkout;

const JOURNAL_FILE_NAME: &str = "history.jsonl";

/// Append-only JSON-lines record of completed workouts
pub struct HistoryJournal {
    path: PathBuf,
}

impl HistoryJournal {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Journal stored alongside the other data in `data_dir`
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(JOURNAL_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, workout: &CompletedWorkout) -> Result<(), IronlogError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IronlogError::HistoryIo { source: e })?;
        }
        serde_jsonlines::append_json_lines(&self.path, [workout])
            .map_err(|e| IronlogError::HistoryIo { source: e })?;
        info!("Recorded completed workout for routine {}", workout.routine_id);
        Ok(())
    }

    /// All readable entries in the order they were written. A missing journal is empty.
    pub fn entries(&self) -> Result<Vec<CompletedWorkout>, IronlogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let lines = serde_jsonlines::json_lines::<CompletedWorkout, _>(&self.path)
            .map_err(|e| IronlogError::HistoryIo { source: e })?;

        let mut entries = Vec::new();
        for line in lines {
            match line {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!("Skipping unreadable history entry in {:?}: {}", self.path, e),
            }
        }
        Ok(entries)
    }

    /// Days of `month` (UTC) on which a workout was completed
    pub fn active_days(&self, year: i32, month: u32) -> Result<BTreeSet<u32>, IronlogError> {
        if !(1..=12).contains(&month) {
            return Err(IronlogError::InvalidUserInput {
                field: "month".to_string(),
                reason: format!("Month must be between 1 and 12, got {month}"),
            });
        }

        Ok(self
            .entries()?
            .iter()
            .filter_map(|entry| DateTime::<Utc>::from_timestamp_millis(entry.completed_at))
            .filter(|at| at.year() == year && at.month() == month)
            .map(|at| at.day())
            .collect())
    }
}
