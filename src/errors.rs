// Error types for ironlog

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum IronlogError {
    // Local storage errors
    #[snafu(display("Storage quota exceeded writing {key}: {required} bytes needed, {quota} allowed"))]
    StorageQuotaExceeded {
        key: String,
        required: usize,
        quota: usize,
    },
    #[snafu(display("Local storage {operation} failed for {key}"))]
    StorageIo {
        operation: String,
        key: String,
        source: io::Error,
    },
    #[snafu(display("Error serializing workout session"))]
    SessionSerialize { source: serde_json::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory"))]
    NoDataDir,
    #[snafu(display("Error writing config file"))]
    ConfigIO { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerialize { source: serde_json::Error },

    // Network errors
    #[snafu(display("Request to {url} failed: {reason}"))]
    Network { url: String, reason: String },
    #[snafu(display("Request to {url} returned status {status}"))]
    HttpStatus { url: String, status: u16 },
    #[snafu(display("Manifest at {url} is malformed: {reason}"))]
    ManifestMalformed { url: String, reason: String },

    // Offline cache errors
    #[snafu(display("Could not pre-cache {url} into {bucket}: {reason}"))]
    CacheInstall {
        bucket: String,
        url: String,
        reason: String,
    },
    #[snafu(display("Cache bucket {bucket} {operation} failed"))]
    CacheIo {
        bucket: String,
        operation: String,
        source: io::Error,
    },
    #[snafu(display("Service worker for {version} is {state}, cannot {operation}"))]
    WorkerState {
        version: String,
        state: String,
        operation: String,
    },

    // Workout history errors
    #[snafu(display("Error accessing workout history journal"))]
    HistoryIo { source: io::Error },

    // User input validation errors
    #[snafu(display("Invalid user input: {field} - {reason}"))]
    InvalidUserInput { field: String, reason: String },
}
