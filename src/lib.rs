// Library interface for ironlog
// This allows integration tests to access internal modules

pub mod app;
pub mod cache;
pub mod config;
pub mod errors;
pub mod history;
pub mod network;
pub mod session;
pub mod storage;
pub mod version;

// Re-export commonly used types
pub use app::App;
pub use cache::{
    CacheStorage, ServiceWorker, WorkerConfig, WorkerRegistration, WorkerState, bucket_name,
};
pub use config::AppConfig;
pub use errors::IronlogError;
pub use history::HistoryJournal;
pub use network::{Fetcher, HttpFetcher, Request, Response, StaticFetcher};
pub use session::{CompletedWorkout, InProgressSession, SessionContext, SessionStore};
pub use storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use version::{StartupReport, VersionManager, VersionOutcome};
