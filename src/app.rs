// Application bootstrap: wires configuration, local storage, the offline
// cache and the network together and runs the per-start version check.

use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::IronlogError;
use crate::cache::{FileCacheStorage, ServiceWorker, WorkerConfig, WorkerRegistration};
use crate::config::AppConfig;
use crate::history::HistoryJournal;
use crate::network::{Fetcher, HttpFetcher, Request, Response};
use crate::session::{CompletedWorkout, SessionContext, SessionStore};
use crate::storage::FileKeyValueStore;
use crate::version::{StartupReport, VersionManager, resolve_manifest_version};

pub struct App<F: Fetcher> {
    config: AppConfig,
    data_dir: PathBuf,
    store: FileKeyValueStore,
    cache: FileCacheStorage,
    history: HistoryJournal,
    fetcher: F,
}

impl App<HttpFetcher> {
    pub fn from_config(config: AppConfig) -> Result<Self, IronlogError> {
        let fetcher = HttpFetcher::new(config.origin.as_deref())?;
        Self::with_fetcher(config, fetcher)
    }
}

impl<F: Fetcher> App<F> {
    pub fn with_fetcher(config: AppConfig, fetcher: F) -> Result<Self, IronlogError> {
        let data_dir = config.resolved_data_dir()?;
        let store = FileKeyValueStore::new(data_dir.join("local_storage"))?
            .with_quota(config.storage_quota_bytes);
        let cache = FileCacheStorage::new(data_dir.join("offline_cache"))?;
        let history = HistoryJournal::in_dir(&data_dir);

        Ok(Self {
            config,
            data_dir,
            store,
            cache,
            history,
            fetcher,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn sessions(&self) -> SessionStore<&FileKeyValueStore> {
        SessionStore::new(&self.store)
    }

    pub fn versions(&self) -> VersionManager<&FileKeyValueStore> {
        VersionManager::new(&self.store)
    }

    pub fn history(&self) -> &HistoryJournal {
        &self.history
    }

    pub fn cache(&self) -> &FileCacheStorage {
        &self.cache
    }

    /// Release version from the manifest, or the configured fallback
    pub fn manifest_version(&self) -> String {
        resolve_manifest_version(
            &self.fetcher,
            &self.config.manifest_url,
            &self.config.fallback_version,
        )
    }

    /// Run once per start: fetch the manifest and apply the version transition
    pub fn start(&self) -> Result<StartupReport, IronlogError> {
        let version = self.manifest_version();
        let report = self.versions().check(&version)?;
        if let Some(offer) = &report.restore_offer {
            info!(
                "Backed up workout for routine {} is waiting to be restored",
                offer.routine_id
            );
        }
        Ok(report)
    }

    /// Resume the in-progress workout, if any
    pub fn resume(&self) -> Option<SessionContext> {
        self.sessions().load().map(SessionContext::resume)
    }

    /// Record the workout in the history journal, then drop the in-progress copy
    pub fn complete(&self, context: SessionContext) -> Result<CompletedWorkout, IronlogError> {
        let completed = context.finish();
        self.history.append(&completed)?;
        self.sessions().clear()?;
        info!("Completed workout for routine {}", completed.routine_id);
        Ok(completed)
    }

    pub fn worker_config(&self, version: &str) -> WorkerConfig {
        WorkerConfig {
            version: version.to_string(),
            precache: self.config.precache_assets.clone(),
            bypass_hosts: self.config.database_hosts.clone(),
        }
    }

    /// Pre-cache `version` into its bucket without taking over; the current
    /// generation keeps serving until `activate_offline_cache`.
    pub fn install_offline_cache(&self, version: &str) -> Result<(), IronlogError> {
        let mut registration = WorkerRegistration::new();
        registration.register(ServiceWorker::new(
            self.worker_config(version),
            &self.cache,
            &self.fetcher,
        ))
    }

    /// Activate the installed generation for `version`, evicting every other
    /// bucket. Returns the evicted bucket names.
    pub fn activate_offline_cache(&self, version: &str) -> Result<Vec<String>, IronlogError> {
        let mut worker =
            ServiceWorker::adopt_installed(self.worker_config(version), &self.cache, &self.fetcher)?;
        worker.activate()
    }

    /// Install a worker for `version` and let it take over from the current one.
    /// Returns the evicted bucket names.
    pub fn update_offline_cache(&self, version: &str) -> Result<Vec<String>, IronlogError> {
        let mut registration = WorkerRegistration::new();
        registration.register(ServiceWorker::new(
            self.worker_config(version),
            &self.cache,
            &self.fetcher,
        ))?;
        let (_, evicted) = registration.activate_waiting()?;
        Ok(evicted)
    }

    /// Serve `request` through the active worker for `version`; without one
    /// the request goes straight to the network.
    pub fn fetch(&self, version: &str, request: &Request) -> Result<Response, IronlogError> {
        match ServiceWorker::adopt_active(self.worker_config(version), &self.cache, &self.fetcher)
        {
            Ok(worker) => worker.handle_fetch(request),
            Err(e) => {
                warn!("No active offline cache for {version}: {e}");
                self.fetcher.fetch(request)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStorage;
    use crate::network::StaticFetcher;
    use crate::version::{FALLBACK_VERSION, VersionOutcome};
    use tempfile::TempDir;

    fn config(dir: &Path) -> AppConfig {
        AppConfig {
            data_dir: Some(dir.to_path_buf()),
            precache_assets: vec!["/index.html".to_string()],
            ..Default::default()
        }
    }

    fn fetcher(version: &str) -> StaticFetcher {
        StaticFetcher::new()
            .route(
                "/manifest.json",
                Response::ok("/manifest.json", format!("{{\"version\":\"{version}\"}}")),
            )
            .route("/index.html", Response::ok("/index.html", "<html>"))
    }

    #[test]
    fn test_start_first_install() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::with_fetcher(config(temp_dir.path()), fetcher("1.4.6")).unwrap();

        let report = app.start().unwrap();
        assert_eq!(
            report.outcome,
            VersionOutcome::FirstInstall {
                version: "1.4.6".to_string()
            }
        );
        assert!(temp_dir.path().join("local_storage").exists());
    }

    #[test]
    fn test_start_offline_uses_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::with_fetcher(config(temp_dir.path()), StaticFetcher::new()).unwrap();

        let report = app.start().unwrap();
        assert_eq!(
            report.outcome,
            VersionOutcome::FirstInstall {
                version: FALLBACK_VERSION.to_string()
            }
        );
    }

    #[test]
    fn test_offline_restart_keeps_installed_release() {
        let temp_dir = TempDir::new().unwrap();
        {
            let online =
                App::with_fetcher(config(temp_dir.path()), fetcher(FALLBACK_VERSION)).unwrap();
            online.start().unwrap();
            online.update_offline_cache(FALLBACK_VERSION).unwrap();
        }

        let offline = App::with_fetcher(config(temp_dir.path()), StaticFetcher::new()).unwrap();
        let report = offline.start().unwrap();
        assert_eq!(
            report.outcome,
            VersionOutcome::Unchanged {
                version: FALLBACK_VERSION.to_string()
            }
        );

        let stored = offline.versions().stored_version().unwrap().unwrap();
        assert_eq!(stored, FALLBACK_VERSION);
        let response = offline.fetch(&stored, &Request::get("/index.html")).unwrap();
        assert_eq!(response.text(), "<html>");
    }

    #[test]
    fn test_failed_offline_reinstall_keeps_cache() {
        let temp_dir = TempDir::new().unwrap();
        {
            let online = App::with_fetcher(config(temp_dir.path()), fetcher("1.4.6")).unwrap();
            online.update_offline_cache("1.4.6").unwrap();
        }

        let offline = App::with_fetcher(config(temp_dir.path()), StaticFetcher::new()).unwrap();
        assert!(matches!(
            offline.update_offline_cache("1.4.6"),
            Err(IronlogError::CacheInstall { .. })
        ));
        assert_eq!(
            offline.cache().bucket_names().unwrap(),
            vec!["ironlog-cache-v1.4.6".to_string()]
        );
        let response = offline.fetch("1.4.6", &Request::get("/index.html")).unwrap();
        assert_eq!(response.text(), "<html>");
    }

    #[test]
    fn test_install_then_activate_separately() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::with_fetcher(config(temp_dir.path()), fetcher("1.4.6")).unwrap();
        app.update_offline_cache("1.4.5").unwrap();

        app.install_offline_cache("1.4.6").unwrap();
        assert_eq!(app.cache().bucket_names().unwrap().len(), 2);
        assert!(app.activate_offline_cache("1.4.7").is_err());

        assert_eq!(
            app.activate_offline_cache("1.4.6").unwrap(),
            vec!["ironlog-cache-v1.4.5".to_string()]
        );
        assert_eq!(
            app.cache().bucket_names().unwrap(),
            vec!["ironlog-cache-v1.4.6".to_string()]
        );
    }

    #[test]
    fn test_history_keeps_workout_start_across_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::with_fetcher(config(temp_dir.path()), fetcher("1.4.6")).unwrap();

        let mut ctx = SessionContext::begin("legs").unwrap();
        let started_at = ctx.started_at();
        ctx.autosave(&app.sessions()).unwrap();
        ctx.record_set("Squats", 100.0, 5).unwrap();
        ctx.autosave(&app.sessions()).unwrap();

        let mut resumed = app.resume().unwrap();
        resumed.record_set("Squats", 105.0, 3).unwrap();
        resumed.autosave(&app.sessions()).unwrap();

        app.complete(app.resume().unwrap()).unwrap();
        let entries = app.history().entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].started_at, started_at);
    }

    #[test]
    fn test_complete_writes_history_then_clears() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::with_fetcher(config(temp_dir.path()), fetcher("1.4.6")).unwrap();

        let mut ctx = SessionContext::begin("legs").unwrap();
        ctx.record_set("Squats", 100.0, 5).unwrap();
        ctx.autosave(&app.sessions()).unwrap();

        let ctx = app.resume().unwrap();
        let done = app.complete(ctx).unwrap();
        assert_eq!(app.history().entries().unwrap(), vec![done]);
        assert!(app.resume().is_none());
    }

    #[test]
    fn test_update_offline_cache_and_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let app = App::with_fetcher(config(temp_dir.path()), fetcher("1.4.6")).unwrap();

        assert!(app.update_offline_cache("1.4.5").unwrap().is_empty());
        assert_eq!(
            app.update_offline_cache("1.4.6").unwrap(),
            vec!["ironlog-cache-v1.4.5".to_string()]
        );

        let response = app.fetch("1.4.6", &Request::get("/index.html")).unwrap();
        assert_eq!(response.text(), "<html>");
    }
}
