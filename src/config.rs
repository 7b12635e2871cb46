use std::fs::File;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::IronlogError;
use crate::version::FALLBACK_VERSION;

const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_MANIFEST_URL: &str = "/manifest.json";
const DEFAULT_DATABASE_HOST: &str = "firestore.googleapis.com";
const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/manifest.json",
    "/css/styles.css",
    "/js/app.js",
    "/js/firebase-config.js",
    "/icons/icon-192x192.png",
    "/icons/icon-512x512.png",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Where local storage, offline caches and history live
    pub data_dir: Option<PathBuf>,
    /// Origin relative URLs are resolved against
    pub origin: Option<String>,
    pub manifest_url: String,
    pub fallback_version: String,
    /// Hosts of the remote document database; never cached
    pub database_hosts: Vec<String>,
    pub precache_assets: Vec<String>,
    pub storage_quota_bytes: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            origin: None,
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            fallback_version: FALLBACK_VERSION.to_string(),
            database_hosts: vec![DEFAULT_DATABASE_HOST.to_string()],
            precache_assets: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            // browsers typically allow 5MB of local storage per origin
            storage_quota_bytes: Some(5 * 1024 * 1024),
        }
    }
}

impl AppConfig {
    pub fn default_config_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("ironlog").join(CONFIG_FILE_NAME))
    }

    /// Read the config from the user's config directory, defaults if absent
    pub fn from_local_file() -> Self {
        match Self::default_config_path() {
            Some(path) => Self::from_path(&path),
            None => Self::default(),
        }
    }

    /// Read the config at `path`. A missing or unreadable file yields the defaults.
    pub fn from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        let parsed = File::open(path)
            .map_err(|e| e.to_string())
            .and_then(|file| serde_json::from_reader(file).map_err(|e| e.to_string()));
        match parsed {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable config file {path:?}: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), IronlogError> {
        let config_path = Self::default_config_path().ok_or(IronlogError::NoDataDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), IronlogError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IronlogError::ConfigIO { source: e })?;
        }

        let file = File::create(config_path).map_err(|e| IronlogError::ConfigIO { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| IronlogError::ConfigSerialize { source: e })
    }

    /// Configured data directory, or the platform default
    pub fn resolved_data_dir(&self) -> Result<PathBuf, IronlogError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir()
                .ok_or(IronlogError::NoDataDir)?
                .join("ironlog")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.manifest_url, "/manifest.json");
        assert_eq!(config.fallback_version, FALLBACK_VERSION);
        assert!(config.database_hosts.contains(&"firestore.googleapis.com".to_string()));
        assert!(config.precache_assets.contains(&"/index.html".to_string()));
    }

    #[test]
    fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("ironlog").join(CONFIG_FILE_NAME);

        let config = AppConfig {
            data_dir: Some(temp_dir.path().join("data")),
            manifest_url: "https://ironlog.example/manifest.json".to_string(),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        assert_eq!(AppConfig::from_path(&path), config);
        assert_eq!(config.resolved_data_dir().unwrap(), temp_dir.path().join("data"));
    }

    #[test]
    fn test_missing_and_corrupt_files_use_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        assert_eq!(AppConfig::from_path(&path), AppConfig::default());

        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(AppConfig::from_path(&path), AppConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, r#"{"fallback_version": "1.0.0"}"#).unwrap();

        let config = AppConfig::from_path(&path);
        assert_eq!(config.fallback_version, "1.0.0");
        assert_eq!(config.manifest_url, DEFAULT_MANIFEST_URL);
    }
}
