// Release version tracking and the backup-before-commit update transition

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::errors::IronlogError;
use crate::network::{Fetcher, Request};
use crate::session::{InProgressSession, SessionStore};
use crate::storage::KeyValueStore;

pub const VERSION_KEY: &str = "ironlog_app_version";

/// Used when the manifest cannot be fetched or read: the release this binary
/// was built as, so an offline start of an installed build is not an update.
pub const FALLBACK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Static release metadata. Fields other than `version` are ignored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
}

impl Manifest {
    pub fn parse(url: &str, body: &[u8]) -> Result<Self, IronlogError> {
        let manifest: Manifest =
            serde_json::from_slice(body).map_err(|e| IronlogError::ManifestMalformed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let version = manifest.version.trim();
        if version.is_empty() {
            return Err(IronlogError::ManifestMalformed {
                url: url.to_string(),
                reason: "version is empty".to_string(),
            });
        }

        Ok(Manifest {
            version: version.to_string(),
        })
    }
}

pub fn fetch_manifest<F: Fetcher>(fetcher: &F, manifest_url: &str) -> Result<Manifest, IronlogError> {
    let response = fetcher.fetch(&Request::get(manifest_url))?;
    if !response.is_success() {
        return Err(IronlogError::HttpStatus {
            url: manifest_url.to_string(),
            status: response.status,
        });
    }
    Manifest::parse(manifest_url, &response.body)
}

/// The current release version, or `fallback` if the manifest is unavailable.
/// Never fails: start-up must not depend on the network.
pub fn resolve_manifest_version<F: Fetcher>(fetcher: &F, manifest_url: &str, fallback: &str) -> String {
    match fetch_manifest(fetcher, manifest_url) {
        Ok(manifest) => {
            debug!("Manifest reports version {}", manifest.version);
            manifest.version
        }
        Err(e) => {
            warn!("Could not read manifest, falling back to version {fallback}: {e}");
            fallback.to_string()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum VersionOutcome {
    /// Nothing was stored yet
    FirstInstall { version: String },
    /// Stored version equals the manifest version
    Unchanged { version: String },
    /// Stored version differs, in either direction
    Updated {
        from: String,
        to: String,
        /// Whether the in-progress session was copied to the backup slot
        backed_up: bool,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartupReport {
    pub outcome: VersionOutcome,
    /// Backup awaiting an accept/decline decision
    pub restore_offer: Option<InProgressSession>,
}

/// Decides, once per start, whether this is a first install, a reload or an update
pub struct VersionManager<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> VersionManager<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn sessions(&self) -> SessionStore<&S> {
        SessionStore::new(&self.store)
    }

    pub fn stored_version(&self) -> Result<Option<String>, IronlogError> {
        self.store.get_item(VERSION_KEY)
    }

    /// Compare the stored version with `manifest_version` and apply the transition.
    ///
    /// On an update the in-progress session is backed up before the new
    /// version is committed; if the backup cannot be written the version is
    /// left untouched so the next start retries. A backup left over from an
    /// earlier transition is never overwritten here: it is surfaced in the
    /// report and must be accepted or declined first.
    pub fn check(&self, manifest_version: &str) -> Result<StartupReport, IronlogError> {
        let sessions = self.sessions();
        let pending_backup = sessions.load_backup();

        let outcome = match self.stored_version()? {
            None => {
                self.store.set_item(VERSION_KEY, manifest_version)?;
                info!("First install at version {manifest_version}");
                VersionOutcome::FirstInstall {
                    version: manifest_version.to_string(),
                }
            }
            Some(stored) if stored == manifest_version => {
                debug!("Version unchanged at {stored}");
                VersionOutcome::Unchanged { version: stored }
            }
            Some(stored) => {
                let backed_up = match &pending_backup {
                    Some(existing) => {
                        warn!(
                            "Keeping unresolved backup for routine {} instead of taking a new one",
                            existing.routine_id
                        );
                        false
                    }
                    None => sessions.backup()?,
                };

                self.store.set_item(VERSION_KEY, manifest_version)?;
                info!("Updated from version {stored} to {manifest_version}");
                VersionOutcome::Updated {
                    from: stored,
                    to: manifest_version.to_string(),
                    backed_up,
                }
            }
        };

        Ok(StartupReport {
            outcome,
            restore_offer: sessions.load_backup(),
        })
    }

    /// Move the offered backup into the active session slot
    pub fn accept_restore(&self) -> Result<Option<InProgressSession>, IronlogError> {
        self.sessions().restore_backup()
    }

    /// Drop the offered backup, keeping whatever session is active
    pub fn decline_restore(&self) -> Result<(), IronlogError> {
        info!("Declined restoring backed up session");
        self.sessions().clear_backup()
    }
}
