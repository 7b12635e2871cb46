// Service worker lifecycle over versioned cache buckets:
// installing -> installed -> active -> redundant (superseded or failed install)

use std::fmt;

use log::{debug, error, info, warn};

use super::{CacheStorage, bucket_name};
use crate::errors::IronlogError;
use crate::network::{Fetcher, Request, Response};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Active,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Active => "active",
            Self::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    /// Release this worker caches for
    pub version: String,
    /// Assets that must all be cached for the install to succeed
    pub precache: Vec<String>,
    /// Document-database hosts whose responses are never cached
    pub bypass_hosts: Vec<String>,
}

pub struct ServiceWorker<C: CacheStorage, F: Fetcher> {
    config: WorkerConfig,
    cache: C,
    fetcher: F,
    state: WorkerState,
}

impl<C: CacheStorage, F: Fetcher> ServiceWorker<C, F> {
    pub fn new(config: WorkerConfig, cache: C, fetcher: F) -> Self {
        Self {
            config,
            cache,
            fetcher,
            state: WorkerState::Installing,
        }
    }

    /// Pick up a worker that was activated in an earlier run. Fails unless the
    /// bucket for this version exists.
    pub fn adopt_active(config: WorkerConfig, cache: C, fetcher: F) -> Result<Self, IronlogError> {
        Self::adopt(config, cache, fetcher, WorkerState::Active)
    }

    /// Pick up a worker installed in an earlier run that is still waiting to
    /// be activated
    pub fn adopt_installed(
        config: WorkerConfig,
        cache: C,
        fetcher: F,
    ) -> Result<Self, IronlogError> {
        Self::adopt(config, cache, fetcher, WorkerState::Installed)
    }

    fn adopt(
        config: WorkerConfig,
        cache: C,
        fetcher: F,
        state: WorkerState,
    ) -> Result<Self, IronlogError> {
        let bucket = bucket_name(&config.version);
        if !cache.bucket_names()?.contains(&bucket) {
            return Err(IronlogError::WorkerState {
                version: config.version,
                state: WorkerState::Installing.to_string(),
                operation: format!("adopt an {state} worker"),
            });
        }

        Ok(Self {
            config,
            cache,
            fetcher,
            state,
        })
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn bucket_name(&self) -> String {
        bucket_name(&self.config.version)
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    fn state_error(&self, operation: &str) -> IronlogError {
        IronlogError::WorkerState {
            version: self.config.version.clone(),
            state: self.state.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Requests to a document-database host (or any subdomain of one)
    pub fn is_bypassed(&self, request: &Request) -> bool {
        let Some(host) = request.host() else {
            return false;
        };
        self.config.bypass_hosts.iter().any(|bypass| {
            let bypass = bypass.to_lowercase();
            host == bypass || host.ends_with(&format!(".{bypass}"))
        })
    }

    /// Pre-cache every declared asset. All or nothing: if any asset cannot be
    /// fetched the worker becomes redundant and a bucket this install created
    /// is deleted. A bucket that already existed (a re-install of the live
    /// release) is left serving as it was.
    pub fn install(&mut self) -> Result<(), IronlogError> {
        if self.state != WorkerState::Installing {
            return Err(self.state_error("install"));
        }

        let bucket = self.bucket_name();
        // unknown counts as existing so a failure never removes a live bucket
        let existed = self
            .cache
            .bucket_names()
            .map(|names| names.contains(&bucket))
            .unwrap_or(true);
        info!(
            "Installing worker {} with {} assets",
            self.config.version,
            self.config.precache.len()
        );

        match self.precache(&bucket) {
            Ok(()) => {
                self.state = WorkerState::Installed;
                info!("Worker {} installed into {}", self.config.version, bucket);
                Ok(())
            }
            Err(e) => {
                error!("Install of worker {} failed: {}", self.config.version, e);
                if existed {
                    warn!("Keeping existing bucket {bucket} after failed install");
                } else if let Err(cleanup) = self.cache.delete_bucket(&bucket) {
                    warn!("Could not remove partial bucket {bucket}: {cleanup}");
                }
                self.state = WorkerState::Redundant;
                Err(e)
            }
        }
    }

    fn precache(&self, bucket: &str) -> Result<(), IronlogError> {
        // fetch everything before touching the cache so a failure leaves nothing behind
        let mut fetched = Vec::with_capacity(self.config.precache.len());
        for url in &self.config.precache {
            let request = Request::get(url.as_str());
            let response =
                self.fetcher
                    .fetch(&request)
                    .map_err(|e| IronlogError::CacheInstall {
                        bucket: bucket.to_string(),
                        url: url.clone(),
                        reason: e.to_string(),
                    })?;
            if !response.is_success() {
                return Err(IronlogError::CacheInstall {
                    bucket: bucket.to_string(),
                    url: url.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((request, response));
        }

        self.cache.open(bucket)?;
        for (request, response) in &fetched {
            self.cache.put(bucket, request, response)?;
        }
        Ok(())
    }

    /// Take control: delete every bucket except this version's.
    /// Returns the names of the evicted buckets.
    pub fn activate(&mut self) -> Result<Vec<String>, IronlogError> {
        if self.state != WorkerState::Installed {
            return Err(self.state_error("activate"));
        }

        let current = self.bucket_name();
        let mut evicted = Vec::new();
        for bucket in self.cache.bucket_names()? {
            if bucket != current {
                self.cache.delete_bucket(&bucket)?;
                info!("Evicted stale cache bucket {bucket}");
                evicted.push(bucket);
            }
        }

        self.state = WorkerState::Active;
        info!("Worker {} is active", self.config.version);
        Ok(evicted)
    }

    /// Superseded by a newer worker
    pub fn mark_redundant(&mut self) {
        debug!("Worker {} is redundant", self.config.version);
        self.state = WorkerState::Redundant;
    }

    /// Serve a request: cache first, then network. Successful GET responses
    /// from the network are stored in the current bucket unless they come from
    /// a document-database host, which is never read from or written to the cache.
    pub fn handle_fetch(&self, request: &Request) -> Result<Response, IronlogError> {
        if self.state != WorkerState::Active {
            debug!("Worker {} not active, passing {} through", self.config.version, request.url);
            return self.fetcher.fetch(request);
        }

        if self.is_bypassed(request) {
            debug!("Bypassing cache for {}", request.url);
            return self.fetcher.fetch(request);
        }

        match self.cache.match_any(request) {
            Ok(Some(response)) => return Ok(response),
            Ok(None) => {}
            Err(e) => warn!("Cache lookup for {} failed, using network: {}", request.url, e),
        }

        let response = self.fetcher.fetch(request)?;
        if request.method == "GET" && response.is_success() {
            if let Err(e) = self.cache.put(&self.bucket_name(), request, &response) {
                warn!("Could not cache {}: {}", request.url, e);
            }
        }
        Ok(response)
    }
}

/// The active worker plus a newly installed one waiting to take over
pub struct WorkerRegistration<C: CacheStorage, F: Fetcher> {
    active: Option<ServiceWorker<C, F>>,
    waiting: Option<ServiceWorker<C, F>>,
}

impl<C: CacheStorage, F: Fetcher> Default for WorkerRegistration<C, F> {
    fn default() -> Self {
        Self {
            active: None,
            waiting: None,
        }
    }
}

impl<C: CacheStorage, F: Fetcher> WorkerRegistration<C, F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active(worker: ServiceWorker<C, F>) -> Self {
        Self {
            active: Some(worker),
            waiting: None,
        }
    }

    pub fn active(&self) -> Option<&ServiceWorker<C, F>> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&ServiceWorker<C, F>> {
        self.waiting.as_ref()
    }

    /// Install `worker`. On success it waits for activation, replacing any
    /// earlier waiting worker. A failed install leaves the registration as it was.
    pub fn register(&mut self, mut worker: ServiceWorker<C, F>) -> Result<(), IronlogError> {
        worker.install()?;
        if let Some(mut previous) = self.waiting.replace(worker) {
            previous.mark_redundant();
        }
        Ok(())
    }

    /// Promote the waiting worker. The previously active worker becomes
    /// redundant and is returned together with the evicted bucket names.
    pub fn activate_waiting(
        &mut self,
    ) -> Result<(Option<ServiceWorker<C, F>>, Vec<String>), IronlogError> {
        let Some(mut worker) = self.waiting.take() else {
            return Ok((None, Vec::new()));
        };

        let evicted = match worker.activate() {
            Ok(evicted) => evicted,
            Err(e) => {
                self.waiting = Some(worker);
                return Err(e);
            }
        };

        let superseded = self.active.replace(worker).map(|mut old| {
            old.mark_redundant();
            old
        });
        Ok((superseded, evicted))
    }

    pub fn handle_fetch(&self, request: &Request) -> Result<Response, IronlogError> {
        match &self.active {
            Some(worker) => worker.handle_fetch(request),
            None => Err(IronlogError::WorkerState {
                version: String::new(),
                state: "unregistered".to_string(),
                operation: format!("fetch {}", request.url),
            }),
        }
    }
}
