// Network access for manifest retrieval and cache population

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::errors::IronlogError;

const REQUEST_TIMEOUT_S: u64 = 15;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    pub url: String,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
        }
    }

    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
        }
    }

    /// Cache lookups match on method and URL
    pub fn identity(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Host of an absolute URL; relative URLs (same-origin assets) have none
    pub fn host(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Trait defining how requests reach the network
pub trait Fetcher {
    /// Perform the request. Non-success statuses are returned as responses;
    /// only transport failures are errors.
    fn fetch(&self, request: &Request) -> Result<Response, IronlogError>;
}

impl<T: Fetcher + ?Sized> Fetcher for &T {
    fn fetch(&self, request: &Request) -> Result<Response, IronlogError> {
        (**self).fetch(request)
    }
}

/// Fetcher backed by reqwest, driven on a current-thread tokio runtime
pub struct HttpFetcher {
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    /// Origin that relative URLs are resolved against
    origin: Option<Url>,
}

impl HttpFetcher {
    pub fn new(origin: Option<&str>) -> Result<Self, IronlogError> {
        let origin = origin
            .map(|o| {
                Url::parse(o).map_err(|e| IronlogError::InvalidUserInput {
                    field: "origin".to_string(),
                    reason: format!("{o} is not a valid URL: {e}"),
                })
            })
            .transpose()?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_S))
            .build()
            .map_err(|e| IronlogError::Network {
                url: origin.as_ref().map(Url::to_string).unwrap_or_default(),
                reason: e.to_string(),
            })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| IronlogError::Network {
                url: String::new(),
                reason: format!("Could not start network runtime: {e}"),
            })?;

        Ok(Self {
            client,
            runtime,
            origin,
        })
    }

    fn resolve(&self, url: &str) -> Result<Url, IronlogError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(_) => {
                let origin = self.origin.as_ref().ok_or_else(|| IronlogError::Network {
                    url: url.to_string(),
                    reason: "relative URL and no origin configured".to_string(),
                })?;
                origin.join(url).map_err(|e| IronlogError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, request: &Request) -> Result<Response, IronlogError> {
        let url = self.resolve(&request.url)?;
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            IronlogError::InvalidUserInput {
                field: "method".to_string(),
                reason: e.to_string(),
            }
        })?;
        let network_error = |e: reqwest::Error| IronlogError::Network {
            url: request.url.clone(),
            reason: e.to_string(),
        };

        debug!("{} {}", request.method, url);
        self.runtime.block_on(async {
            let response = self
                .client
                .request(method, url)
                .send()
                .await
                .map_err(network_error)?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.to_string(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(network_error)?.to_vec();

            Ok::<_, IronlogError>(Response {
                url: request.url.clone(),
                status,
                headers,
                body,
            })
        })
    }
}

/// Fetcher that answers from a fixed routing table, for offline runs and tests.
/// Unknown URLs fail like an unreachable network.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: HashMap<String, Response>,
    requests: std::cell::RefCell<Vec<Request>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, response: Response) -> Self {
        self.routes.insert(url.to_string(), response);
        self
    }

    /// Requests seen so far, in order
    pub fn requests(&self) -> Vec<Request> {
        self.requests.borrow().clone()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, request: &Request) -> Result<Response, IronlogError> {
        self.requests.borrow_mut().push(request.clone());
        self.routes
            .get(&request.url)
            .cloned()
            .ok_or_else(|| IronlogError::Network {
                url: request.url.clone(),
                reason: "unreachable".to_string(),
            })
    }
}
