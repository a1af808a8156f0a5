//! Versioned resource cache manager.
//!
//! The manager owns every fetch decision for the application shell. It
//! keeps no mutable state of its own: the cache generation it serves from
//! is derived from its version token, and every request is answered by
//! consulting cache storage afresh, so the host may stop and restart it
//! between any two events.

use std::cmp::Ordering;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use super::control::VersionInfo;
use super::network::Network;
use super::policy::{Strategy, NETWORK_FIRST_FALLBACKS};
use super::request::{Request, Response};
use super::storage::CacheStorage;
use crate::error::{CacheError, FetchError};
use crate::models::APP_NAME;

/// Version token of the application shell shipped with this build.
pub const APP_VERSION: &str = "1.15";

/// Every cache generation this application creates starts with this.
pub const CACHE_PREFIX: &str = "pkv-belege-v";

/// Document served when a page cannot be loaded from network or cache.
pub const ROOT_DOCUMENT: &str = "/index.html";

/// Static resources that make up the application shell.
pub const SHELL_MANIFEST: &[&str] = &[
    "./",
    "./index.html",
    "./styles.css",
    "./app.js",
    "./manifest.json",
    "./logo.png",
    "./icons/icon-72x72.png",
    "./icons/icon-96x96.png",
    "./icons/icon-128x128.png",
    "./icons/icon-144x144.png",
    "./icons/icon-152x152.png",
    "./icons/icon-192x192.png",
    "./icons/icon-384x384.png",
    "./icons/icon-512x512.png",
];

/// Maximum concurrent network requests while installing.
const MAX_CONCURRENT_INSTALL_FETCHES: usize = 4;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub app_name: String,
    pub version: String,
    pub cache_prefix: String,
    pub manifest: Vec<String>,
    pub root_document: String,
    /// Activate as soon as installation succeeds instead of waiting.
    pub skip_waiting_on_install: bool,
}

impl CacheConfig {
    pub fn for_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn cache_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.version)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            version: APP_VERSION.to_string(),
            cache_prefix: CACHE_PREFIX.to_string(),
            manifest: SHELL_MANIFEST.iter().map(|p| p.to_string()).collect(),
            root_document: ROOT_DOCUMENT.to_string(),
            skip_waiting_on_install: false,
        }
    }
}

/// Order version tokens segment by segment, numerically where both
/// segments are numbers, so `1.9` sorts before `1.10`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => x.cmp(y),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

pub struct ResourceCacheManager<S: CacheStorage, N: Network> {
    config: CacheConfig,
    cache_name: String,
    storage: Arc<S>,
    network: Arc<N>,
}

impl<S: CacheStorage, N: Network> ResourceCacheManager<S, N> {
    pub fn new(config: CacheConfig, storage: Arc<S>, network: Arc<N>) -> Self {
        let cache_name = config.cache_name();
        Self {
            config,
            cache_name,
            storage,
            network,
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn version_info(&self) -> VersionInfo {
        VersionInfo {
            version: self.config.version.clone(),
            cache_name: self.cache_name.clone(),
            app_name: self.config.app_name.clone(),
        }
    }

    /// Whether `name` belongs to this application's cache namespace.
    pub fn owns_cache(&self, name: &str) -> bool {
        name.starts_with(&self.config.cache_prefix)
    }

    /// Fetch the whole shell manifest and store it as this generation.
    ///
    /// Nothing is written unless every resource was fetched with status
    /// 200, so a failed install never leaves a half-filled generation.
    pub async fn install(&self) -> Result<usize, FetchError> {
        info!(version = %self.config.version, cache = %self.cache_name, "Installing cache generation");

        let requests: Vec<Request> = self.config.manifest.iter().map(|p| Request::get(p)).collect();
        let fetched: Vec<Result<(String, Response), FetchError>> =
            stream::iter(requests)
                .map(|request| async move {
                    let response = self.network.fetch(&request).await?;
                    if !response.is_cacheable() {
                        return Err(FetchError::InstallStatus {
                            path: request.cache_key(),
                            status: response.status.as_u16(),
                        });
                    }
                    Ok::<_, FetchError>((request.cache_key(), response))
                })
                .buffer_unordered(MAX_CONCURRENT_INSTALL_FETCHES)
                .collect()
                .await;

        let entries = fetched
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                warn!(error = %e, version = %self.config.version, "Install aborted");
                e
            })?;

        self.storage.put_all(&self.cache_name, &entries)?;
        info!(cache = %self.cache_name, entries = entries.len(), "Cache generation installed");
        Ok(entries.len())
    }

    /// Delete every generation of this application except the current one.
    /// Caches outside the application's prefix are never touched.
    pub fn activate(&self) -> Result<Vec<String>, CacheError> {
        let mut deleted = Vec::new();
        for name in self.storage.cache_names()? {
            if self.owns_cache(&name) && name != self.cache_name {
                info!(cache = %name, "Deleting superseded cache generation");
                self.storage.delete_cache(&name)?;
                deleted.push(name);
            }
        }
        info!(cache = %self.cache_name, deleted = deleted.len(), "Cache generation activated");
        Ok(deleted)
    }

    /// Delete this generation's cache entirely.
    pub fn clear(&self) -> Result<bool, CacheError> {
        let existed = self.storage.delete_cache(&self.cache_name)?;
        info!(cache = %self.cache_name, existed, "Cache cleared on request");
        Ok(existed)
    }

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, request: Request) -> Result<Response, FetchError> {
        match Strategy::for_request(&request) {
            Strategy::Passthrough => self.network.fetch(&request).await,
            Strategy::NetworkFirst => self.network_first(&request).await,
            Strategy::CacheFirst => self.cache_first(&request).await,
        }
    }

    async fn network_first(&self, request: &Request) -> Result<Response, FetchError> {
        let error = match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.store_copy(&request.cache_key(), &response);
                }
                return Ok(response);
            }
            Err(e) => e,
        };

        debug!(path = %request.path, error = %error, "Network unavailable, trying cache");
        for fallback in NETWORK_FIRST_FALLBACKS {
            let key = fallback.cache_key(request, &self.config.root_document);
            if let Some(cached) = self.cached(&key) {
                debug!(path = %request.path, key = %key, ?fallback, "Serving cached fallback");
                return Ok(cached);
            }
        }

        warn!(path = %request.path, error = %error, "No network and no cached fallback");
        Err(FetchError::NoCachedResponse(request.cache_key()))
    }

    async fn cache_first(&self, request: &Request) -> Result<Response, FetchError> {
        let key = request.cache_key();
        if let Some(cached) = self.cached(&key) {
            return Ok(cached);
        }

        let response = self.network.fetch(request).await?;
        if response.is_cacheable() {
            self.store_copy(&key, &response);
        }
        Ok(response)
    }

    /// Cache lookup where a storage failure counts as a miss.
    fn cached(&self, key: &str) -> Option<Response> {
        match self.storage.lookup(&self.cache_name, key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(cache = %self.cache_name, key = %key, error = %e, "Cache read failed");
                None
            }
        }
    }

    /// Store a copy of a response; failure is logged, never propagated.
    fn store_copy(&self, key: &str, response: &Response) {
        if let Err(e) = self.storage.put(&self.cache_name, key, response) {
            warn!(cache = %self.cache_name, key = %key, error = %e, "Failed to cache response");
        }
    }
}
