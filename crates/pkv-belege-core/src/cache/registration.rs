//! Host-side bookkeeping for cache worker generations.
//!
//! A registration holds at most one active and one waiting generation.
//! A freshly installed generation waits until no client is controlled by
//! the active one, unless it was told to skip waiting. On promotion it
//! sweeps older caches and takes control of every open client.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::control::{ControlReply, ControlRequest};
use super::manager::{compare_versions, CacheConfig, ResourceCacheManager};
use super::network::Network;
use super::request::{Request, Response};
use super::storage::CacheStorage;
use super::worker::{CacheWorker, WorkerHandle};
use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Installing,
    /// Installed, held back while clients of the active generation remain.
    Waiting,
    Active,
    /// Replaced by a newer active generation.
    Superseded,
    /// Installation failed; the generation was discarded.
    Redundant,
}

impl fmt::Display for GenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GenerationState::Installing => "installing",
            GenerationState::Waiting => "waiting",
            GenerationState::Active => "active",
            GenerationState::Superseded => "superseded",
            GenerationState::Redundant => "redundant",
        };
        f.write_str(label)
    }
}

/// An open page of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

pub struct Registration<S: CacheStorage, N: Network> {
    storage: Arc<S>,
    network: Arc<N>,
    active: Option<WorkerHandle>,
    waiting: Option<WorkerHandle>,
    /// Each client with the version of the generation controlling it.
    clients: BTreeMap<ClientId, Option<String>>,
    next_client: u64,
    history: Vec<(String, GenerationState)>,
}

impl<S: CacheStorage, N: Network> Registration<S, N> {
    pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
        Self {
            storage,
            network,
            active: None,
            waiting: None,
            clients: BTreeMap::new(),
            next_client: 0,
            history: Vec::new(),
        }
    }

    /// Register a generation. Re-registering the active or waiting version
    /// changes nothing.
    pub async fn register(&mut self, config: CacheConfig) -> Result<GenerationState, FetchError> {
        if self.active.is_none() && self.waiting.is_none() {
            self.adopt_installed(&config).await;
        }
        if self.active_version() == Some(config.version.as_str()) {
            debug!(version = %config.version, "Generation already active");
            return Ok(GenerationState::Active);
        }
        if self.waiting_version() == Some(config.version.as_str()) {
            debug!(version = %config.version, "Generation already waiting");
            return Ok(GenerationState::Waiting);
        }
        self.install_generation(config).await
    }

    /// Resume a generation installed by an earlier run, so a restarted host
    /// keeps serving offline before any new install succeeds.
    ///
    /// The requested version is preferred when its cache is complete,
    /// otherwise the newest complete generation. The resumed generation
    /// activates like any other and sweeps the rest.
    async fn adopt_installed(&mut self, config: &CacheConfig) {
        let names = match self.storage.cache_names() {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Could not list caches to resume");
                return;
            }
        };
        let installed: Vec<String> = names
            .iter()
            .filter_map(|name| {
                let version = name.strip_prefix(&config.cache_prefix)?;
                self.holds_entries(name, config.manifest.len())
                    .then(|| version.to_string())
            })
            .collect();
        let version = if installed.contains(&config.version) {
            config.version.clone()
        } else {
            match installed.into_iter().max_by(|a, b| compare_versions(a, b)) {
                Some(version) => version,
                None => return,
            }
        };

        let resumed = CacheConfig {
            version: version.clone(),
            ..config.clone()
        };
        let manager = ResourceCacheManager::new(resumed, self.storage.clone(), self.network.clone());
        let worker = CacheWorker::spawn(Arc::new(manager));
        match worker.activate().await {
            Ok(deleted) => debug!(version = %version, deleted = ?deleted, "Old generations swept"),
            Err(e) => warn!(version = %version, error = %e, "Cache sweep failed while resuming"),
        }
        self.active = Some(worker);
        self.record(&version, GenerationState::Active);
        info!(version = %version, "Resumed installed generation");
    }

    /// Whether cache `name` holds at least `expected` entries.
    fn holds_entries(&self, name: &str, expected: usize) -> bool {
        match self.storage.entry_count(name) {
            Ok(count) => count >= expected,
            Err(e) => {
                warn!(cache = %name, error = %e, "Could not count cache entries");
                false
            }
        }
    }

    /// Install a generation even if the same version is already active.
    /// Used to rebuild a cache after it was cleared.
    pub async fn reinstall(&mut self, config: CacheConfig) -> Result<GenerationState, FetchError> {
        self.install_generation(config).await
    }

    async fn install_generation(
        &mut self,
        config: CacheConfig,
    ) -> Result<GenerationState, FetchError> {
        let version = config.version.clone();
        let skip_waiting = config.skip_waiting_on_install;
        let manager = ResourceCacheManager::new(config, self.storage.clone(), self.network.clone());
        let worker = CacheWorker::spawn(Arc::new(manager));
        self.record(&version, GenerationState::Installing);

        if let Err(e) = worker.install().await {
            warn!(version = %version, error = %e, "Generation install failed");
            self.record(&version, GenerationState::Redundant);
            return Err(e);
        }
        if skip_waiting {
            worker.skip_waiting().await?;
        }

        if let Some(previous) = self.waiting.replace(worker) {
            debug!(version = %previous.version(), "Replacing previously waiting generation");
            self.record(previous.version(), GenerationState::Redundant);
        }
        self.record(&version, GenerationState::Waiting);

        if self.try_promote().await {
            Ok(GenerationState::Active)
        } else {
            info!(version = %version, "New generation waiting for clients to close");
            Ok(GenerationState::Waiting)
        }
    }

    /// Promote the waiting generation if nothing holds it back.
    pub async fn try_promote(&mut self) -> bool {
        let Some(waiting) = &self.waiting else {
            return false;
        };
        let free = match &self.active {
            None => true,
            Some(active) => !self.clients.values().any(|c| c.as_deref() == Some(active.version())),
        };
        if !free && !waiting.skip_waiting_requested() {
            return false;
        }
        self.promote().await
    }

    /// Activate the waiting generation. A generation whose cache lost
    /// entries since it installed is discarded instead, so activation never
    /// sweeps a populated cache in favour of an empty one.
    async fn promote(&mut self) -> bool {
        let Some(next) = self.waiting.take() else {
            return false;
        };
        if !self.holds_entries(next.cache_name(), next.manifest_len()) {
            warn!(version = %next.version(), "Waiting generation is incomplete, discarding it");
            self.record(next.version(), GenerationState::Redundant);
            return false;
        }
        match next.activate().await {
            Ok(deleted) => debug!(version = %next.version(), deleted = ?deleted, "Old generations swept"),
            Err(e) => warn!(version = %next.version(), error = %e, "Cache sweep failed during activation"),
        }

        let version = next.version().to_string();
        if let Some(previous) = self.active.replace(next) {
            if previous.version() != version {
                self.record(previous.version(), GenerationState::Superseded);
            }
        }
        for controller in self.clients.values_mut() {
            *controller = Some(version.clone());
        }
        self.record(&version, GenerationState::Active);
        info!(version = %version, clients = self.clients.len(), "Generation activated");
        true
    }

    /// Tell the waiting generation to activate without waiting for clients.
    pub async fn skip_waiting(&mut self) -> Result<bool, FetchError> {
        let Some(waiting) = &self.waiting else {
            return Ok(false);
        };
        waiting.skip_waiting().await?;
        Ok(self.try_promote().await)
    }

    /// Post a control message the way an open page does. `SKIP_WAITING`
    /// goes to the waiting generation; every other message goes to the
    /// active one, which owns the cache the page is using.
    pub async fn post_message(
        &mut self,
        request: ControlRequest,
    ) -> Result<Option<ControlReply>, FetchError> {
        let worker = match request {
            ControlRequest::SkipWaiting => self.newest_worker(),
            _ => self.active.as_ref().or(self.waiting.as_ref()),
        }
        .ok_or(FetchError::WorkerUnavailable)?;
        let reply = worker.post_message(request).await?;
        if request == ControlRequest::SkipWaiting {
            self.try_promote().await;
        }
        Ok(reply)
    }

    /// Open a client. It is controlled by the active generation, if any.
    pub fn connect_client(&mut self) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        let controller = self.active_version().map(str::to_string);
        debug!(client = id.0, controller = ?controller, "Client connected");
        self.clients.insert(id, controller);
        id
    }

    /// Close a client. A waiting generation may activate as a result.
    pub async fn disconnect_client(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            debug!(client = id.0, "Client disconnected");
            self.try_promote().await;
        }
    }

    pub fn controller(&self, id: ClientId) -> Option<&str> {
        self.clients.get(&id).and_then(|c| c.as_deref())
    }

    /// Fetch on behalf of a client. Uncontrolled clients go straight to
    /// the network.
    pub async fn fetch(&self, client: ClientId, request: Request) -> Result<Response, FetchError> {
        match (&self.active, self.controller(client)) {
            (Some(active), Some(version)) if active.version() == version => {
                active.fetch(request).await
            }
            _ => self.network.fetch(&request).await,
        }
    }

    pub fn active_worker(&self) -> Option<&WorkerHandle> {
        self.active.as_ref()
    }

    pub fn waiting_worker(&self) -> Option<&WorkerHandle> {
        self.waiting.as_ref()
    }

    /// The waiting generation if there is one, otherwise the active one.
    pub fn newest_worker(&self) -> Option<&WorkerHandle> {
        self.waiting.as_ref().or(self.active.as_ref())
    }

    pub fn active_version(&self) -> Option<&str> {
        self.active.as_ref().map(|w| w.version())
    }

    pub fn waiting_version(&self) -> Option<&str> {
        self.waiting.as_ref().map(|w| w.version())
    }

    /// Latest recorded state of `version`.
    pub fn state_of(&self, version: &str) -> Option<GenerationState> {
        self.history
            .iter()
            .rev()
            .find(|(v, _)| v == version)
            .map(|(_, state)| *state)
    }

    pub fn history(&self) -> &[(String, GenerationState)] {
        &self.history
    }

    fn record(&mut self, version: &str, state: GenerationState) {
        debug!(version = %version, state = %state, "Generation state changed");
        self.history.push((version.to_string(), state));
    }
}
