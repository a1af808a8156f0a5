//! Event-driven host for a cache manager generation.
//!
//! The worker runs on its own task and receives lifecycle events, fetches
//! and control messages over a channel. Each event carries a oneshot
//! sender for its reply. Fetches and installs run on spawned tasks so a
//! slow network never holds up control messages.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::control::{ControlReply, ControlRequest, VersionInfo};
use super::manager::ResourceCacheManager;
use super::network::Network;
use super::request::{Request, Response};
use super::storage::CacheStorage;
use crate::error::{CacheError, FetchError};

const EVENT_BUFFER: usize = 64;

pub enum WorkerEvent {
    Install {
        reply: oneshot::Sender<Result<usize, FetchError>>,
    },
    Activate {
        reply: oneshot::Sender<Result<Vec<String>, CacheError>>,
    },
    Fetch {
        request: Request,
        reply: oneshot::Sender<Result<Response, FetchError>>,
    },
    Message {
        request: ControlRequest,
        reply: oneshot::Sender<Option<ControlReply>>,
    },
}

pub struct CacheWorker;

impl CacheWorker {
    /// Start a worker task for `manager`. Must be called inside a tokio
    /// runtime. The task ends once every handle is dropped.
    pub fn spawn<S: CacheStorage, N: Network>(
        manager: Arc<ResourceCacheManager<S, N>>,
    ) -> WorkerHandle {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (skip_tx, skip_rx) = watch::channel(false);
        let version = manager.version().to_string();
        let cache_name = manager.cache_name().to_string();
        let manifest_len = manager.config().manifest.len();

        tokio::spawn(run(manager, events_rx, skip_tx));

        WorkerHandle {
            version,
            cache_name,
            manifest_len,
            events: events_tx,
            skip_waiting: skip_rx,
        }
    }
}

async fn run<S: CacheStorage, N: Network>(
    manager: Arc<ResourceCacheManager<S, N>>,
    mut events: mpsc::Receiver<WorkerEvent>,
    skip_waiting: watch::Sender<bool>,
) {
    debug!(version = %manager.version(), "Cache worker started");

    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Install { reply } => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    send_reply(reply, manager.install().await);
                });
            }
            WorkerEvent::Activate { reply } => {
                send_reply(reply, manager.activate());
            }
            WorkerEvent::Fetch { request, reply } => {
                let manager = manager.clone();
                tokio::spawn(async move {
                    send_reply(reply, manager.handle_fetch(request).await);
                });
            }
            WorkerEvent::Message { request, reply } => {
                let response = handle_message(&manager, &skip_waiting, request);
                send_reply(reply, response);
            }
        }
    }

    debug!(version = %manager.version(), "Cache worker stopped");
}

fn handle_message<S: CacheStorage, N: Network>(
    manager: &ResourceCacheManager<S, N>,
    skip_waiting: &watch::Sender<bool>,
    request: ControlRequest,
) -> Option<ControlReply> {
    match request {
        ControlRequest::SkipWaiting => {
            info!(version = %manager.version(), "Skip waiting requested");
            skip_waiting.send_replace(true);
            None
        }
        ControlRequest::GetVersion => Some(ControlReply::VersionInfo(manager.version_info())),
        ControlRequest::ClearCache => {
            let success = match manager.clear() {
                Ok(_) => true,
                Err(e) => {
                    warn!(cache = %manager.cache_name(), error = %e, "Failed to clear cache");
                    false
                }
            };
            Some(ControlReply::CacheCleared { success })
        }
    }
}

/// Send a reply, logging if the requester has gone away.
fn send_reply<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Worker reply dropped: requester no longer waiting");
    }
}

/// Cloneable handle for posting events to a running worker.
#[derive(Clone)]
pub struct WorkerHandle {
    version: String,
    cache_name: String,
    /// Entries a fully installed generation holds at least.
    manifest_len: usize,
    events: mpsc::Sender<WorkerEvent>,
    skip_waiting: watch::Receiver<bool>,
}

impl WorkerHandle {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest_len(&self) -> usize {
        self.manifest_len
    }

    async fn request<T>(
        &self,
        event: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent,
    ) -> Result<T, FetchError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(event(tx))
            .await
            .map_err(|_| FetchError::WorkerUnavailable)?;
        rx.await.map_err(|_| FetchError::WorkerUnavailable)
    }

    pub async fn install(&self) -> Result<usize, FetchError> {
        self.request(|reply| WorkerEvent::Install { reply }).await?
    }

    pub async fn activate(&self) -> Result<Vec<String>, FetchError> {
        Ok(self.request(|reply| WorkerEvent::Activate { reply }).await??)
    }

    pub async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        self.request(|reply| WorkerEvent::Fetch { request, reply })
            .await?
    }

    pub async fn post_message(
        &self,
        request: ControlRequest,
    ) -> Result<Option<ControlReply>, FetchError> {
        self.request(|reply| WorkerEvent::Message { request, reply })
            .await
    }

    /// Post a raw JSON message. Unrecognized messages are dropped without
    /// reaching the worker.
    pub async fn post_wire_message(
        &self,
        message: &serde_json::Value,
    ) -> Result<Option<ControlReply>, FetchError> {
        match ControlRequest::from_wire(message) {
            Some(request) => self.post_message(request).await,
            None => Ok(None),
        }
    }

    pub async fn get_version(&self) -> Result<VersionInfo, FetchError> {
        match self.post_message(ControlRequest::GetVersion).await? {
            Some(ControlReply::VersionInfo(info)) => Ok(info),
            _ => Err(FetchError::WorkerUnavailable),
        }
    }

    /// Ask the worker to delete its cache. Returns whether it succeeded.
    pub async fn clear_cache(&self) -> Result<bool, FetchError> {
        match self.post_message(ControlRequest::ClearCache).await? {
            Some(ControlReply::CacheCleared { success }) => Ok(success),
            _ => Err(FetchError::WorkerUnavailable),
        }
    }

    pub async fn skip_waiting(&self) -> Result<(), FetchError> {
        self.post_message(ControlRequest::SkipWaiting).await?;
        Ok(())
    }

    pub fn skip_waiting_requested(&self) -> bool {
        *self.skip_waiting.borrow()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::manager::CacheConfig;
    use crate::cache::request::ResponseSource;
    use crate::cache::storage::MemoryCacheStorage;
    use crate::cache::testing::StubNetwork;

    fn spawn_worker(
        version: &str,
        storage: Arc<MemoryCacheStorage>,
        network: Arc<StubNetwork>,
    ) -> WorkerHandle {
        let manager = ResourceCacheManager::new(CacheConfig::for_version(version), storage, network);
        CacheWorker::spawn(Arc::new(manager))
    }

    #[tokio::test]
    async fn test_install_activate_fetch_through_handle() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(StubNetwork::serving_shell("1.15"));
        let worker = spawn_worker("1.15", storage.clone(), network.clone());

        assert_eq!(worker.install().await.unwrap(), 14);
        assert!(worker.activate().await.unwrap().is_empty());

        network.set_offline(true);
        let response = worker.fetch(Request::get("/logo.png")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(response.body, b"/logo.png@1.15");
    }

    #[tokio::test]
    async fn test_get_version_reply() {
        let worker = spawn_worker(
            "1.15",
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StubNetwork::serving_shell("1.15")),
        );
        let info = worker.get_version().await.unwrap();
        assert_eq!(info.version, "1.15");
        assert_eq!(info.cache_name, "pkv-belege-v1.15");
        assert_eq!(worker.cache_name(), "pkv-belege-v1.15");
    }

    #[tokio::test]
    async fn test_clear_cache_reply() {
        let storage = Arc::new(MemoryCacheStorage::new());
        let worker = spawn_worker("1.15", storage.clone(), Arc::new(StubNetwork::serving_shell("1.15")));
        worker.install().await.unwrap();

        assert!(worker.clear_cache().await.unwrap());
        assert!(!storage.has_cache("pkv-belege-v1.15").unwrap());
        // Clearing an absent cache still succeeds.
        assert!(worker.clear_cache().await.unwrap());
    }

    #[tokio::test]
    async fn test_skip_waiting_sets_flag_without_reply() {
        let worker = spawn_worker(
            "1.16",
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StubNetwork::serving_shell("1.16")),
        );
        assert!(!worker.skip_waiting_requested());

        let reply = worker.post_message(ControlRequest::SkipWaiting).await.unwrap();
        assert!(reply.is_none());
        assert!(worker.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_wire_messages() {
        let worker = spawn_worker(
            "1.15",
            Arc::new(MemoryCacheStorage::new()),
            Arc::new(StubNetwork::serving_shell("1.15")),
        );

        let reply = worker.post_wire_message(&json!({"type": "GET_VERSION"})).await.unwrap();
        let wire = serde_json::to_value(reply.unwrap()).unwrap();
        assert_eq!(wire["type"], "VERSION_INFO");
        assert_eq!(wire["cacheVersion"], "pkv-belege-v1.15");

        let ignored = worker.post_wire_message(&json!({"type": "PING"})).await.unwrap();
        assert!(ignored.is_none());
        assert!(!worker.skip_waiting_requested());
    }
}
