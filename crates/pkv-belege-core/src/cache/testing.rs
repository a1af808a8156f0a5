//! Test doubles for the cache subsystem.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;

use super::manager::SHELL_MANIFEST;
use super::network::Network;
use super::request::{normalize_path, Request, Response};
use super::storage::{CacheStorage, MemoryCacheStorage};
use crate::error::{CacheError, FetchError};

#[derive(Default)]
struct StubState {
    responses: HashMap<String, Response>,
    hits: HashMap<String, usize>,
    offline: bool,
}

/// In-memory origin. Unknown paths answer 404.
#[derive(Default)]
pub(crate) struct StubNetwork {
    state: Mutex<StubState>,
}

impl StubNetwork {
    /// An origin serving every shell resource with body `<key>@<version>`.
    pub fn serving_shell(version: &str) -> Self {
        let network = Self::default();
        network.deploy(version);
        network
    }

    /// Replace every shell resource with the given version's content.
    pub fn deploy(&self, version: &str) {
        for path in SHELL_MANIFEST {
            let key = normalize_path(path);
            let body = format!("{}@{}", key, version).into_bytes();
            self.serve(&key, Response::new(StatusCode::OK, None, body));
        }
    }

    pub fn serve(&self, path: &str, response: Response) {
        let mut state = self.state.lock().unwrap();
        state.responses.insert(normalize_path(path), response);
    }

    pub fn set_status(&self, path: &str, status: StatusCode) {
        let mut state = self.state.lock().unwrap();
        if let Some(response) = state.responses.get_mut(&normalize_path(path)) {
            response.status = status;
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn hits(&self, path: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.hits.get(&normalize_path(path)).copied().unwrap_or(0)
    }
}

impl Network for StubNetwork {
    fn fetch<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response, FetchError>> {
        let result = {
            let mut state = self.state.lock().unwrap();
            if state.offline {
                Err(FetchError::Unreachable(request.path.clone()))
            } else {
                *state.hits.entry(request.path.clone()).or_default() += 1;
                Ok(state
                    .responses
                    .get(&request.path)
                    .cloned()
                    .unwrap_or_else(|| Response::new(StatusCode::NOT_FOUND, None, Vec::new())))
            }
        };
        futures::future::ready(result).boxed()
    }
}

/// Storage whose every operation fails.
pub(crate) struct FailingStorage;

impl FailingStorage {
    fn error() -> CacheError {
        CacheError::Io(std::io::Error::other("storage unavailable"))
    }
}

impl CacheStorage for FailingStorage {
    fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        Err(Self::error())
    }

    fn has_cache(&self, _name: &str) -> Result<bool, CacheError> {
        Err(Self::error())
    }

    fn delete_cache(&self, _name: &str) -> Result<bool, CacheError> {
        Err(Self::error())
    }

    fn lookup(&self, _name: &str, _key: &str) -> Result<Option<Response>, CacheError> {
        Err(Self::error())
    }

    fn put(&self, _name: &str, _key: &str, _response: &Response) -> Result<(), CacheError> {
        Err(Self::error())
    }

    fn put_all(&self, _name: &str, _entries: &[(String, Response)]) -> Result<(), CacheError> {
        Err(Self::error())
    }

    fn entry_count(&self, _name: &str) -> Result<usize, CacheError> {
        Err(Self::error())
    }
}

/// In-memory storage whose batch writes can be switched to fail.
#[derive(Default)]
pub(crate) struct BatchFailingStorage {
    inner: MemoryCacheStorage,
    fail_batches: AtomicBool,
}

impl BatchFailingStorage {
    pub fn set_fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }
}

impl CacheStorage for BatchFailingStorage {
    fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        self.inner.cache_names()
    }

    fn has_cache(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.has_cache(name)
    }

    fn delete_cache(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.delete_cache(name)
    }

    fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>, CacheError> {
        self.inner.lookup(name, key)
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        self.inner.put(name, key, response)
    }

    fn put_all(&self, name: &str, entries: &[(String, Response)]) -> Result<(), CacheError> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(CacheError::Io(std::io::Error::other("disk full")));
        }
        self.inner.put_all(name, entries)
    }

    fn entry_count(&self, name: &str) -> Result<usize, CacheError> {
        self.inner.entry_count(name)
    }
}
