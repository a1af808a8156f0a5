//! Named, versioned response caches.
//!
//! A storage area holds any number of named caches, each mapping request
//! keys to stored responses. The storage itself knows nothing about
//! versions; the cache manager decides which names belong to it.

use std::collections::BTreeMap;
use std::sync::RwLock;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::request::Response;
use crate::error::CacheError;

pub trait CacheStorage: Send + Sync + 'static {
    /// Names of every cache in this storage area, including foreign ones.
    fn cache_names(&self) -> Result<Vec<String>, CacheError>;

    fn has_cache(&self, name: &str) -> Result<bool, CacheError>;

    /// Delete a cache and all its entries. Returns whether it existed.
    fn delete_cache(&self, name: &str) -> Result<bool, CacheError>;

    fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>, CacheError>;

    /// Store one entry, creating the cache if needed.
    fn put(&self, name: &str, key: &str, response: &Response) -> Result<(), CacheError>;

    /// Store a batch of entries. Readers see either none or all of them.
    fn put_all(&self, name: &str, entries: &[(String, Response)]) -> Result<(), CacheError>;

    fn entry_count(&self, name: &str) -> Result<usize, CacheError>;
}

/// Serialized form of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredResponse {
    pub key: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn capture(key: &str, response: &Response) -> Self {
        Self {
            key: key.to_string(),
            status: response.status.as_u16(),
            content_type: response.content_type.clone(),
            body: response.body.clone(),
        }
    }

    pub fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        Response::new(status, self.content_type, self.body).from_cache()
    }
}

type CacheMap = BTreeMap<String, BTreeMap<String, StoredResponse>>;

/// Cache storage held in memory.
#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<CacheMap>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        let caches = self
            .caches
            .read()
            .map_err(|_| CacheError::LockPoisoned("cache_names"))?;
        Ok(caches.keys().cloned().collect())
    }

    fn has_cache(&self, name: &str) -> Result<bool, CacheError> {
        let caches = self
            .caches
            .read()
            .map_err(|_| CacheError::LockPoisoned("has_cache"))?;
        Ok(caches.contains_key(name))
    }

    fn delete_cache(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self
            .caches
            .write()
            .map_err(|_| CacheError::LockPoisoned("delete_cache"))?;
        Ok(caches.remove(name).is_some())
    }

    fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let caches = self
            .caches
            .read()
            .map_err(|_| CacheError::LockPoisoned("lookup"))?;
        Ok(caches
            .get(name)
            .and_then(|entries| entries.get(key))
            .cloned()
            .map(StoredResponse::into_response))
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        let mut caches = self
            .caches
            .write()
            .map_err(|_| CacheError::LockPoisoned("put"))?;
        caches
            .entry(name.to_string())
            .or_default()
            .insert(key.to_string(), StoredResponse::capture(key, response));
        Ok(())
    }

    fn put_all(&self, name: &str, entries: &[(String, Response)]) -> Result<(), CacheError> {
        let mut caches = self
            .caches
            .write()
            .map_err(|_| CacheError::LockPoisoned("put_all"))?;
        let cache = caches.entry(name.to_string()).or_default();
        for (key, response) in entries {
            cache.insert(key.clone(), StoredResponse::capture(key, response));
        }
        Ok(())
    }

    fn entry_count(&self, name: &str) -> Result<usize, CacheError> {
        let caches = self
            .caches
            .read()
            .map_err(|_| CacheError::LockPoisoned("entry_count"))?;
        Ok(caches.get(name).map(|entries| entries.len()).unwrap_or(0))
    }
}
