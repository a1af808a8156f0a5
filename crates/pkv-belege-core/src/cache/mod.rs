//! Offline resource cache for the application shell.
//!
//! Each application version owns one named cache generation
//! (`pkv-belege-v<version>`). A generation is installed in one batch,
//! waits until it may take over, and on activation deletes every older
//! generation of this application. Page requests are answered network
//! first with a cache fallback; static assets are served cache first.

pub mod control;
pub mod fs_storage;
pub mod manager;
pub mod network;
pub mod policy;
pub mod registration;
pub mod request;
pub mod storage;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{ControlReply, ControlRequest, VersionInfo};
pub use fs_storage::FsCacheStorage;
pub use manager::{
    compare_versions, CacheConfig, ResourceCacheManager, APP_VERSION, CACHE_PREFIX, SHELL_MANIFEST,
};
pub use network::{HttpNetwork, Network};
pub use registration::{ClientId, GenerationState, Registration};
pub use request::{Request, Response, ResponseSource};
pub use storage::{CacheStorage, MemoryCacheStorage};
pub use worker::{CacheWorker, WorkerHandle};
