//! Core library for PKV Belege, an offline-capable receipt keeper for
//! private health insurance.
//!
//! This crate contains the record store, backup reconciliation, the
//! versioned resource cache and its lifecycle, independent of any UI.

pub mod backup;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod reconcile;
pub mod store;

pub use config::Config;
pub use error::{CacheError, FailureKind, FetchError, ImportError, LifecycleError, StoreError};
pub use lifecycle::{LifecycleController, UpdateCheck, UpdateNotice};
