use std::path::PathBuf;

use thiserror::Error;

use crate::models::RecordId;

/// Short category shown to the user next to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    BadFileFormat,
    NetworkUnreachable,
    Storage,
}

impl FailureKind {
    pub fn message(&self) -> &'static str {
        match self {
            FailureKind::BadFileFormat => "bad file format",
            FailureKind::NetworkUnreachable => "could not reach network",
            FailureKind::Storage => "could not save data",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored value for {key} is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Record not found: {0}")]
    NotFound(RecordId),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Malformed backup: {0}")]
    Malformed(String),

    #[error("Backup is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Backup contains an invalid value: {0}")]
    InvalidField(String),

    #[error("Failed to read backup file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to save imported data: {0}")]
    Store(#[from] StoreError),
}

impl ImportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ImportError::Store(_) => FailureKind::Storage,
            _ => FailureKind::BadFileFormat,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cache storage lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid request URL {path}: {reason}")]
    InvalidUrl { path: String, reason: String },

    #[error("No cached response available for {0}")]
    NoCachedResponse(String),

    #[error("Failed to install {path}: status {status}")]
    InstallStatus { path: String, status: u16 },

    #[error("Cache storage failed: {0}")]
    Storage(#[from] CacheError),

    #[error("Cache worker is not running")]
    WorkerUnavailable,
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Storage(_) => FailureKind::Storage,
            _ => FailureKind::NetworkUnreachable,
        }
    }
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
