//! Filesystem-backed cache storage.
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<cache name>/<hex key>.json   status, content type, original key
//! <root>/<cache name>/<hex key>.body   response bytes
//! ```
//!
//! The `.json` file is written after the body and marks the entry as
//! present. Batches are written into a hidden staging directory first and
//! moved into place once every entry is on disk.

use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::{debug, warn};

use super::request::Response;
use super::storage::{CacheStorage, StoredResponse};
use crate::error::CacheError;

const META_EXT: &str = "json";
const BODY_EXT: &str = "body";

pub struct FsCacheStorage {
    root: PathBuf,
}

impl FsCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn cache_dir(&self, name: &str) -> Result<PathBuf, CacheError> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(CacheError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn file_stem(key: &str) -> String {
        key.bytes().map(|b| format!("{:02x}", b)).collect()
    }

    fn write_entry(dir: &Path, key: &str, response: &Response) -> Result<(), CacheError> {
        let stem = Self::file_stem(key);
        let stored = StoredResponse::capture(key, response);
        let meta_path = dir.join(format!("{}.{}", stem, META_EXT));
        let meta = serde_json::to_vec_pretty(&stored).map_err(|source| CacheError::Corrupt {
            path: meta_path.clone(),
            source,
        })?;
        std::fs::write(dir.join(format!("{}.{}", stem, BODY_EXT)), &stored.body)?;
        std::fs::write(meta_path, meta)?;
        Ok(())
    }

    fn read_entry(dir: &Path, key: &str) -> Result<Option<Response>, CacheError> {
        let stem = Self::file_stem(key);
        let meta_path = dir.join(format!("{}.{}", stem, META_EXT));
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta = std::fs::read(&meta_path)?;
        let mut stored: StoredResponse =
            serde_json::from_slice(&meta).map_err(|source| CacheError::Corrupt {
                path: meta_path.clone(),
                source,
            })?;
        stored.body = std::fs::read(dir.join(format!("{}.{}", stem, BODY_EXT)))?;
        Ok(Some(stored.into_response()))
    }

    fn staging_dir(&self, name: &str) -> PathBuf {
        let suffix: u32 = rand::thread_rng().gen();
        self.root.join(format!(".staging-{}-{:08x}", name, suffix))
    }
}

impl CacheStorage for FsCacheStorage {
    fn cache_names(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn has_cache(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.cache_dir(name)?.is_dir())
    }

    fn delete_cache(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.cache_dir(name)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        debug!(cache = name, "Deleted cache directory");
        Ok(true)
    }

    fn lookup(&self, name: &str, key: &str) -> Result<Option<Response>, CacheError> {
        let dir = self.cache_dir(name)?;
        if !dir.is_dir() {
            return Ok(None);
        }
        Self::read_entry(&dir, key)
    }

    fn put(&self, name: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        let dir = self.cache_dir(name)?;
        std::fs::create_dir_all(&dir)?;
        Self::write_entry(&dir, key, response)
    }

    fn put_all(&self, name: &str, entries: &[(String, Response)]) -> Result<(), CacheError> {
        let target = self.cache_dir(name)?;
        let staging = self.staging_dir(name);
        std::fs::create_dir_all(&staging)?;

        let written = entries
            .iter()
            .try_for_each(|(key, response)| Self::write_entry(&staging, key, response));
        if let Err(e) = written {
            if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                warn!(error = %cleanup, path = ?staging, "Failed to remove staging directory");
            }
            return Err(e);
        }

        if !target.exists() {
            std::fs::rename(&staging, &target)?;
            return Ok(());
        }

        // Cache already exists: move bodies before metadata so no entry is
        // visible without its bytes.
        let mut files: Vec<PathBuf> = std::fs::read_dir(&staging)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<_, _>>()?;
        files.sort_by_key(|path| path.extension().map(|ext| ext == META_EXT).unwrap_or(false));
        for path in files {
            if let Some(file_name) = path.file_name() {
                std::fs::rename(&path, target.join(file_name))?;
            }
        }
        std::fs::remove_dir_all(&staging)?;
        Ok(())
    }

    fn entry_count(&self, name: &str) -> Result<usize, CacheError> {
        let dir = self.cache_dir(name)?;
        if !dir.is_dir() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|ext| ext == META_EXT).unwrap_or(false) {
                count += 1;
            }
        }
        Ok(count)
    }
}
