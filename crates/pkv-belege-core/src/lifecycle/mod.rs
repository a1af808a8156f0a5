//! Version detection between the cache worker and the running application.
//!
//! The controller asks the newest cache generation for its version token
//! and compares it with the version it saw last time. A change is surfaced
//! once as an `UpdateNotice`; reloading is left to the user. Checks run on
//! every start and at most once per calendar day afterwards.

use std::fmt;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, CacheStorage, GenerationState, Network, Registration};
use crate::error::{FetchError, LifecycleError};
use crate::store::kv::{KEY_LAST_UPDATE_CHECK, KEY_LAST_VERSION};
use crate::store::KeyValueStore;

const CHECK_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotice {
    pub previous: String,
    pub current: String,
    pub cache_name: String,
}

impl fmt::Display for UpdateNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Version {} is available (you were using {}). Reload to update.",
            self.current, self.previous
        )
    }
}

/// Outcome of one update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateCheck {
    /// Already checked today.
    Skipped,
    /// No version was recorded before; nothing to announce.
    FirstRun { version: String },
    Unchanged { version: String },
    UpdateAvailable(UpdateNotice),
}

impl UpdateCheck {
    pub fn notice(&self) -> Option<&UpdateNotice> {
        match self {
            UpdateCheck::UpdateAvailable(notice) => Some(notice),
            _ => None,
        }
    }
}

pub struct LifecycleController<K: KeyValueStore> {
    kv: K,
    config: CacheConfig,
}

impl<K: KeyValueStore> LifecycleController<K> {
    pub fn new(kv: K, config: CacheConfig) -> Self {
        Self { kv, config }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Register this build's cache generation and check for a new version.
    ///
    /// A failed install is not fatal while an older generation is still
    /// installed; it is retried on the next start.
    pub async fn start<S: CacheStorage, N: Network>(
        &self,
        registration: &mut Registration<S, N>,
        today: NaiveDate,
    ) -> Result<UpdateCheck, LifecycleError> {
        match registration.register(self.config.clone()).await {
            Ok(state) => debug!(version = %self.config.version, %state, "Generation registered"),
            Err(e) if registration.newest_worker().is_some() => {
                warn!(version = %self.config.version, error = %e, "Install failed, keeping installed generation");
            }
            Err(e) => return Err(e.into()),
        }
        self.check_for_update(registration, today).await
    }

    /// Whether no check has run yet on `today`.
    pub fn is_check_due(&self, today: NaiveDate) -> Result<bool, LifecycleError> {
        let Some(raw) = self.kv.get(KEY_LAST_UPDATE_CHECK)? else {
            return Ok(true);
        };
        match NaiveDate::parse_from_str(&raw, CHECK_DATE_FORMAT) {
            Ok(last) => Ok(last != today),
            Err(e) => {
                warn!(value = %raw, error = %e, "Ignoring unreadable last update check date");
                Ok(true)
            }
        }
    }

    /// Periodic trigger; checks at most once per calendar day.
    pub async fn on_tick<S: CacheStorage, N: Network>(
        &self,
        registration: &mut Registration<S, N>,
        today: NaiveDate,
    ) -> Result<UpdateCheck, LifecycleError> {
        if !self.is_check_due(today)? {
            return Ok(UpdateCheck::Skipped);
        }
        self.check_for_update(registration, today).await
    }

    /// Ask the newest generation for its version and compare it with the
    /// last observed one. Both the version and the check date are persisted.
    pub async fn check_for_update<S: CacheStorage, N: Network>(
        &self,
        registration: &Registration<S, N>,
        today: NaiveDate,
    ) -> Result<UpdateCheck, LifecycleError> {
        let worker = registration
            .newest_worker()
            .ok_or(FetchError::WorkerUnavailable)?;
        let info = worker.get_version().await?;
        let previous = self.kv.get(KEY_LAST_VERSION)?;

        self.kv.set_many(&[
            (KEY_LAST_VERSION, info.version.clone()),
            (KEY_LAST_UPDATE_CHECK, today.format(CHECK_DATE_FORMAT).to_string()),
        ])?;

        let outcome = match previous {
            None => UpdateCheck::FirstRun {
                version: info.version,
            },
            Some(previous) if previous == info.version => UpdateCheck::Unchanged {
                version: info.version,
            },
            Some(previous) => {
                info!(previous = %previous, current = %info.version, "New version detected");
                UpdateCheck::UpdateAvailable(UpdateNotice {
                    previous,
                    current: info.version,
                    cache_name: info.cache_name,
                })
            }
        };
        Ok(outcome)
    }

    /// Activate the waiting generation now. Returns whether a generation
    /// was promoted, in which case the page should reload.
    pub async fn apply_update<S: CacheStorage, N: Network>(
        &self,
        registration: &mut Registration<S, N>,
    ) -> Result<bool, LifecycleError> {
        let promoted = registration.skip_waiting().await?;
        if promoted {
            info!(version = ?registration.active_version(), "Update applied, reload required");
        } else {
            debug!("No waiting generation to apply");
        }
        Ok(promoted)
    }

    /// Drop the current cache and install this build's generation afresh.
    pub async fn force_refresh<S: CacheStorage, N: Network>(
        &self,
        registration: &mut Registration<S, N>,
    ) -> Result<GenerationState, LifecycleError> {
        let current = registration.active_worker().or(registration.waiting_worker());
        if let Some(worker) = current {
            let cleared = worker.clear_cache().await?;
            info!(cache = %worker.cache_name(), cleared, "Cache cleared for refresh");
        }
        let state = registration.reinstall(self.config.clone()).await?;
        if state == GenerationState::Waiting {
            registration.skip_waiting().await?;
        }
        Ok(registration
            .state_of(&self.config.version)
            .unwrap_or(state))
    }
}
