//! Application wiring for the PKV Belege command line.
//!
//! `App` owns the record store, the cache registration and the lifecycle
//! controller, and turns each command into user-facing output.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate, Utc};
use tracing::{debug, info, warn};

use pkv_belege_core::backup::{self, BackupAge};
use pkv_belege_core::cache::{
    ControlReply, ControlRequest, FsCacheStorage, HttpNetwork, Registration, Request, Response,
};
use pkv_belege_core::config::Config;
use pkv_belege_core::lifecycle::{LifecycleController, UpdateCheck};
use pkv_belege_core::models::{RecordId, Settings};
use pkv_belege_core::reconcile::{ClockIdGenerator, ImportMode};
use pkv_belege_core::store::{FileKvStore, RecordStore, YearOverview};

type Kv = Arc<FileKvStore>;

const NO_ORIGIN: &str = "No origin configured. Set origin_url in the config or PKV_BELEGE_ORIGIN";

pub struct App {
    store: RecordStore<Kv>,
    ids: ClockIdGenerator,
    lifecycle: LifecycleController<Kv>,
    /// None when no origin is configured.
    registration: Option<Registration<FsCacheStorage, HttpNetwork>>,
}

impl App {
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        Self::with_config(config.apply_env())
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let data_dir = config.data_dir()?;
        debug!(?data_dir, "Data directory configured");

        let kv = Arc::new(
            FileKvStore::new(data_dir.clone())
                .with_context(|| format!("Could not open data directory {}", data_dir.display()))?,
        );
        let store = RecordStore::load(kv.clone()).context("Could not load stored records")?;

        let registration = match config.origin() {
            Ok(origin) => {
                let cache_dir = config.cache_dir()?;
                let storage = FsCacheStorage::new(cache_dir.clone()).with_context(|| {
                    format!("Could not open cache directory {}", cache_dir.display())
                })?;
                let network = HttpNetwork::new(origin)?.with_offline(config.offline_mode);
                Some(Registration::new(Arc::new(storage), Arc::new(network)))
            }
            Err(e) => {
                debug!(error = %e, "Offline cache unavailable");
                None
            }
        };

        let lifecycle = LifecycleController::new(kv, config.cache_config());

        Ok(Self {
            store,
            ids: ClockIdGenerator::new(),
            lifecycle,
            registration,
        })
    }

    // ========================================================================
    // Records
    // ========================================================================

    pub fn list(&self, year: Option<i32>) -> String {
        let year = year.unwrap_or_else(current_year);
        let records = self.store.records_for_year(year);
        if records.is_empty() {
            return format!("No receipts for {}", year);
        }

        let mut out = String::new();
        for record in records {
            let _ = writeln!(
                out,
                "{:<18} {}  {:>10.2}  {}",
                record.id,
                record.fields.date,
                record.fields.amount,
                record.fields.description
            );
        }
        out
    }

    pub fn add(&mut self, date: NaiveDate, amount: f64, description: &str) -> Result<String> {
        let id = self.store.add_record(date, description, amount, &mut self.ids)?;
        Ok(format!("Added receipt {}", id))
    }

    pub fn edit(&mut self, id: &str, date: NaiveDate, amount: f64, description: &str) -> Result<String> {
        let id = RecordId::from(id);
        self.store.update_record(&id, date, description, amount)?;
        Ok(format!("Updated receipt {}", id))
    }

    pub fn delete(&mut self, id: &str) -> Result<String> {
        let id = RecordId::from(id);
        self.store.delete_record(&id)?;
        Ok(format!("Deleted receipt {}", id))
    }

    pub fn overview(&self, year: Option<i32>) -> String {
        let year = year.unwrap_or_else(current_year);
        let overview = YearOverview::compute(self.store.records(), self.store.settings(), year);
        format!(
            "{}: {} receipts, total {:.2}\nMinimum {:.2}, remaining {:.2}\n{}",
            overview.year,
            overview.record_count,
            overview.total,
            overview.minimum,
            overview.remaining,
            overview.status.label()
        )
    }

    pub fn settings(&mut self, deductible: Option<f64>, reimbursement: Option<f64>) -> Result<String> {
        if deductible.is_some() || reimbursement.is_some() {
            let current = self.store.settings();
            let next = Settings::new(
                deductible.unwrap_or(current.deductible()),
                reimbursement.unwrap_or(current.reimbursement()),
            );
            self.store.update_settings(next)?;
        }
        let settings = self.store.settings();
        Ok(format!(
            "Deductible: {:.2}\nPremium refund: {:.2}",
            settings.deductible(),
            settings.reimbursement()
        ))
    }

    // ========================================================================
    // Backups
    // ========================================================================

    pub fn status(&self) -> Result<String> {
        let last = backup::last_backup(self.store.kv())?;
        let age = BackupAge::from_last_backup(last, Utc::now());
        Ok(format!(
            "{} receipts stored\nLast backup: {}",
            self.store.records().len(),
            age
        ))
    }

    pub fn export(&self, dir: &Path) -> Result<PathBuf> {
        let path = backup::write_backup(&self.store, dir, Utc::now())
            .map_err(|e| anyhow!("Backup failed: {}", e))?;
        Ok(path)
    }

    pub fn import(&mut self, file: &Path, mode: ImportMode) -> Result<String> {
        let summary = backup::import_backup_file(&mut self.store, file, mode, &mut self.ids)
            .map_err(|e| anyhow!("{}: {}", e.kind().message(), e))?;
        Ok(summary.to_string())
    }

    // ========================================================================
    // Offline cache and updates
    // ========================================================================

    fn registration(&mut self) -> Result<&mut Registration<FsCacheStorage, HttpNetwork>> {
        self.registration
            .as_mut()
            .ok_or_else(|| anyhow!(NO_ORIGIN))
    }

    /// Register this build's cache generation and check for an update.
    async fn start(&mut self) -> Result<UpdateCheck> {
        let today = Local::now().date_naive();
        let registration = self
            .registration
            .as_mut()
            .ok_or_else(|| anyhow!(NO_ORIGIN))?;
        let check = self
            .lifecycle
            .start(registration, today)
            .await?;
        info!(?check, "Lifecycle started");
        Ok(check)
    }

    pub async fn cache_install(&mut self) -> Result<String> {
        let check = self.start().await?;
        let registration = self.registration()?;
        let mut out = match registration.active_version() {
            Some(version) => format!("Cache generation {} active", version),
            None => "No active cache generation".to_string(),
        };
        if let Some(waiting) = registration.waiting_version() {
            let _ = write!(out, ", {} waiting", waiting);
        }
        if let Some(notice) = check.notice() {
            let _ = write!(out, "\n{}", notice);
        }
        Ok(out)
    }

    pub async fn cache_fetch(&mut self, path: &str, navigate: bool) -> Result<Response> {
        if let Err(e) = self.start().await {
            warn!(error = %e, "Starting without a cache generation");
        }
        let request = if navigate {
            Request::navigate(path)
        } else {
            Request::get(path)
        };
        let registration = self.registration()?;
        let client = registration.connect_client();
        let result = registration.fetch(client, request).await;
        registration.disconnect_client(client).await;
        result.map_err(|e| anyhow!("{}: {}", e.kind().message(), e))
    }

    pub async fn cache_version(&mut self) -> Result<String> {
        self.post(ControlRequest::GetVersion).await
    }

    pub async fn cache_clear(&mut self) -> Result<String> {
        self.post(ControlRequest::ClearCache).await
    }

    async fn post(&mut self, request: ControlRequest) -> Result<String> {
        if let Err(e) = self.start().await {
            warn!(error = %e, "Starting without a cache generation");
        }
        let reply: Option<ControlReply> = self.registration()?.post_message(request).await?;
        match reply {
            Some(reply) => Ok(serde_json::to_string_pretty(&reply)?),
            None => Ok(String::new()),
        }
    }

    pub async fn update_check(&mut self) -> Result<String> {
        let check = self.start().await?;
        Ok(describe_check(&check))
    }

    pub async fn update_apply(&mut self) -> Result<String> {
        self.start().await?;
        let registration = self
            .registration
            .as_mut()
            .ok_or_else(|| anyhow!(NO_ORIGIN))?;
        let promoted = self
            .lifecycle
            .apply_update(registration)
            .await?;
        if promoted {
            Ok("Update applied. Reload the application to use it.".to_string())
        } else {
            Ok("No update waiting".to_string())
        }
    }

    pub async fn update_refresh(&mut self) -> Result<String> {
        if let Err(e) = self.start().await {
            warn!(error = %e, "Refreshing without a running cache generation");
        }
        let registration = self
            .registration
            .as_mut()
            .ok_or_else(|| anyhow!(NO_ORIGIN))?;
        let state = self
            .lifecycle
            .force_refresh(registration)
            .await?;
        Ok(format!(
            "Cache {} rebuilt ({})",
            self.lifecycle.config().cache_name(),
            state
        ))
    }
}

fn current_year() -> i32 {
    Local::now().year()
}

fn describe_check(check: &UpdateCheck) -> String {
    match check {
        UpdateCheck::Skipped => "Already checked today".to_string(),
        UpdateCheck::FirstRun { version } => format!("Running version {}", version),
        UpdateCheck::Unchanged { version } => format!("Version {} is up to date", version),
        UpdateCheck::UpdateAvailable(notice) => notice.to_string(),
    }
}
