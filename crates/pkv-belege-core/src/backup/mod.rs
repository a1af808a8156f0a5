//! Backup export and import.
//!
//! Export writes the whole store as a `Snapshot` JSON file and remembers
//! when it happened. Import parses a snapshot, reconciles it with the live
//! store and persists the result; on any failure the store is unchanged.

pub mod age;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{ImportError, StoreError};
use crate::models::{export_filename, AppInfo, IncomingRecord, Snapshot, FORMAT_VERSION};
use crate::reconcile::{reconcile, IdGenerator, ImportMode, ImportSummary};
use crate::store::kv::KEY_LAST_BACKUP;
use crate::store::{KeyValueStore, RecordStore, StoreState};

pub use age::BackupAge;

/// Build a snapshot of `state` stamped with `now`.
pub fn export_snapshot(state: &StoreState, now: DateTime<Utc>) -> Snapshot {
    Snapshot {
        version: FORMAT_VERSION.to_string(),
        export_date: Some(now),
        records: state.records.iter().cloned().map(IncomingRecord::from).collect(),
        settings: Some(state.settings.clone()),
        app_info: AppInfo::default(),
    }
}

/// Write a backup file into `dir` and record the backup time.
pub fn write_backup<K: KeyValueStore>(
    store: &RecordStore<K>,
    dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf, StoreError> {
    let snapshot = export_snapshot(store.state(), now);
    let contents = serde_json::to_string_pretty(&snapshot).map_err(|source| StoreError::Encode {
        key: "backup".to_string(),
        source,
    })?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(now.date_naive()));
    std::fs::write(&path, contents)?;

    store.kv().set(KEY_LAST_BACKUP, now.to_rfc3339())?;
    info!(path = ?path, records = snapshot.records.len(), "Backup written");
    Ok(path)
}

/// When the last backup was exported, if ever.
pub fn last_backup<K: KeyValueStore>(kv: &K) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(raw) = kv.get(KEY_LAST_BACKUP)? else {
        return Ok(None);
    };
    match DateTime::parse_from_rfc3339(&raw) {
        Ok(ts) => Ok(Some(ts.with_timezone(&Utc))),
        Err(e) => {
            warn!(error = %e, value = %raw, "Ignoring unreadable last-backup timestamp");
            Ok(None)
        }
    }
}

/// Only JSON files are offered for import.
pub fn is_backup_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Parse `raw` as a snapshot and reconcile it into `store` under `mode`.
///
/// The store is persisted before the summary is returned. Validation and
/// storage failures leave both the in-memory and the durable state as they
/// were.
pub fn import_backup<K: KeyValueStore>(
    store: &mut RecordStore<K>,
    raw: &[u8],
    mode: ImportMode,
    ids: &mut dyn IdGenerator,
) -> Result<ImportSummary, ImportError> {
    let snapshot = Snapshot::parse(raw)?;
    let (next, summary) = reconcile(store.state(), &snapshot, mode, ids);

    if summary.is_noop() {
        info!(mode = mode.as_str(), skipped = summary.skipped, "Import changed nothing");
        return Ok(summary);
    }

    store.commit(next, summary.commit_scope())?;
    info!(
        mode = mode.as_str(),
        imported = summary.imported,
        updated = summary.updated,
        skipped = summary.skipped,
        total = summary.total,
        "Backup imported"
    );
    Ok(summary)
}

/// Read a backup file from disk and import it.
pub fn import_backup_file<K: KeyValueStore>(
    store: &mut RecordStore<K>,
    path: &Path,
    mode: ImportMode,
    ids: &mut dyn IdGenerator,
) -> Result<ImportSummary, ImportError> {
    if !is_backup_file(path) {
        return Err(ImportError::Malformed(
            "only JSON backup files are supported".to_string(),
        ));
    }
    let raw = std::fs::read(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    import_backup(store, &raw, mode, ids)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};
    use tempfile::TempDir;

    use super::*;
    use crate::models::{RecordId, Settings};
    use crate::reconcile::SequentialIds;
    use crate::store::kv::{KEY_RECORDS, KEY_SETTINGS};
    use crate::store::{FileKvStore, MemoryKvStore};

    fn dentist_store() -> RecordStore<MemoryKvStore> {
        let mut store = RecordStore::load(MemoryKvStore::new()).unwrap();
        store.update_settings(Settings::new(300.0, 0.0)).unwrap();
        store
            .add_record(
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                "Zahnarzt",
                150.0,
                &mut SequentialIds::starting_at(1),
            )
            .unwrap();
        store
    }

    const MERGE_BACKUP: &[u8] = br#"{
        "version": "1.0",
        "exportDate": "2024-05-01T08:00:00.000Z",
        "belege": [
            {"id": 1, "datum": "2024-03-01", "beschreibung": "Zahnarzt (korrigiert)", "betrag": 180.00},
            {"id": 2, "datum": "2024-04-10", "beschreibung": "Brille", "betrag": 220.00}
        ],
        "appInfo": {"name": "PKV Belege", "version": "1.0"}
    }"#;

    #[test]
    fn test_import_merge_persists_result() {
        let mut store = dentist_store();
        let summary = import_backup(
            &mut store,
            MERGE_BACKUP,
            ImportMode::Merge,
            &mut SequentialIds::starting_at(1000),
        )
        .unwrap();

        assert_eq!((summary.imported, summary.updated), (1, 1));
        assert_eq!(store.records().len(), 2);

        let raw = store.kv().get(KEY_RECORDS).unwrap().unwrap();
        let copy = MemoryKvStore::new();
        for (key, value) in store.kv().dump() {
            copy.set(&key, value).unwrap();
        }
        let reloaded = RecordStore::load(copy).unwrap();
        assert_eq!(reloaded.records().len(), 2);
        assert!(raw.contains("Zahnarzt (korrigiert)"));
        assert_eq!(
            reloaded.state().find(&RecordId::from(1)).unwrap().fields.amount,
            180.0
        );
    }

    #[test]
    fn test_import_keeps_records_without_description() {
        let mut store = dentist_store();
        let raw = br#"{"belege": [{"id": 7, "datum": "2024-02-02", "beschreibung": "", "betrag": 0}]}"#;
        let summary = import_backup(
            &mut store,
            raw,
            ImportMode::Merge,
            &mut SequentialIds::starting_at(1000),
        )
        .unwrap();

        assert_eq!(summary.imported, 1);
        let record = store.state().find(&RecordId::from(7)).unwrap();
        assert_eq!(record.fields.description, "");
        assert_eq!(record.fields.amount, 0.0);
    }

    #[test]
    fn test_malformed_backup_leaves_store_unchanged() {
        let mut store = dentist_store();
        let before = store.kv().dump();
        let state_before = store.state().clone();

        for raw in [
            &br#"{"version": "1.0"}"#[..],
            &br#"{"belege": "nope"}"#[..],
            &b"]["[..],
        ] {
            let err = import_backup(
                &mut store,
                raw,
                ImportMode::Replace,
                &mut SequentialIds::starting_at(1),
            )
            .unwrap_err();
            assert_eq!(err.kind().message(), "bad file format");
        }

        assert_eq!(store.kv().dump(), before);
        assert_eq!(store.state(), &state_before);
    }

    #[test]
    fn test_add_mode_never_touches_settings_key() {
        let mut store = dentist_store();
        let settings_before = store.kv().get(KEY_SETTINGS).unwrap();
        let raw = br#"{"belege": [{"id": 9, "datum": "2024-02-02", "beschreibung": "Neu", "betrag": 20}],
                      "einstellungen": {"selbstbeteiligung": 999}}"#;
        let summary =
            import_backup(&mut store, raw, ImportMode::Add, &mut SequentialIds::starting_at(50))
                .unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(store.kv().get(KEY_SETTINGS).unwrap(), settings_before);
    }

    #[test]
    fn test_export_then_replace_restores_same_state() {
        let dir = TempDir::new().unwrap();
        let store = dentist_store();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let path = write_backup(&store, dir.path(), now).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "pkv-belege-backup-2024-05-01.json"
        );
        assert_eq!(last_backup(store.kv()).unwrap(), Some(now));

        let data_dir = TempDir::new().unwrap();
        let mut fresh = RecordStore::load(FileKvStore::new(data_dir.path().to_path_buf()).unwrap())
            .unwrap();
        import_backup_file(
            &mut fresh,
            &path,
            ImportMode::Replace,
            &mut SequentialIds::starting_at(1),
        )
        .unwrap();
        assert_eq!(fresh.state(), store.state());
    }

    #[test]
    fn test_import_rejects_non_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.csv");
        std::fs::write(&path, "id;datum").unwrap();
        let mut store = dentist_store();
        let err = import_backup_file(
            &mut store,
            &path,
            ImportMode::Merge,
            &mut SequentialIds::starting_at(1),
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Malformed(_)));
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file(Path::new("pkv-belege-backup-2024-05-01.json")));
        assert!(is_backup_file(Path::new("BACKUP.JSON")));
        assert!(!is_backup_file(Path::new("notes.txt")));
        assert!(!is_backup_file(Path::new("json")));
    }
}
