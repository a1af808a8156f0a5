use std::collections::HashSet;
use std::fmt;

use crate::models::{Record, RecordId, Snapshot};
use crate::store::{CommitScope, StoreState};

use super::IdGenerator;

/// How an imported snapshot is combined with the live records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Discard live records and settings, take the snapshot's.
    Replace,
    /// Overwrite records with matching ids, append the rest, merge settings.
    Merge,
    /// Append only records whose id is not already present, under new ids.
    Add,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Replace => "replace",
            ImportMode::Merge => "merge",
            ImportMode::Add => "add",
        }
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub mode: ImportMode,
    /// Records appended to the store.
    pub imported: usize,
    /// Live records overwritten in place.
    pub updated: usize,
    /// Incoming records left out because their id was already present.
    pub skipped: usize,
    /// Records in the store afterwards.
    pub total: usize,
    pub settings_changed: bool,
}

impl ImportSummary {
    /// True when the import left the record set as it was.
    pub fn is_noop(&self) -> bool {
        match self.mode {
            ImportMode::Replace => false,
            ImportMode::Merge | ImportMode::Add => {
                self.imported == 0 && self.updated == 0 && !self.settings_changed
            }
        }
    }

    pub fn commit_scope(&self) -> CommitScope {
        if self.settings_changed {
            CommitScope::RecordsAndSettings
        } else {
            CommitScope::RecordsOnly
        }
    }
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_noop() {
            write!(f, "Nothing changed: no new or updated records")?;
            if self.skipped > 0 {
                write!(f, " ({} already present)", self.skipped)?;
            }
            return Ok(());
        }
        match self.mode {
            ImportMode::Replace => {
                write!(f, "Backup fully restored: {} records loaded", self.total)
            }
            ImportMode::Merge => write!(
                f,
                "Data merged: {} new records, {} updated",
                self.imported, self.updated
            ),
            ImportMode::Add => {
                write!(f, "{} new records added", self.imported)?;
                if self.skipped > 0 {
                    write!(f, ", {} skipped (already present)", self.skipped)?;
                }
                Ok(())
            }
        }
    }
}

/// Combine `snapshot` with `live` under `mode`.
///
/// Pure: reads both inputs and returns the next state together with its
/// summary. Persisting the result is the caller's job.
pub fn reconcile(
    live: &StoreState,
    snapshot: &Snapshot,
    mode: ImportMode,
    ids: &mut dyn IdGenerator,
) -> (StoreState, ImportSummary) {
    match mode {
        ImportMode::Replace => replace(live, snapshot, ids),
        ImportMode::Merge => merge(live, snapshot, ids),
        ImportMode::Add => add(live, snapshot, ids),
    }
}

fn replace(
    live: &StoreState,
    snapshot: &Snapshot,
    ids: &mut dyn IdGenerator,
) -> (StoreState, ImportSummary) {
    let mut records: Vec<Record> = Vec::with_capacity(snapshot.records.len());
    for incoming in &snapshot.records {
        let id = incoming.usable_id().cloned().unwrap_or_else(|| ids.next_id());
        // Later duplicates replace earlier ones.
        match records.iter().position(|r| r.id == id) {
            Some(index) => records[index] = incoming.with_id(id),
            None => records.push(incoming.with_id(id)),
        }
    }

    let (settings, settings_changed) = match snapshot.settings {
        Some(ref settings) => (settings.clone(), true),
        None => (live.settings.clone(), false),
    };

    let summary = ImportSummary {
        mode: ImportMode::Replace,
        imported: records.len(),
        updated: 0,
        skipped: 0,
        total: records.len(),
        settings_changed,
    };
    (StoreState::new(records, settings), summary)
}

fn merge(
    live: &StoreState,
    snapshot: &Snapshot,
    ids: &mut dyn IdGenerator,
) -> (StoreState, ImportSummary) {
    let mut next = live.clone();
    let mut imported = 0;
    let mut updated = 0;

    for incoming in &snapshot.records {
        let id = incoming.usable_id().cloned().unwrap_or_else(|| ids.next_id());
        match next.records.iter().position(|r| r.id == id) {
            Some(index) => {
                next.records[index] = incoming.with_id(id);
                updated += 1;
            }
            None => {
                next.records.push(incoming.with_id(id));
                imported += 1;
            }
        }
    }

    let settings_changed = match snapshot.settings {
        Some(ref settings) => {
            next.settings = live.settings.merged_with(settings);
            true
        }
        None => false,
    };

    let summary = ImportSummary {
        mode: ImportMode::Merge,
        imported,
        updated,
        skipped: 0,
        total: next.records.len(),
        settings_changed,
    };
    (next, summary)
}

fn add(
    live: &StoreState,
    snapshot: &Snapshot,
    ids: &mut dyn IdGenerator,
) -> (StoreState, ImportSummary) {
    let existing: HashSet<&RecordId> = live.records.iter().map(|r| &r.id).collect();
    let mut next = live.clone();
    let mut imported = 0;
    let mut skipped = 0;

    for incoming in &snapshot.records {
        // A fresh id is drawn for every incoming record, kept or not.
        let id = ids.next_id();
        let collides = incoming
            .id
            .as_ref()
            .map(|original| existing.contains(original))
            .unwrap_or(false);
        if collides {
            skipped += 1;
            continue;
        }
        next.records.push(incoming.with_id(id));
        imported += 1;
    }

    let summary = ImportSummary {
        mode: ImportMode::Add,
        imported,
        updated: 0,
        skipped,
        total: next.records.len(),
        settings_changed: false,
    };
    (next, summary)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{AppInfo, IncomingRecord, RecordFields, Settings};
    use crate::reconcile::SequentialIds;

    fn fields(datum: &str, beschreibung: &str, betrag: f64) -> RecordFields {
        let date = NaiveDate::parse_from_str(datum, "%Y-%m-%d").unwrap();
        RecordFields::new(date, beschreibung, betrag)
    }

    fn live_record(id: i64, datum: &str, beschreibung: &str, betrag: f64) -> Record {
        Record::new(RecordId::from(id), fields(datum, beschreibung, betrag))
    }

    fn incoming(id: Option<i64>, datum: &str, beschreibung: &str, betrag: f64) -> IncomingRecord {
        IncomingRecord {
            id: id.map(RecordId::from),
            fields: fields(datum, beschreibung, betrag),
        }
    }

    fn snapshot(records: Vec<IncomingRecord>, settings: Option<Settings>) -> Snapshot {
        Snapshot {
            version: "1.0".to_string(),
            export_date: None,
            records,
            settings,
            app_info: AppInfo::default(),
        }
    }

    fn dentist_store() -> StoreState {
        StoreState::new(
            vec![live_record(1, "2024-03-01", "Zahnarzt", 150.00)],
            Settings::new(300.0, 0.0),
        )
    }

    #[test]
    fn test_merge_end_to_end_scenario() {
        let live = dentist_store();
        let snap = snapshot(
            vec![
                incoming(Some(1), "2024-03-01", "Zahnarzt (korrigiert)", 180.00),
                incoming(Some(2), "2024-04-10", "Brille", 220.00),
            ],
            None,
        );

        let (next, summary) =
            reconcile(&live, &snap, ImportMode::Merge, &mut SequentialIds::starting_at(1000));

        assert_eq!(next.records.len(), 2);
        let first = next.find(&RecordId::from(1)).unwrap();
        assert_eq!(first.fields.amount, 180.00);
        assert_eq!(first.fields.description, "Zahnarzt (korrigiert)");
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(next.settings, Settings::new(300.0, 0.0));
        assert_eq!(summary.to_string(), "Data merged: 1 new records, 1 updated");
    }

    #[test]
    fn test_merge_counts_new_and_colliding() {
        let live = StoreState::new(
            (1..=5)
                .map(|i| live_record(i, "2024-01-01", "alt", 10.0))
                .collect(),
            Settings::default(),
        );
        // 3 colliding ids, 4 new ids
        let mut records: Vec<IncomingRecord> = (3..=5)
            .map(|i| incoming(Some(i), "2024-02-01", "neu", 20.0))
            .collect();
        records.extend((10..14).map(|i| incoming(Some(i), "2024-02-01", "neu", 20.0)));

        let (next, summary) = reconcile(
            &live,
            &snapshot(records, None),
            ImportMode::Merge,
            &mut SequentialIds::starting_at(1000),
        );
        assert_eq!(summary.imported, 4);
        assert_eq!(summary.updated, 3);
        assert_eq!(next.records.len(), 5 + 4);
    }

    #[test]
    fn test_merge_assigns_ids_and_merges_settings() {
        let live = dentist_store();
        let snap = snapshot(
            vec![incoming(None, "2024-05-05", "Apotheke", 12.5)],
            Some(Settings {
                deductible_threshold: None,
                reimbursement_threshold: Some(450.0),
            }),
        );
        let (next, summary) =
            reconcile(&live, &snap, ImportMode::Merge, &mut SequentialIds::starting_at(77));

        assert!(next.find(&RecordId::from(77)).is_some());
        assert_eq!(summary.imported, 1);
        assert!(summary.settings_changed);
        assert_eq!(next.settings, Settings::new(300.0, 450.0));
    }

    #[test]
    fn test_replace_discards_live_records_and_settings() {
        let live = dentist_store();
        let snap = snapshot(
            vec![
                incoming(Some(9), "2023-11-11", "Physio", 80.0),
                incoming(None, "2023-12-12", "Labor", 45.0),
            ],
            Some(Settings::new(600.0, 200.0)),
        );
        let (next, summary) =
            reconcile(&live, &snap, ImportMode::Replace, &mut SequentialIds::starting_at(500));

        assert_eq!(next.records.len(), 2);
        assert!(next.find(&RecordId::from(1)).is_none());
        assert!(next.find(&RecordId::from(500)).is_some());
        assert_eq!(next.settings, Settings::new(600.0, 200.0));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.to_string(), "Backup fully restored: 2 records loaded");
    }

    #[test]
    fn test_replace_without_settings_keeps_live_settings() {
        let live = dentist_store();
        let (next, summary) = reconcile(
            &live,
            &snapshot(vec![], None),
            ImportMode::Replace,
            &mut SequentialIds::starting_at(1),
        );
        assert!(next.records.is_empty());
        assert_eq!(next.settings, live.settings);
        assert_eq!(summary.commit_scope(), CommitScope::RecordsOnly);
    }

    #[test]
    fn test_replace_is_idempotent() {
        let snap = snapshot(
            vec![
                incoming(Some(1), "2024-03-01", "Zahnarzt", 150.0),
                incoming(Some(2), "2024-04-10", "Brille", 220.0),
            ],
            Some(Settings::new(300.0, 0.0)),
        );
        let (once, _) = reconcile(
            &dentist_store(),
            &snap,
            ImportMode::Replace,
            &mut SequentialIds::starting_at(1),
        );
        let (twice, _) =
            reconcile(&once, &snap, ImportMode::Replace, &mut SequentialIds::starting_at(1));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_add_skips_colliding_ids_and_reassigns_the_rest() {
        let live = StoreState::new(
            vec![live_record(7, "2024-01-01", "Bestand", 10.0)],
            Settings::new(300.0, 0.0),
        );
        let snap = snapshot(
            vec![
                incoming(Some(7), "2024-01-01", "Duplikat", 10.0),
                incoming(Some(9), "2024-02-02", "Neu", 20.0),
            ],
            Some(Settings::new(999.0, 999.0)),
        );
        let (next, summary) =
            reconcile(&live, &snap, ImportMode::Add, &mut SequentialIds::starting_at(100));

        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(next.records.len(), 2);
        // The incoming id 9 is not reused; a fresh one is drawn per record.
        assert!(next.find(&RecordId::from(9)).is_none());
        let added = next.find(&RecordId::from(101)).unwrap();
        assert_eq!(added.fields.description, "Neu");
        assert_eq!(next.find(&RecordId::from(7)).unwrap().fields.description, "Bestand");
        // Settings are never touched in add mode.
        assert_eq!(next.settings, Settings::new(300.0, 0.0));
        assert_eq!(summary.to_string(), "1 new records added, 1 skipped (already present)");
    }

    #[test]
    fn test_add_keeps_records_without_id() {
        let live = dentist_store();
        let snap = snapshot(vec![incoming(None, "2024-02-02", "Ohne Id", 20.0)], None);
        let (next, summary) =
            reconcile(&live, &snap, ImportMode::Add, &mut SequentialIds::starting_at(100));
        assert_eq!(summary.imported, 1);
        assert_eq!(next.records.len(), 2);
    }

    #[test]
    fn test_add_with_only_duplicates_is_noop() {
        let live = dentist_store();
        let snap = snapshot(vec![incoming(Some(1), "2024-03-01", "Zahnarzt", 150.0)], None);
        let (next, summary) =
            reconcile(&live, &snap, ImportMode::Add, &mut SequentialIds::starting_at(100));
        assert_eq!(next, live);
        assert!(summary.is_noop());
        assert_eq!(
            summary.to_string(),
            "Nothing changed: no new or updated records (1 already present)"
        );
    }
}
