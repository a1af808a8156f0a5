use chrono::{NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use super::kv::{KeyValueStore, KEY_RECORDS, KEY_SETTINGS};
use crate::error::StoreError;
use crate::models::{Record, RecordFields, RecordId, Settings};
use crate::reconcile::IdGenerator;

/// The complete persisted state: every record plus the settings object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreState {
    pub records: Vec<Record>,
    pub settings: Settings,
}

impl StoreState {
    pub fn new(records: Vec<Record>, settings: Settings) -> Self {
        Self { records, settings }
    }

    pub fn find(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    fn position(&self, id: &RecordId) -> Option<usize> {
        self.records.iter().position(|r| &r.id == id)
    }
}

/// What a commit writes back to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitScope {
    RecordsOnly,
    RecordsAndSettings,
}

/// Canonical collection of records and settings.
///
/// All mutation goes through `&mut self`, so a store has exactly one writer
/// at a time. Every mutating call persists before it returns; if persisting
/// fails the in-memory state is left as it was.
pub struct RecordStore<K: KeyValueStore> {
    kv: K,
    state: StoreState,
}

impl<K: KeyValueStore> RecordStore<K> {
    /// Load the store from durable storage. Missing keys mean an empty store.
    pub fn load(kv: K) -> Result<Self, StoreError> {
        let records: Vec<Record> = Self::read_key(&kv, KEY_RECORDS)?.unwrap_or_default();
        let settings: Settings = Self::read_key(&kv, KEY_SETTINGS)?.unwrap_or_default();
        debug!(records = records.len(), "Record store loaded");
        Ok(Self {
            kv,
            state: StoreState::new(records, settings),
        })
    }

    fn read_key<T: DeserializeOwned>(kv: &K, key: &str) -> Result<Option<T>, StoreError> {
        match kv.get(key)? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
        serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })
    }

    pub fn state(&self) -> &StoreState {
        &self.state
    }

    pub fn records(&self) -> &[Record] {
        &self.state.records
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Records dated in `year`, newest first.
    pub fn records_for_year(&self, year: i32) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .state
            .records
            .iter()
            .filter(|r| r.year() == year)
            .collect();
        records.sort_by(|a, b| b.fields.date.cmp(&a.fields.date));
        records
    }

    /// Persist `next` and make it the current state.
    pub fn commit(&mut self, next: StoreState, scope: CommitScope) -> Result<(), StoreError> {
        let mut batch = vec![(KEY_RECORDS, Self::encode(KEY_RECORDS, &next.records)?)];
        if scope == CommitScope::RecordsAndSettings {
            batch.push((KEY_SETTINGS, Self::encode(KEY_SETTINGS, &next.settings)?));
        }
        self.kv.set_many(&batch)?;

        let settings = match scope {
            CommitScope::RecordsAndSettings => next.settings,
            CommitScope::RecordsOnly => std::mem::take(&mut self.state.settings),
        };
        self.state = StoreState::new(next.records, settings);
        Ok(())
    }

    pub fn add_record(
        &mut self,
        date: NaiveDate,
        description: &str,
        amount: f64,
        ids: &mut dyn IdGenerator,
    ) -> Result<RecordId, StoreError> {
        let mut fields = RecordFields::new(date, description.trim(), amount);
        fields.validate().map_err(StoreError::InvalidRecord)?;
        fields.captured_at = Some(Utc::now());

        let mut next = self.state.clone();
        let id = ids.next_id();
        // A colliding id replaces rather than duplicates.
        match next.position(&id) {
            Some(index) => next.records[index] = Record::new(id.clone(), fields),
            None => next.records.push(Record::new(id.clone(), fields)),
        }
        self.commit(next, CommitScope::RecordsOnly)?;
        info!(id = %id, "Record added");
        Ok(id)
    }

    pub fn update_record(
        &mut self,
        id: &RecordId,
        date: NaiveDate,
        description: &str,
        amount: f64,
    ) -> Result<(), StoreError> {
        let mut next = self.state.clone();
        let index = next
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let fields = &mut next.records[index].fields;
        fields.date = date;
        fields.description = description.trim().to_string();
        fields.amount = amount;
        fields.validate().map_err(StoreError::InvalidRecord)?;

        self.commit(next, CommitScope::RecordsOnly)?;
        info!(id = %id, "Record updated");
        Ok(())
    }

    pub fn delete_record(&mut self, id: &RecordId) -> Result<(), StoreError> {
        let mut next = self.state.clone();
        let index = next
            .position(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        next.records.remove(index);
        self.commit(next, CommitScope::RecordsOnly)?;
        info!(id = %id, "Record deleted");
        Ok(())
    }

    pub fn update_settings(&mut self, settings: Settings) -> Result<(), StoreError> {
        settings.validate().map_err(StoreError::InvalidSettings)?;
        let next = StoreState::new(self.state.records.clone(), settings);
        self.commit(next, CommitScope::RecordsAndSettings)
    }
}
