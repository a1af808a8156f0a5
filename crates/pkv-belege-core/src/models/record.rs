//! Receipt records ("Belege") as stored and exchanged in backups.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier of a record.
///
/// Older installations produced fractional ids (timestamp plus a random
/// fraction), newer ones produce integers. The id is kept in its canonical
/// decimal text form so both compare exactly and survive a round trip.
///
/// Whether the id arrived as a JSON number or a string is not kept: `"7"`
/// and `7` are the same record. Ids typed on the command line are text and
/// must find records stored with numeric ids. A numeric string is written
/// back as a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids that older versions of the app treated as "no id at all".
    pub fn is_blank(&self) -> bool {
        self.0.is_empty() || self.0.parse::<f64>().map(|v| v == 0.0).unwrap_or(false)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.trim().to_string())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Ok(int) = self.0.parse::<i64>() {
            serializer.serialize_i64(int)
        } else if let Some(float) = self.0.parse::<f64>().ok().filter(|f| f.is_finite()) {
            serializer.serialize_f64(float)
        } else {
            serializer.serialize_str(&self.0)
        }
    }
}

struct RecordIdVisitor;

impl<'de> Visitor<'de> for RecordIdVisitor {
    type Value = RecordId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a numeric or string record id")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(RecordId(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(RecordId(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() {
            return Err(E::custom("record id must be finite"));
        }
        Ok(RecordId(v.to_string()))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(RecordId::from(v))
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RecordIdVisitor)
    }
}

/// Everything about a record except its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    #[serde(rename = "datum")]
    pub date: NaiveDate,
    #[serde(rename = "beschreibung")]
    pub description: String,
    /// Signed amount in EUR.
    #[serde(rename = "betrag")]
    pub amount: f64,
    /// When the record was first captured on this device.
    #[serde(rename = "erfasst", default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
    /// Fields written by other versions of the app, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RecordFields {
    pub fn new(date: NaiveDate, description: impl Into<String>, amount: f64) -> Self {
        Self {
            date,
            description: description.into(),
            amount,
            captured_at: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Check what a record must satisfy before it enters the store.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description must not be empty".to_string());
        }
        if !self.amount.is_finite() {
            return Err("amount must be a finite number".to_string());
        }
        if self.amount == 0.0 {
            return Err("amount must not be zero".to_string());
        }
        Ok(())
    }
}

/// A record held by the record store. The id is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: RecordFields,
}

impl Record {
    pub fn new(id: RecordId, fields: RecordFields) -> Self {
        Self { id, fields }
    }

    pub fn year(&self) -> i32 {
        self.fields.date.year()
    }
}

/// A record as found in a backup file, where the id may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(flatten)]
    pub fields: RecordFields,
}

impl IncomingRecord {
    /// The id carried by the backup, if it is a usable one.
    pub fn usable_id(&self) -> Option<&RecordId> {
        self.id.as_ref().filter(|id| !id.is_blank())
    }

    pub fn with_id(&self, id: RecordId) -> Record {
        Record::new(id, self.fields.clone())
    }
}

impl From<Record> for IncomingRecord {
    fn from(record: Record) -> Self {
        Self {
            id: Some(record.id),
            fields: record.fields,
        }
    }
}
