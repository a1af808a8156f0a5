//! Backup snapshot file format.
//!
//! A snapshot is a self-describing JSON bundle of records and settings:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "exportDate": "2024-05-01T08:00:00Z",
//!   "belege": [ { "id": 1, "datum": "2024-03-01", "beschreibung": "Zahnarzt", "betrag": 150.0 } ],
//!   "einstellungen": { "selbstbeteiligung": 300, "beitragsrueckerstattung": 0 },
//!   "appInfo": { "name": "PKV Belege", "version": "1.0" }
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{IncomingRecord, Settings};
use crate::error::ImportError;

/// Snapshot format version written by this build.
pub const FORMAT_VERSION: &str = "1.0";

/// Application name recorded in `appInfo`.
pub const APP_NAME: &str = "PKV Belege";

/// Slug used for backup file names.
pub const APP_SLUG: &str = "pkv-belege";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: APP_NAME.to_string(),
            version: FORMAT_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub version: String,
    #[serde(rename = "exportDate", default)]
    pub export_date: Option<DateTime<Utc>>,
    #[serde(rename = "belege")]
    pub records: Vec<IncomingRecord>,
    #[serde(rename = "einstellungen", default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Settings>,
    #[serde(rename = "appInfo", default)]
    pub app_info: AppInfo,
}

impl Snapshot {
    /// Parse and validate a backup file.
    ///
    /// The shape check runs on the untyped document first so a missing or
    /// non-array `belege` field is reported as such rather than as a generic
    /// decode error. Records are taken as written once their fields decode:
    /// an empty description or a zero amount does not reject the backup.
    pub fn parse(raw: &[u8]) -> Result<Self, ImportError> {
        let value: serde_json::Value = serde_json::from_slice(raw)?;

        let object = value
            .as_object()
            .ok_or_else(|| ImportError::Malformed("backup must be a JSON object".to_string()))?;

        match object.get("belege") {
            Some(serde_json::Value::Array(_)) => {}
            Some(_) => {
                return Err(ImportError::Malformed(
                    "field \"belege\" must be a list".to_string(),
                ))
            }
            None => {
                return Err(ImportError::Malformed(
                    "field \"belege\" is missing".to_string(),
                ))
            }
        }

        let snapshot: Snapshot = serde_json::from_value(value)
            .map_err(|e| ImportError::InvalidField(e.to_string()))?;

        if let Some(ref settings) = snapshot.settings {
            settings.validate().map_err(ImportError::InvalidField)?;
        }

        Ok(snapshot)
    }
}

/// File name for a backup exported on `date`.
pub fn export_filename(date: NaiveDate) -> String {
    format!("{}-backup-{}.json", APP_SLUG, date.format("%Y-%m-%d"))
}
