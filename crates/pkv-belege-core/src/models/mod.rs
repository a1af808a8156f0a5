//! Data models for PKV Belege.
//!
//! - `Record`, `IncomingRecord`, `RecordId`: receipts kept for reimbursement
//! - `Settings`: the two thresholds that decide whether submitting pays off
//! - `Snapshot`: the backup file format

pub mod record;
pub mod settings;
pub mod snapshot;

pub use record::{IncomingRecord, Record, RecordFields, RecordId};
pub use settings::Settings;
pub use snapshot::{export_filename, AppInfo, Snapshot, APP_NAME, APP_SLUG, FORMAT_VERSION};
