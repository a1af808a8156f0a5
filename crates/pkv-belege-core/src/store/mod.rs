//! Durable record storage.
//!
//! - `KeyValueStore`: opaque string keys, file-backed or in-memory
//! - `RecordStore`: the canonical record collection and settings
//! - `YearOverview`: per-year totals against the configured thresholds

pub mod kv;
pub mod overview;
pub mod records;

pub use kv::{FileKvStore, KeyValueStore, MemoryKvStore};
pub use overview::{SubmissionStatus, YearOverview};
pub use records::{CommitScope, RecordStore, StoreState};
