//! Backup reconciliation.
//!
//! `reconcile` merges an imported `Snapshot` into the live `StoreState`
//! under one of three `ImportMode`s and reports what happened. It performs
//! no I/O; `backup::import_backup` wraps it with parsing and persistence.

pub mod engine;
pub mod ids;

pub use engine::{reconcile, ImportMode, ImportSummary};
pub use ids::{ClockIdGenerator, IdGenerator, SequentialIds};
