//! # Storage
//!
//! Disk-backed persistence of the fact log.

pub mod redb_journal;

pub use redb_journal::RedbJournal;
