//! # redb Fact Journal
//!
//! The append-only fact log persisted in a redb database.
//!
//! The in-memory `FactStore` remains the read path; the journal only
//! receives each committed fact once and replays the whole log on open.
//!
//! | Table      | Key         | Value                          |
//! |------------|-------------|--------------------------------|
//! | `facts`    | `FactId`    | postcard-encoded `Fact`        |
//! | `metadata` | `"registry"`| postcard-encoded registry state|

use crate::registry::RegistryState;
use crate::{Fact, QuintetError};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use tracing::debug;

/// Table for facts: FactId(u64) -> serialized Fact bytes
const FACTS: TableDefinition<u64, &[u8]> = TableDefinition::new("facts");

/// Table for metadata: key string -> serialized value bytes
const METADATA: TableDefinition<&str, &[u8]> = TableDefinition::new("metadata");

const REGISTRY_KEY: &str = "registry";

fn io_error(error: impl std::fmt::Display) -> QuintetError {
    QuintetError::IoError(error.to_string())
}

/// A redb-backed journal of the fact log.
pub struct RedbJournal {
    db: Database,
    /// Number of facts already journaled.
    len: u64,
}

impl std::fmt::Debug for RedbJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbJournal")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl RedbJournal {
    /// Open or create a journal at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QuintetError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        {
            let write_txn = db.begin_write().map_err(io_error)?;
            let _ = write_txn.open_table(FACTS).map_err(io_error)?;
            let _ = write_txn.open_table(METADATA).map_err(io_error)?;
            write_txn.commit().map_err(io_error)?;
        }

        let len = {
            let read_txn = db.begin_read().map_err(io_error)?;
            let table = read_txn.open_table(FACTS).map_err(io_error)?;
            table.len().map_err(io_error)?
        };
        debug!(facts = len, "journal opened");
        Ok(Self { db, len })
    }

    /// Number of journaled facts.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the whole log in id order plus the saved registry state.
    pub fn load(&self) -> Result<(Vec<Fact>, RegistryState), QuintetError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;

        let facts = {
            let table = read_txn.open_table(FACTS).map_err(io_error)?;
            let mut facts = Vec::with_capacity(self.len as usize);
            for entry in table.iter().map_err(io_error)? {
                let (_, value) = entry.map_err(io_error)?;
                let fact: Fact = postcard::from_bytes(value.value()).map_err(|e| {
                    QuintetError::DeserializationError(format!("Corrupt journal entry: {e}"))
                })?;
                facts.push(fact);
            }
            facts
        };

        let state = {
            let table = read_txn.open_table(METADATA).map_err(io_error)?;
            match table.get(REGISTRY_KEY).map_err(io_error)? {
                Some(bytes) => postcard::from_bytes(bytes.value()).map_err(|e| {
                    QuintetError::DeserializationError(format!("Corrupt registry state: {e}"))
                })?,
                None => RegistryState::default(),
            }
        };
        Ok((facts, state))
    }

    /// Journal newly committed facts and the current registry state in one
    /// transaction.
    ///
    /// Facts must continue the journal: the first id equals `len()`.
    pub fn append(&mut self, facts: &[Fact], state: &RegistryState) -> Result<(), QuintetError> {
        if let Some(first) = facts.first()
            && first.id.0 != self.len
        {
            return Err(QuintetError::IoError(format!(
                "Journal gap: next fact is {} but journal holds {}",
                first.id.0, self.len
            )));
        }

        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut facts_table = write_txn.open_table(FACTS).map_err(io_error)?;
            for fact in facts {
                let bytes = postcard::to_allocvec(fact)
                    .map_err(|e| QuintetError::SerializationError(e.to_string()))?;
                facts_table
                    .insert(fact.id.0, bytes.as_slice())
                    .map_err(io_error)?;
            }
            let mut meta_table = write_txn.open_table(METADATA).map_err(io_error)?;
            let bytes = postcard::to_allocvec(state)
                .map_err(|e| QuintetError::SerializationError(e.to_string()))?;
            meta_table
                .insert(REGISTRY_KEY, bytes.as_slice())
                .map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        self.len = self.len.saturating_add(facts.len() as u64);
        debug!(appended = facts.len(), total = self.len, "journal synced");
        Ok(())
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), QuintetError> {
        self.db.compact().map_err(io_error)?;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FactStore;
    use crate::{Statement, Subject};

    fn store_with(n: i64) -> FactStore {
        let mut store = FactStore::new();
        for i in 0..n {
            store.append(Statement::assign(
                Subject::symbol("a"),
                Subject::symbol("p"),
                Subject::int(i),
            ));
        }
        store
    }

    #[test]
    fn appended_facts_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("journal.redb");
        let store = store_with(3);
        let state = RegistryState {
            next_generated: 7,
            ..RegistryState::default()
        };
        {
            let mut journal = RedbJournal::open(&path).expect("open");
            journal.append(store.facts(), &state).expect("append");
            assert_eq!(journal.len(), 3);
        }

        let journal = RedbJournal::open(&path).expect("reopen");
        assert_eq!(journal.len(), 3);
        let (facts, loaded) = journal.load().expect("load");
        assert_eq!(facts, store.facts());
        assert_eq!(loaded.next_generated, 7);
    }

    #[test]
    fn gaps_are_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut journal = RedbJournal::open(dir.path().join("j.redb")).expect("open");
        let store = store_with(2);
        let result = journal.append(&store.facts()[1..], &RegistryState::default());
        assert!(result.is_err());
        assert!(journal.is_empty());
    }
}
