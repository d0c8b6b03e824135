//! # Session Module
//!
//! An engine paired with its storage backend.
//!
//! ## Storage Backends
//!
//! - `InMemory`: the log lives only in the engine (volatile unless saved
//!   through `formats`)
//! - `Persistent`: a `RedbJournal` replayed on open and appended to after
//!   every write
//!
//! Reads go straight to the engine. Writes go through the session so the
//! journal never falls behind the store.

use crate::compute::HostFunction;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::storage::RedbJournal;
use crate::trigger::{Firing, SubscriptionSpec};
use crate::{FactId, QuintetError, Statement, Subject, SubscriptionId, Value};
use std::path::Path;
use tracing::warn;

/// Storage backend for a session.
#[derive(Debug, Default)]
pub enum StorageBackend {
    /// Nothing beyond the in-memory log.
    #[default]
    InMemory,
    /// Disk-backed journal using redb.
    Persistent(RedbJournal),
}

#[derive(Debug, Default)]
pub struct Session {
    engine: Engine,
    backend: StorageBackend,
}

impl Session {
    /// Create an empty in-memory session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_engine(engine: Engine) -> Self {
        Self {
            engine,
            backend: StorageBackend::InMemory,
        }
    }

    /// Open (or create) a journal and replay it.
    pub fn with_redb(path: impl AsRef<Path>, config: EngineConfig) -> Result<Self, QuintetError> {
        let journal = RedbJournal::open(path)?;
        let (facts, state) = journal.load()?;
        let engine = Engine::replay(facts, state, config)?;
        Ok(Self {
            engine,
            backend: StorageBackend::Persistent(journal),
        })
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Give up the session, keeping the engine.
    #[must_use]
    pub fn into_engine(self) -> Engine {
        self.engine
    }

    /// Journal every fact the store holds beyond the journal.
    pub fn sync(&mut self) -> Result<(), QuintetError> {
        let StorageBackend::Persistent(journal) = &mut self.backend else {
            return Ok(());
        };
        let pending = self.engine.store().facts_since(FactId(journal.len()));
        if pending.is_empty() {
            return Ok(());
        }
        journal.append(pending, &self.engine.registry().state())
    }

    /// Run a write against the engine, then sync.
    ///
    /// The journal is synced even when the write fails: a rejected batch
    /// may already have appended the statements before it.
    pub fn update<T>(
        &mut self,
        write: impl FnOnce(&mut Engine) -> Result<T, QuintetError>,
    ) -> Result<T, QuintetError> {
        let result = write(&mut self.engine);
        if let Err(error) = self.sync() {
            warn!(%error, "journal sync failed");
            return Err(error);
        }
        result
    }

    pub fn assert(&mut self, statement: Statement) -> Result<FactId, QuintetError> {
        self.update(|engine| engine.assert(statement))
    }

    pub fn assert_batch(&mut self, statements: Vec<Statement>) -> Result<Vec<FactId>, QuintetError> {
        self.update(|engine| engine.assert_batch(statements))
    }

    pub fn retract(
        &mut self,
        target: Subject,
        property: Subject,
        value: impl Into<Value>,
    ) -> Result<FactId, QuintetError> {
        self.update(|engine| engine.retract(target, property, value))
    }

    pub fn subscribe(&mut self, spec: SubscriptionSpec) -> Result<SubscriptionId, QuintetError> {
        self.update(|engine| engine.subscribe(spec))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), QuintetError> {
        self.engine.unsubscribe(id)
    }

    pub fn tick(&mut self, now_ms: u64) -> Result<usize, QuintetError> {
        self.update(|engine| engine.tick(now_ms))
    }

    pub fn take_firings(&mut self) -> Vec<Firing> {
        self.engine.take_firings()
    }

    pub fn generate_labelled(&mut self, label: impl Into<String>) -> Subject {
        self.engine.generate_labelled(label)
    }

    pub fn register_host(&mut self, name: impl Into<String>, function: impl HostFunction + 'static) {
        self.engine.register_host(name, function);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{Mutation, Term};
    use crate::{QueryMode, ReadOptions};

    fn sym(name: &str) -> Subject {
        Subject::symbol(name)
    }

    #[test]
    fn in_memory_session_is_not_persistent() {
        let mut session = Session::new();
        assert!(!session.is_persistent());
        session
            .assert(Statement::assign(sym("a"), sym("p"), Subject::int(1)))
            .expect("assert");
        assert_eq!(session.engine().status().facts, 1);
    }

    #[test]
    fn persistent_session_replays_the_journal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("facts.redb");
        {
            let mut session = Session::with_redb(&path, EngineConfig::default()).expect("open");
            assert!(session.is_persistent());
            session
                .assert(Statement::assign(sym("a"), sym("p"), Subject::int(1)))
                .expect("assert");
            session
                .assert(Statement::assign(sym("a"), sym("p"), Subject::int(2)))
                .expect("assert");
        }

        let session = Session::with_redb(&path, EngineConfig::default()).expect("reopen");
        let facts = session
            .engine()
            .query(&sym("a"), QueryMode::Literal, ReadOptions::new())
            .expect("literal");
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value(), Some(&Subject::int(2)));
    }

    #[test]
    fn trigger_output_is_journaled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("facts.redb");
        {
            let mut session = Session::with_redb(&path, EngineConfig::default()).expect("open");
            session
                .assert(Statement::require(sym("q"), sym("status"), sym("new")))
                .expect("query");
            session
                .subscribe(SubscriptionSpec::truthy(
                    sym("q"),
                    vec![Mutation::assign(Term::this(), "seen", Subject::bool(true))],
                ))
                .expect("subscribe");
            session
                .assert(Statement::assign(sym("x"), sym("status"), sym("new")))
                .expect("assert");
        }

        let session = Session::with_redb(&path, EngineConfig::default()).expect("reopen");
        assert_eq!(session.engine().status().facts, 3);
        assert_eq!(session.engine().triggers().len(), 0);
    }
}
