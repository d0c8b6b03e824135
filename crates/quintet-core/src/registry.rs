//! # Subject Registry
//!
//! Interns atomic values into canonical handles.
//!
//! - Symbol and text subjects share one `Arc<str>` per distinct string
//! - Generated subjects get fresh, never reused ids
//! - Well-known system names are installed at creation
//!
//! The registry owns no facts; the store and the engines only ever see the
//! canonical `Subject` values it hands out.

use crate::vocab;
use crate::{Fact, Operator, Statement, Subject, SubjectId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Persistent part of the registry: generated id counter and labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    pub next_generated: u64,
    pub labels: BTreeMap<SubjectId, String>,
}

/// Canonicalizes subjects and hands out generated identifiers.
#[derive(Debug, Clone)]
pub struct SubjectRegistry {
    symbols: BTreeSet<Arc<str>>,
    texts: BTreeSet<Arc<str>>,
    /// Optional human-readable labels for generated subjects.
    labels: BTreeMap<SubjectId, String>,
    next_generated: u64,
}

impl Default for SubjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubjectRegistry {
    /// Create a registry with the well-known vocabulary installed.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            symbols: BTreeSet::new(),
            texts: BTreeSet::new(),
            labels: BTreeMap::new(),
            next_generated: 0,
        };
        for name in vocab::WELL_KNOWN {
            registry.symbol(name);
        }
        registry
    }

    /// Intern a named subject.
    pub fn symbol(&mut self, name: &str) -> Subject {
        Subject::Symbol(intern(&mut self.symbols, name))
    }

    /// Intern a string literal.
    pub fn text(&mut self, value: &str) -> Subject {
        Subject::Text(intern(&mut self.texts, value))
    }

    /// Look up a symbol without interning it.
    #[must_use]
    pub fn lookup_symbol(&self, name: &str) -> Option<Subject> {
        self.symbols
            .get(name)
            .map(|shared| Subject::Symbol(Arc::clone(shared)))
    }

    /// Hand out a fresh generated subject.
    pub fn generate(&mut self) -> Subject {
        let id = SubjectId(self.next_generated);
        self.next_generated = self.next_generated.saturating_add(1);
        Subject::Generated(id)
    }

    /// Hand out a fresh generated subject carrying a display label.
    pub fn generate_labelled(&mut self, label: impl Into<String>) -> Subject {
        let subject = self.generate();
        if let Subject::Generated(id) = &subject {
            self.labels.insert(*id, label.into());
        }
        subject
    }

    /// Display label of a generated subject.
    #[must_use]
    pub fn label(&self, id: SubjectId) -> Option<&str> {
        self.labels.get(&id).map(String::as_str)
    }

    /// Replace a subject with its canonical handle.
    ///
    /// Generated ids seen here (for example while replaying a journal) move
    /// the counter past them so later `generate` calls never collide.
    pub fn canonicalize(&mut self, subject: Subject) -> Subject {
        match subject {
            Subject::Symbol(name) => self.symbol(&name),
            Subject::Text(value) => self.text(&value),
            Subject::Generated(id) => {
                if id.0 >= self.next_generated {
                    self.next_generated = id.0.saturating_add(1);
                }
                Subject::Generated(id)
            }
            literal => literal,
        }
    }

    /// Canonicalize every subject inside a value.
    pub fn canonicalize_value(&mut self, value: Value) -> Value {
        match value {
            Value::Subject(subject) => Value::Subject(self.canonicalize(subject)),
            Value::Path { subject, property } => Value::Path {
                subject: self.canonicalize(subject),
                property: self.canonicalize(property),
            },
            Value::Evaluate(subject) => Value::Evaluate(self.canonicalize(subject)),
            other => other,
        }
    }

    fn canonicalize_operator(&mut self, operator: Operator) -> Operator {
        match operator {
            Operator::Predicate(name) => Operator::Predicate(self.canonicalize(name)),
            other => other,
        }
    }

    fn canonicalize_meta(&mut self, meta: BTreeSet<Subject>) -> BTreeSet<Subject> {
        meta.into_iter().map(|tag| self.canonicalize(tag)).collect()
    }

    /// Canonicalize every subject of a statement before it is appended.
    pub fn canonicalize_statement(&mut self, statement: Statement) -> Statement {
        Statement {
            target: self.canonicalize(statement.target),
            property: self.canonicalize(statement.property),
            operator: self.canonicalize_operator(statement.operator),
            value: self.canonicalize_value(statement.value),
            meta: self.canonicalize_meta(statement.meta),
            slot: statement.slot,
        }
    }

    /// Canonicalize a fact loaded from a snapshot or journal.
    pub fn canonicalize_fact(&mut self, fact: Fact) -> Fact {
        Fact {
            target: self.canonicalize(fact.target),
            property: self.canonicalize(fact.property),
            operator: self.canonicalize_operator(fact.operator),
            value: self.canonicalize_value(fact.value),
            meta: self.canonicalize_meta(fact.meta),
            ..fact
        }
    }

    /// Check whether a name belongs to the installed vocabulary.
    #[must_use]
    pub fn is_well_known(name: &str) -> bool {
        vocab::WELL_KNOWN.contains(&name)
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn text_count(&self) -> usize {
        self.texts.len()
    }

    #[must_use]
    pub fn generated_count(&self) -> u64 {
        self.next_generated
    }

    /// Export the persistent part of the registry.
    #[must_use]
    pub fn state(&self) -> RegistryState {
        RegistryState {
            next_generated: self.next_generated,
            labels: self.labels.clone(),
        }
    }

    /// Restore a previously exported state on top of the current one.
    pub fn restore(&mut self, state: RegistryState) {
        self.next_generated = self.next_generated.max(state.next_generated);
        self.labels.extend(state.labels);
    }
}

fn intern(set: &mut BTreeSet<Arc<str>>, value: &str) -> Arc<str> {
    if let Some(existing) = set.get(value) {
        return Arc::clone(existing);
    }
    let shared: Arc<str> = Arc::from(value);
    set.insert(Arc::clone(&shared));
    shared
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_vocabulary_is_installed() {
        let registry = SubjectRegistry::new();
        for name in vocab::WELL_KNOWN {
            assert!(registry.lookup_symbol(name).is_some(), "{name} missing");
        }
        assert_eq!(registry.symbol_count(), vocab::WELL_KNOWN.len());
    }

    #[test]
    fn interning_shares_storage() {
        let mut registry = SubjectRegistry::new();
        let a = registry.symbol("person1");
        let b = registry.symbol("person1");
        assert_eq!(a, b);
        match (&a, &b) {
            (Subject::Symbol(x), Subject::Symbol(y)) => assert!(Arc::ptr_eq(x, y)),
            _ => panic!("expected symbols"),
        }
    }

    #[test]
    fn symbols_and_texts_are_distinct() {
        let mut registry = SubjectRegistry::new();
        let symbol = registry.symbol("name");
        let text = registry.text("name");
        assert_ne!(symbol, text);
        assert_eq!(registry.text_count(), 1);
    }

    #[test]
    fn generated_subjects_are_unique() {
        let mut registry = SubjectRegistry::new();
        let a = registry.generate();
        let b = registry.generate();
        assert_ne!(a, b);
        assert_eq!(registry.generated_count(), 2);
    }

    #[test]
    fn canonicalize_advances_past_observed_ids() {
        let mut registry = SubjectRegistry::new();
        registry.canonicalize(Subject::Generated(SubjectId(41)));
        let fresh = registry.generate();
        assert_eq!(fresh, Subject::Generated(SubjectId(42)));
    }

    #[test]
    fn labels_survive_state_roundtrip() {
        let mut registry = SubjectRegistry::new();
        let subject = registry.generate_labelled("button");
        let state = registry.state();

        let mut restored = SubjectRegistry::new();
        restored.restore(state);
        if let Subject::Generated(id) = subject {
            assert_eq!(restored.label(id), Some("button"));
        }
        assert_eq!(restored.generated_count(), 1);
    }
}
