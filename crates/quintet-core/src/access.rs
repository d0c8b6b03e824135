//! # Metadata & Access Filter
//!
//! Resolves the meta-set attached to each fact.
//!
//! - Access entries (`system::meta::type = access`,
//!   `system::meta::denial = hidden`) restrict a fact to the identities
//!   listed under `system::meta::user`
//! - Temporal tags (`#NOW`, `#SNAPSHOT`) turn a computed assignment into a
//!   frozen literal
//! - `#ALL` marks array semantics
//!
//! Denial is silent: an invisible fact is simply absent from results.

use crate::store::Snapshot;
use crate::vocab;
use crate::{Fact, ReadOptions, Subject};
use std::collections::BTreeSet;

/// How a computed assignment is bound to its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalBinding {
    /// Recomputed on every read.
    Virtual,
    /// `#NOW`: computed once against the live store at append time.
    Now,
    /// `#SNAPSHOT`: computed once against the snapshot the creating batch
    /// started from.
    Snapshot,
}

/// Stateless visibility and meta decisions.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccessFilter;

impl AccessFilter {
    /// Check whether `reader` may see `fact`.
    ///
    /// A fact is hidden only by a meta entry that declares both the access
    /// type and the hidden denial; such an entry admits exactly the
    /// identities listed under `system::meta::user`. Facts without access
    /// meta are visible to everyone.
    #[must_use]
    pub fn is_visible(snapshot: &Snapshot<'_>, fact: &Fact, reader: Option<&Subject>) -> bool {
        fact.meta.iter().all(|entry| {
            Self::allowed_readers(snapshot, entry)
                .is_none_or(|allowed| reader.is_some_and(|reader| allowed.contains(reader)))
        })
    }

    /// Visibility under full read options. `#FORCE` bypasses the filter.
    #[must_use]
    pub fn visible_with(snapshot: &Snapshot<'_>, fact: &Fact, options: &ReadOptions) -> bool {
        options.force || Self::is_visible(snapshot, fact, options.reader.as_ref())
    }

    /// The identities an access entry admits, or `None` when the entry does
    /// not restrict access.
    #[must_use]
    pub fn allowed_readers(snapshot: &Snapshot<'_>, entry: &Subject) -> Option<BTreeSet<Subject>> {
        if !entry.is_reference() {
            return None;
        }
        let meta_type = Subject::symbol(vocab::META_TYPE);
        let denial = Subject::symbol(vocab::META_DENIAL);
        let is_access = snapshot
            .constant(entry, &meta_type)
            .is_some_and(|value| value.is_symbol(vocab::ACCESS));
        let is_hidden = snapshot
            .constant(entry, &denial)
            .is_some_and(|value| value.is_symbol(vocab::HIDDEN));
        if !(is_access && is_hidden) {
            return None;
        }
        let users = Subject::symbol(vocab::META_USER);
        Some(
            snapshot
                .constants(entry, &users)
                .into_iter()
                .cloned()
                .collect(),
        )
    }

    /// Temporal binding requested by a meta-set. `#SNAPSHOT` wins over `#NOW`.
    #[must_use]
    pub fn temporal_binding(meta: &BTreeSet<Subject>) -> TemporalBinding {
        if meta.iter().any(|tag| tag.is_symbol(vocab::SNAPSHOT)) {
            TemporalBinding::Snapshot
        } else if meta.iter().any(|tag| tag.is_symbol(vocab::NOW)) {
            TemporalBinding::Now
        } else {
            TemporalBinding::Virtual
        }
    }

    /// `#ALL` array semantics.
    #[must_use]
    pub fn is_array(meta: &BTreeSet<Subject>) -> bool {
        meta.iter().any(|tag| tag.is_symbol(vocab::ALL))
    }

    /// Literal reads skip `system::` properties unless asked for them.
    #[must_use]
    pub fn shows_property(fact: &Fact, options: &ReadOptions) -> bool {
        options.include_system_meta || !fact.property.is_system()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FactStore;
    use crate::{Statement, Value};

    fn sym(name: &str) -> Subject {
        Subject::symbol(name)
    }

    fn hidden_entry(store: &mut FactStore, entry: &str, users: &[&str]) {
        store.append(Statement::assign(
            sym(entry),
            sym(vocab::META_TYPE),
            sym(vocab::ACCESS),
        ));
        store.append(Statement::assign(
            sym(entry),
            sym(vocab::META_DENIAL),
            sym(vocab::HIDDEN),
        ));
        for user in users {
            store.append(
                Statement::assign(sym(entry), sym(vocab::META_USER), sym(user)).tagged(vocab::ALL),
            );
        }
    }

    fn secret(store: &mut FactStore, entry: &str) -> Fact {
        let id = store.append(
            Statement::assign(sym("vault"), sym("code"), Subject::int(1234)).with_meta(sym(entry)),
        );
        store.get(id).cloned().expect("fact")
    }

    #[test]
    fn facts_without_access_meta_are_public() {
        let mut store = FactStore::new();
        let id = store.append(Statement::assign(sym("a"), sym("p"), Subject::int(1)));
        let fact = store.get(id).cloned().expect("fact");
        assert!(AccessFilter::is_visible(&store.snapshot(), &fact, None));
    }

    #[test]
    fn hidden_facts_admit_only_listed_users() {
        let mut store = FactStore::new();
        hidden_entry(&mut store, "denyOthers", &["person1", "person2"]);
        let fact = secret(&mut store, "denyOthers");
        let snapshot = store.snapshot();

        assert!(AccessFilter::is_visible(&snapshot, &fact, Some(&sym("person1"))));
        assert!(AccessFilter::is_visible(&snapshot, &fact, Some(&sym("person2"))));
        assert!(!AccessFilter::is_visible(&snapshot, &fact, Some(&sym("person3"))));
        assert!(!AccessFilter::is_visible(&snapshot, &fact, None));
    }

    #[test]
    fn force_bypasses_denial() {
        let mut store = FactStore::new();
        hidden_entry(&mut store, "deny", &["person1"]);
        let fact = secret(&mut store, "deny");
        let options = ReadOptions::new().as_reader(sym("person3")).forced();
        assert!(AccessFilter::visible_with(&store.snapshot(), &fact, &options));
    }

    #[test]
    fn access_type_without_hidden_denial_does_not_restrict() {
        let mut store = FactStore::new();
        store.append(Statement::assign(
            sym("loose"),
            sym(vocab::META_TYPE),
            sym(vocab::ACCESS),
        ));
        let fact = secret(&mut store, "loose");
        assert!(AccessFilter::is_visible(&store.snapshot(), &fact, None));
    }

    #[test]
    fn temporal_tags_are_recognised() {
        let mut meta = BTreeSet::new();
        assert_eq!(AccessFilter::temporal_binding(&meta), TemporalBinding::Virtual);
        meta.insert(sym(vocab::NOW));
        assert_eq!(AccessFilter::temporal_binding(&meta), TemporalBinding::Now);
        meta.insert(sym(vocab::SNAPSHOT));
        assert_eq!(AccessFilter::temporal_binding(&meta), TemporalBinding::Snapshot);
    }

    #[test]
    fn system_properties_hidden_from_literal_reads_by_default() {
        let mut store = FactStore::new();
        let id = store.append(Statement::assign(
            sym("calc"),
            sym(vocab::OPERATION),
            Value::Subject(sym(vocab::SUM)),
        ));
        let fact = store.get(id).cloned().expect("fact");
        assert!(!AccessFilter::shows_property(&fact, &ReadOptions::new()));
        assert!(AccessFilter::shows_property(
            &fact,
            &ReadOptions::new().with_system_meta()
        ));
    }
}
