//! # Fact Store
//!
//! The append-only, timestamped fact log.
//!
//! Facts are indexed by target, by property and by (target, property).
//! The log itself is the time index: `FactId` equals the position and
//! `created_at` grows by one per append.
//!
//! Reads go through a `Snapshot`, which fixes the logical time so that a
//! query never observes a partially appended batch.

use crate::{Fact, FactId, Operator, QuintetError, Statement, Subject, Timestamp, Value};
use std::collections::{BTreeMap, VecDeque};

// =============================================================================
// CHANGE EVENTS
// =============================================================================

/// Published for every appended fact; consumed by the trigger engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub fact: FactId,
    pub target: Subject,
    pub property: Subject,
    pub operator: Operator,
    pub value: Value,
}

// =============================================================================
// FACT STORE
// =============================================================================

/// The append-only log with its indices.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct FactStore {
    facts: Vec<Fact>,
    by_target: BTreeMap<Subject, Vec<FactId>>,
    by_property: BTreeMap<Subject, Vec<FactId>>,
    by_pair: BTreeMap<(Subject, Subject), Vec<FactId>>,
    /// Outbox of change events not yet drained by the trigger engine.
    events: VecDeque<ChangeEvent>,
}

impl FactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Logical time of the newest fact.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        Timestamp(self.facts.len() as u64)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.facts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Append a statement and publish its change event.
    ///
    /// This is the only write path; callers serialize access to it.
    pub fn append(&mut self, statement: Statement) -> FactId {
        let id = FactId(self.facts.len() as u64);
        let created_at = self.now().next();
        let fact = Fact {
            id,
            target: statement.target,
            property: statement.property,
            operator: statement.operator,
            value: statement.value,
            meta: statement.meta,
            slot: statement.slot,
            created_at,
        };
        self.events.push_back(ChangeEvent {
            fact: id,
            target: fact.target.clone(),
            property: fact.property.clone(),
            operator: fact.operator.clone(),
            value: fact.value.clone(),
        });
        self.index(fact);
        id
    }

    /// Re-insert a fact loaded from a snapshot or journal.
    ///
    /// Replayed facts publish no events. Ids and timestamps must continue
    /// the log exactly.
    pub fn replay(&mut self, fact: Fact) -> Result<(), QuintetError> {
        let expected = FactId(self.facts.len() as u64);
        if fact.id != expected || fact.created_at != self.now().next() {
            return Err(QuintetError::DeserializationError(format!(
                "Fact log out of order: got {:?} at {:?}, expected {:?}",
                fact.id, fact.created_at, expected
            )));
        }
        self.index(fact);
        Ok(())
    }

    fn index(&mut self, fact: Fact) {
        self.by_target
            .entry(fact.target.clone())
            .or_default()
            .push(fact.id);
        self.by_property
            .entry(fact.property.clone())
            .or_default()
            .push(fact.id);
        self.by_pair
            .entry((fact.target.clone(), fact.property.clone()))
            .or_default()
            .push(fact.id);
        self.facts.push(fact);
    }

    /// Get a fact by id, live or not.
    #[must_use]
    pub fn get(&self, id: FactId) -> Option<&Fact> {
        usize::try_from(id.0).ok().and_then(|i| self.facts.get(i))
    }

    /// The whole log in assertion order.
    #[must_use]
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    /// Facts appended at or after `id`.
    #[must_use]
    pub fn facts_since(&self, id: FactId) -> &[Fact] {
        let start = usize::try_from(id.0)
            .unwrap_or(usize::MAX)
            .min(self.facts.len());
        &self.facts[start..]
    }

    /// Drain the change-event outbox.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        self.events.drain(..).collect()
    }

    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Number of distinct targets.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.by_target.len()
    }

    /// Number of distinct properties.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.by_property.len()
    }

    /// Read view at the current time.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            store: self,
            as_of: self.now(),
        }
    }

    /// Read view at an earlier time. Future timestamps clamp to now.
    #[must_use]
    pub fn snapshot_at(&self, as_of: Timestamp) -> Snapshot<'_> {
        Snapshot {
            store: self,
            as_of: as_of.min(self.now()),
        }
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// A consistent read view: only facts created at or before `as_of` exist.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    store: &'a FactStore,
    as_of: Timestamp,
}

impl<'a> Snapshot<'a> {
    #[must_use]
    pub fn as_of(&self) -> Timestamp {
        self.as_of
    }

    /// Same store, earlier or equal time.
    #[must_use]
    pub fn rewind(&self, as_of: Timestamp) -> Self {
        Self {
            store: self.store,
            as_of: as_of.min(self.as_of),
        }
    }

    #[must_use]
    pub fn get(&self, id: FactId) -> Option<&'a Fact> {
        self.store.get(id).filter(|fact| self.contains(fact))
    }

    /// Check whether the fact existed at this snapshot's time.
    #[must_use]
    pub fn contains(&self, fact: &Fact) -> bool {
        fact.created_at <= self.as_of
    }

    fn resolve_ids(&self, ids: Option<&'a Vec<FactId>>) -> Vec<&'a Fact> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.store.get(*id))
                .filter(|fact| self.contains(fact))
                .collect()
        })
        .unwrap_or_default()
    }

    fn pair(&self, target: &Subject, property: &Subject) -> Vec<&'a Fact> {
        self.resolve_ids(
            self.store
                .by_pair
                .get(&(target.clone(), property.clone())),
        )
    }

    /// Check whether a later tombstone withdraws this fact.
    #[must_use]
    pub fn is_retracted(&self, fact: &Fact) -> bool {
        if fact.operator == Operator::Retract {
            return false;
        }
        retracted_within(fact, &self.pair(&fact.target, &fact.property))
    }

    /// Visible at this time, not a tombstone, not withdrawn.
    #[must_use]
    pub fn is_live(&self, fact: &Fact) -> bool {
        self.contains(fact) && fact.operator != Operator::Retract && !self.is_retracted(fact)
    }

    /// Facts for one (target, property) pair.
    ///
    /// With `all`, every live fact in assertion order. Without, the newest
    /// live fact per slot, slots ordered by their first assignment.
    #[must_use]
    pub fn lookup(&self, target: &Subject, property: &Subject, all: bool) -> Vec<&'a Fact> {
        let facts = self.pair(target, property);
        let live: Vec<&'a Fact> = facts
            .iter()
            .copied()
            .filter(|fact| fact.operator != Operator::Retract && !retracted_within(fact, &facts))
            .collect();
        if all {
            return live;
        }
        newest_per_slot(&facts, live)
    }

    /// Facts of a target across all properties.
    ///
    /// With `all`, every live fact in assertion order. Without, the newest
    /// per (property, slot), properties in order of first appearance.
    #[must_use]
    pub fn target_facts(&self, target: &Subject, all: bool) -> Vec<&'a Fact> {
        let facts = self.resolve_ids(self.store.by_target.get(target));
        if all {
            return facts
                .into_iter()
                .filter(|fact| fact.operator != Operator::Retract && !self.is_retracted(fact))
                .collect();
        }
        let mut properties: Vec<&Subject> = Vec::new();
        for fact in &facts {
            if !properties.contains(&&fact.property) {
                properties.push(&fact.property);
            }
        }
        properties
            .into_iter()
            .flat_map(|property| self.lookup(target, property, false))
            .collect()
    }

    /// Every live fact using `property`, in assertion order.
    #[must_use]
    pub fn with_property(&self, property: &Subject) -> Vec<&'a Fact> {
        self.resolve_ids(self.store.by_property.get(property))
            .into_iter()
            .filter(|fact| fact.operator != Operator::Retract && !self.is_retracted(fact))
            .collect()
    }

    /// First current value of `target/property` when it is a constant.
    #[must_use]
    pub fn constant(&self, target: &Subject, property: &Subject) -> Option<&'a Subject> {
        self.lookup(target, property, false)
            .into_iter()
            .filter(|fact| fact.operator.is_assignment())
            .find_map(|fact| fact.value.as_subject())
    }

    /// Every live constant value of `target/property`.
    #[must_use]
    pub fn constants(&self, target: &Subject, property: &Subject) -> Vec<&'a Subject> {
        self.lookup(target, property, true)
            .into_iter()
            .filter(|fact| fact.operator.is_assignment())
            .filter_map(|fact| fact.value.as_subject())
            .collect()
    }
}

fn tombstone_covers(tombstone: &Value, value: &Value) -> bool {
    matches!(tombstone, Value::Wildcard) || tombstone == value
}

fn retracted_within(fact: &Fact, pair: &[&Fact]) -> bool {
    pair.iter().any(|other| {
        other.operator == Operator::Retract
            && other.created_at > fact.created_at
            && tombstone_covers(&other.value, &fact.value)
    })
}

fn newest_per_slot<'a>(facts: &[&'a Fact], live: Vec<&'a Fact>) -> Vec<&'a Fact> {
    let mut order: Vec<u32> = Vec::new();
    for fact in facts {
        if fact.operator != Operator::Retract && !order.contains(&fact.slot) {
            order.push(fact.slot);
        }
    }
    let mut newest: BTreeMap<u32, &'a Fact> = BTreeMap::new();
    for fact in live {
        newest.insert(fact.slot, fact);
    }
    order
        .into_iter()
        .filter_map(|slot| newest.get(&slot).copied())
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Subject {
        Subject::symbol(name)
    }

    fn assign(store: &mut FactStore, target: &str, property: &str, value: i64) -> FactId {
        store.append(Statement::assign(sym(target), sym(property), Subject::int(value)))
    }

    fn values(facts: &[&Fact]) -> Vec<Value> {
        facts.iter().map(|fact| fact.value.clone()).collect()
    }

    #[test]
    fn append_assigns_monotonic_ids_and_timestamps() {
        let mut store = FactStore::new();
        let a = assign(&mut store, "a", "p", 1);
        let b = assign(&mut store, "a", "p", 2);
        assert_eq!(a, FactId(0));
        assert_eq!(b, FactId(1));
        assert_eq!(store.get(b).map(|f| f.created_at), Some(Timestamp(2)));
        assert_eq!(store.now(), Timestamp(2));
    }

    #[test]
    fn default_lookup_returns_most_recent() {
        let mut store = FactStore::new();
        for value in 1..=3 {
            assign(&mut store, "a", "p", value);
        }
        let snapshot = store.snapshot();
        assert_eq!(
            values(&snapshot.lookup(&sym("a"), &sym("p"), false)),
            vec![Value::Subject(Subject::int(3))]
        );
        assert_eq!(
            values(&snapshot.lookup(&sym("a"), &sym("p"), true)),
            vec![
                Value::Subject(Subject::int(1)),
                Value::Subject(Subject::int(2)),
                Value::Subject(Subject::int(3)),
            ]
        );
    }

    #[test]
    fn all_lookup_keeps_duplicates() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "p", 7);
        assign(&mut store, "a", "p", 7);
        assert_eq!(store.snapshot().lookup(&sym("a"), &sym("p"), true).len(), 2);
    }

    #[test]
    fn slots_keep_one_value_each_in_first_assignment_order() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("p"), Subject::int(10)).in_slot(1));
        store.append(Statement::assign(sym("a"), sym("p"), Subject::int(20)).in_slot(0));
        store.append(Statement::assign(sym("a"), sym("p"), Subject::int(11)).in_slot(1));
        let facts = store.snapshot().lookup(&sym("a"), &sym("p"), false);
        assert_eq!(
            values(&facts),
            vec![
                Value::Subject(Subject::int(11)),
                Value::Subject(Subject::int(20)),
            ]
        );
    }

    #[test]
    fn retraction_falls_back_to_previous_value() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "p", 1);
        assign(&mut store, "a", "p", 2);
        store.append(Statement::new(
            sym("a"),
            sym("p"),
            Operator::Retract,
            Value::Subject(Subject::int(2)),
        ));
        let snapshot = store.snapshot();
        assert_eq!(
            values(&snapshot.lookup(&sym("a"), &sym("p"), false)),
            vec![Value::Subject(Subject::int(1))]
        );
        assert_eq!(snapshot.lookup(&sym("a"), &sym("p"), true).len(), 1);
    }

    #[test]
    fn reassert_after_retraction_is_live() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "p", 1);
        store.append(Statement::new(
            sym("a"),
            sym("p"),
            Operator::Retract,
            Value::Subject(Subject::int(1)),
        ));
        assign(&mut store, "a", "p", 1);
        assert_eq!(store.snapshot().lookup(&sym("a"), &sym("p"), true).len(), 1);
    }

    #[test]
    fn wildcard_tombstone_retracts_everything_before_it() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "p", 1);
        assign(&mut store, "a", "p", 2);
        store.append(Statement::new(sym("a"), sym("p"), Operator::Retract, Value::Wildcard));
        assert!(store.snapshot().lookup(&sym("a"), &sym("p"), true).is_empty());
    }

    #[test]
    fn snapshot_hides_later_facts_and_tombstones() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "p", 1);
        let before = store.now();
        store.append(Statement::new(
            sym("a"),
            sym("p"),
            Operator::Retract,
            Value::Subject(Subject::int(1)),
        ));
        assign(&mut store, "a", "p", 5);

        let past = store.snapshot_at(before);
        assert_eq!(
            values(&past.lookup(&sym("a"), &sym("p"), false)),
            vec![Value::Subject(Subject::int(1))]
        );
        assert_eq!(
            values(&store.snapshot().lookup(&sym("a"), &sym("p"), false)),
            vec![Value::Subject(Subject::int(5))]
        );
    }

    #[test]
    fn target_facts_groups_by_property() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "x", 1);
        assign(&mut store, "a", "y", 2);
        assign(&mut store, "a", "x", 3);
        let current = store.snapshot().target_facts(&sym("a"), false);
        assert_eq!(
            values(&current),
            vec![
                Value::Subject(Subject::int(3)),
                Value::Subject(Subject::int(2)),
            ]
        );
        assert_eq!(store.snapshot().target_facts(&sym("a"), true).len(), 3);
    }

    #[test]
    fn change_events_are_published_per_append() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "p", 1);
        assign(&mut store, "b", "p", 2);
        let events = store.take_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].target, sym("b"));
        assert_eq!(store.pending_events(), 0);
    }

    #[test]
    fn replay_rejects_gaps() {
        let mut source = FactStore::new();
        assign(&mut source, "a", "p", 1);
        assign(&mut source, "a", "p", 2);

        let mut target = FactStore::new();
        let second = source.facts()[1].clone();
        assert!(target.replay(second).is_err());

        for fact in source.facts() {
            target.replay(fact.clone()).expect("replay in order");
        }
        assert_eq!(target.len(), 2);
        assert_eq!(target.pending_events(), 0);
    }

    #[test]
    fn with_property_scans_across_targets() {
        let mut store = FactStore::new();
        assign(&mut store, "a", "age", 30);
        assign(&mut store, "b", "name", 1);
        assign(&mut store, "c", "age", 40);
        let targets: Vec<_> = store
            .snapshot()
            .with_property(&sym("age"))
            .iter()
            .map(|fact| fact.target.clone())
            .collect();
        assert_eq!(targets, vec![sym("a"), sym("c")]);
    }
}
