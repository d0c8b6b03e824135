//! # Reactive Trigger Engine
//!
//! Continuous queries with attached mutation programs.
//!
//! ## Subscription States
//!
//! | State       | Meaning                                              |
//! |-------------|------------------------------------------------------|
//! | `Idle`      | Waiting for the next store change or timer tick      |
//! | `Matching`  | Re-evaluating its query                              |
//! | `Firing`    | Its program runs for newly satisfying bindings       |
//! | `Exhausted` | Fire count reached the limit; inert from then on     |
//!
//! The trigger engine only plans firings. Running a program appends facts,
//! which is the owning `Engine`'s job, so every mutation goes through the
//! same serialized append path.

use crate::compute::HostRegistry;
use crate::config::EngineConfig;
use crate::evaluator::{self, Bindings, EvalContext, Evaluation};
use crate::store::Snapshot;
use crate::vocab;
use crate::{
    FactId, Operator, QuintetError, ReadOptions, Statement, Subject, SubscriptionId, Value,
    Variable,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

// =============================================================================
// MUTATION PROGRAMS
// =============================================================================

/// A target or property slot of a mutation: fixed, or taken from the
/// firing binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Subject(Subject),
    Variable(Variable),
}

impl Term {
    #[must_use]
    pub fn var(name: &str) -> Self {
        Self::Variable(Variable::new(name))
    }

    /// The candidate that satisfied the query.
    #[must_use]
    pub fn this() -> Self {
        Self::var(vocab::SELF_VARIABLE)
    }

    pub fn resolve(&self, scope: &Bindings) -> Result<Subject, QuintetError> {
        match self {
            Self::Subject(subject) => Ok(subject.clone()),
            Self::Variable(variable) => scope.get(variable).cloned().ok_or_else(|| {
                QuintetError::InvalidStatement(format!("{variable} is not bound by the trigger"))
            }),
        }
    }
}

impl From<Subject> for Term {
    fn from(subject: Subject) -> Self {
        Self::Subject(subject)
    }
}

/// One step of a trigger's program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    Assert {
        target: Term,
        property: Term,
        operator: Operator,
        value: Value,
        #[serde(default)]
        meta: BTreeSet<Subject>,
    },
    Retract {
        target: Term,
        property: Term,
        value: Value,
    },
}

impl Mutation {
    /// `target/property = value`
    #[must_use]
    pub fn assign(target: impl Into<Term>, property: impl Into<Term>, value: impl Into<Value>) -> Self {
        Self::Assert {
            target: target.into(),
            property: property.into(),
            operator: Operator::Assign,
            value: value.into(),
            meta: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn retract(target: impl Into<Term>, property: impl Into<Term>, value: impl Into<Value>) -> Self {
        Self::Retract {
            target: target.into(),
            property: property.into(),
            value: value.into(),
        }
    }

    /// Substitute the firing binding into a concrete statement.
    ///
    /// Variables in value position must be bound, except inside requirement
    /// operators where they stay patterns.
    pub fn instantiate(&self, scope: &Bindings) -> Result<Statement, QuintetError> {
        match self {
            Self::Assert {
                target,
                property,
                operator,
                value,
                meta,
            } => {
                let value = if operator.is_requirement() {
                    value.clone()
                } else {
                    substitute(value, scope)?
                };
                let mut statement = Statement::new(
                    target.resolve(scope)?,
                    property.resolve(scope)?,
                    operator.clone(),
                    value,
                );
                statement.meta = meta.clone();
                Ok(statement)
            }
            Self::Retract {
                target,
                property,
                value,
            } => Ok(Statement::new(
                target.resolve(scope)?,
                property.resolve(scope)?,
                Operator::Retract,
                substitute(value, scope)?,
            )),
        }
    }
}

impl From<&str> for Term {
    fn from(name: &str) -> Self {
        name.strip_prefix('?')
            .map_or_else(|| Self::Subject(Subject::symbol(name)), Self::var)
    }
}

fn substitute(value: &Value, scope: &Bindings) -> Result<Value, QuintetError> {
    match value {
        Value::Variable(variable) => scope
            .get(variable)
            .cloned()
            .map(Value::Subject)
            .ok_or_else(|| {
                QuintetError::InvalidStatement(format!("{variable} is not bound by the trigger"))
            }),
        other => Ok(other.clone()),
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// What makes a subscription fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionKind {
    /// Each newly satisfying binding, once.
    #[default]
    Truthy,
    /// On a wall-clock schedule, for every current binding (or once when
    /// there is no query).
    Timer { every_ms: u64 },
    /// Each binding that stops satisfying the query.
    OnRetract,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub query: Option<Subject>,
    pub program: Vec<Mutation>,
    /// Maximum number of firings; `None` is unlimited.
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub kind: ConditionKind,
    /// Identity the query is evaluated as.
    #[serde(default)]
    pub reader: Option<Subject>,
}

impl SubscriptionSpec {
    #[must_use]
    pub fn truthy(query: Subject, program: Vec<Mutation>) -> Self {
        Self {
            query: Some(query),
            program,
            limit: None,
            kind: ConditionKind::Truthy,
            reader: None,
        }
    }

    #[must_use]
    pub fn on_retract(query: Subject, program: Vec<Mutation>) -> Self {
        Self {
            kind: ConditionKind::OnRetract,
            ..Self::truthy(query, program)
        }
    }

    #[must_use]
    pub fn timer(every_ms: u64, program: Vec<Mutation>) -> Self {
        Self {
            query: None,
            program,
            limit: None,
            kind: ConditionKind::Timer { every_ms },
            reader: None,
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Subject) -> Self {
        self.query = Some(query);
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn as_reader(mut self, reader: Subject) -> Self {
        self.reader = Some(reader);
        self
    }

    fn validate(&self) -> Result<(), QuintetError> {
        match self.kind {
            ConditionKind::Truthy | ConditionKind::OnRetract if self.query.is_none() => Err(
                QuintetError::InvalidSubscription("this condition kind needs a query".into()),
            ),
            ConditionKind::Timer { every_ms: 0 } => Err(QuintetError::InvalidSubscription(
                "timer interval must be positive".into(),
            )),
            _ if self.limit == Some(0) => Err(QuintetError::InvalidSubscription(
                "limit must be positive".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionState {
    Idle,
    Matching,
    Firing,
    Exhausted,
}

/// One satisfying binding tuple of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    pub target: Option<Subject>,
    pub bindings: Bindings,
}

impl BindingKey {
    /// Variables visible to the program: the query's bindings plus `?self`.
    #[must_use]
    pub fn scope(&self) -> Bindings {
        let mut scope = self.bindings.clone();
        if let Some(target) = &self.target {
            scope.insert(Variable::new(vocab::SELF_VARIABLE), target.clone());
        }
        scope
    }
}

fn binding_keys(evaluation: Evaluation) -> Vec<BindingKey> {
    let mut seen = BTreeSet::new();
    evaluation
        .solutions
        .into_iter()
        .map(|solution| BindingKey {
            target: Some(solution.target),
            bindings: solution.bindings,
        })
        .filter(|key| seen.insert(key.clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    spec: SubscriptionSpec,
    state: SubscriptionState,
    fired: u32,
    /// Bindings already fired for (truthy).
    seen: BTreeSet<BindingKey>,
    /// Bindings satisfying the query at the previous evaluation.
    last_matches: BTreeSet<BindingKey>,
    next_due_ms: u64,
}

impl Subscription {
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    #[must_use]
    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    #[must_use]
    pub fn fired(&self) -> u32 {
        self.fired
    }

    fn can_fire(&self) -> bool {
        self.spec.limit.is_none_or(|limit| self.fired < limit)
    }

    /// Count a firing if the limit allows it.
    fn try_fire(&mut self) -> bool {
        if self.can_fire() {
            self.fired = self.fired.saturating_add(1);
            true
        } else {
            false
        }
    }

    fn evaluate(
        &self,
        snapshot: Snapshot<'_>,
        hosts: &HostRegistry,
        config: &EngineConfig,
    ) -> Option<Vec<BindingKey>> {
        let query = self.spec.query.as_ref()?;
        let options = ReadOptions {
            reader: self.spec.reader.clone(),
            ..ReadOptions::default()
        };
        let ctx = EvalContext::new(snapshot, hosts, config, options);
        match evaluator::evaluate(&ctx, query, &Bindings::new(), None) {
            Ok(evaluation) => Some(binding_keys(evaluation)),
            Err(error) => {
                warn!(subscription = %self.id, %error, "trigger query failed");
                None
            }
        }
    }
}

/// A planned execution of one subscription's program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub subscription: SubscriptionId,
    pub key: BindingKey,
}

/// Record of one executed firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Firing {
    pub subscription: SubscriptionId,
    pub target: Option<Subject>,
    pub bindings: Bindings,
    /// Facts appended by the program.
    pub facts: Vec<FactId>,
    /// Mutations that could not be applied.
    pub errors: Vec<String>,
}

// =============================================================================
// TRIGGER ENGINE
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct TriggerEngine {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: u64,
}

impl TriggerEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, spec: SubscriptionSpec) -> Result<SubscriptionId, QuintetError> {
        spec.validate()?;
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        debug!(subscription = %id, kind = ?spec.kind, "subscribed");
        self.subscriptions.insert(
            id,
            Subscription {
                id,
                spec,
                state: SubscriptionState::Idle,
                fired: 0,
                seen: BTreeSet::new(),
                last_matches: BTreeSet::new(),
                next_due_ms: 0,
            },
        );
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    #[must_use]
    pub fn get(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    #[must_use]
    pub fn program(&self, id: SubscriptionId) -> Option<&[Mutation]> {
        self.subscriptions
            .get(&id)
            .map(|subscription| subscription.spec.program.as_slice())
    }

    /// Re-evaluate every store-driven subscription against `snapshot` and
    /// plan its firings.
    ///
    /// Truthy subscriptions fire for bindings not fired before; on-retract
    /// subscriptions fire for bindings present last time and gone now.
    pub fn plan(
        &mut self,
        snapshot: Snapshot<'_>,
        hosts: &HostRegistry,
        config: &EngineConfig,
    ) -> Vec<Activation> {
        let mut activations = Vec::new();
        for subscription in self.subscriptions.values_mut() {
            let store_driven = matches!(
                subscription.spec.kind,
                ConditionKind::Truthy | ConditionKind::OnRetract
            );
            if !store_driven || subscription.state == SubscriptionState::Exhausted {
                continue;
            }
            subscription.state = SubscriptionState::Matching;
            let Some(current) = subscription.evaluate(snapshot, hosts, config) else {
                subscription.state = SubscriptionState::Idle;
                continue;
            };

            let fresh: Vec<BindingKey> = match subscription.spec.kind {
                ConditionKind::OnRetract => subscription
                    .last_matches
                    .iter()
                    .filter(|key| !current.contains(key))
                    .cloned()
                    .collect(),
                _ => current
                    .iter()
                    .filter(|key| !subscription.seen.contains(*key))
                    .cloned()
                    .collect(),
            };
            let before = activations.len();
            for key in fresh {
                if !subscription.try_fire() {
                    break;
                }
                subscription.seen.insert(key.clone());
                activations.push(Activation {
                    subscription: subscription.id,
                    key,
                });
            }
            subscription.last_matches = current.into_iter().collect();
            subscription.state = if activations.len() > before {
                SubscriptionState::Firing
            } else {
                SubscriptionState::Idle
            };
        }
        activations
    }

    /// Plan the firings of timer subscriptions due at `now_ms`.
    pub fn plan_timers(
        &mut self,
        snapshot: Snapshot<'_>,
        hosts: &HostRegistry,
        config: &EngineConfig,
        now_ms: u64,
    ) -> Vec<Activation> {
        let mut activations = Vec::new();
        for subscription in self.subscriptions.values_mut() {
            let ConditionKind::Timer { every_ms } = subscription.spec.kind else {
                continue;
            };
            if subscription.state == SubscriptionState::Exhausted
                || now_ms < subscription.next_due_ms
            {
                continue;
            }
            subscription.next_due_ms = now_ms.saturating_add(every_ms);
            let keys = if subscription.spec.query.is_some() {
                subscription.state = SubscriptionState::Matching;
                subscription
                    .evaluate(snapshot, hosts, config)
                    .unwrap_or_default()
            } else {
                vec![BindingKey::default()]
            };
            let before = activations.len();
            for key in keys {
                if !subscription.try_fire() {
                    break;
                }
                activations.push(Activation {
                    subscription: subscription.id,
                    key,
                });
            }
            subscription.state = if activations.len() > before {
                SubscriptionState::Firing
            } else {
                SubscriptionState::Idle
            };
        }
        activations
    }

    /// Close the current round: firing subscriptions return to idle or
    /// become exhausted.
    pub fn settle(&mut self) {
        for subscription in self.subscriptions.values_mut() {
            if subscription.state == SubscriptionState::Firing {
                subscription.state = if subscription.can_fire() {
                    SubscriptionState::Idle
                } else {
                    debug!(subscription = %subscription.id, "exhausted");
                    SubscriptionState::Exhausted
                };
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FactStore;

    fn sym(name: &str) -> Subject {
        Subject::symbol(name)
    }

    fn plan(engine: &mut TriggerEngine, store: &FactStore) -> Vec<Activation> {
        engine.plan(store.snapshot(), &HostRegistry::new(), &EngineConfig::default())
    }

    fn ready_query(store: &mut FactStore) {
        store.append(Statement::require(sym("ready"), sym("status"), sym("ready")));
    }

    #[test]
    fn specs_are_validated() {
        let mut engine = TriggerEngine::new();
        let no_query = SubscriptionSpec {
            query: None,
            ..SubscriptionSpec::truthy(sym("q"), Vec::new())
        };
        assert!(engine.subscribe(no_query).is_err());
        assert!(engine.subscribe(SubscriptionSpec::timer(0, Vec::new())).is_err());
        assert!(
            engine
                .subscribe(SubscriptionSpec::truthy(sym("q"), Vec::new()).with_limit(0))
                .is_err()
        );
        assert!(engine.is_empty());
    }

    #[test]
    fn truthy_fires_once_per_binding() {
        let mut store = FactStore::new();
        ready_query(&mut store);
        let mut engine = TriggerEngine::new();
        let id = engine
            .subscribe(SubscriptionSpec::truthy(sym("ready"), Vec::new()))
            .expect("subscribe");

        store.append(Statement::assign(sym("a"), sym("status"), sym("ready")));
        assert_eq!(plan(&mut engine, &store).len(), 1);
        engine.settle();

        store.append(Statement::assign(sym("a"), sym("note"), sym("x")));
        assert!(plan(&mut engine, &store).is_empty());

        store.append(Statement::assign(sym("b"), sym("status"), sym("ready")));
        let activations = plan(&mut engine, &store);
        assert_eq!(activations.len(), 1);
        assert_eq!(activations[0].key.target, Some(sym("b")));
        assert_eq!(engine.get(id).map(Subscription::fired), Some(2));
    }

    #[test]
    fn limit_exhausts_subscription() {
        let mut store = FactStore::new();
        ready_query(&mut store);
        store.append(Statement::assign(sym("a"), sym("status"), sym("ready")));
        store.append(Statement::assign(sym("b"), sym("status"), sym("ready")));
        let mut engine = TriggerEngine::new();
        let id = engine
            .subscribe(SubscriptionSpec::truthy(sym("ready"), Vec::new()).with_limit(1))
            .expect("subscribe");

        assert_eq!(plan(&mut engine, &store).len(), 1);
        engine.settle();
        assert_eq!(
            engine.get(id).map(Subscription::state),
            Some(SubscriptionState::Exhausted)
        );
        store.append(Statement::assign(sym("c"), sym("status"), sym("ready")));
        assert!(plan(&mut engine, &store).is_empty());
    }

    #[test]
    fn on_retract_fires_on_negative_edge() {
        let mut store = FactStore::new();
        ready_query(&mut store);
        store.append(Statement::assign(sym("a"), sym("status"), sym("ready")));
        let mut engine = TriggerEngine::new();
        engine
            .subscribe(SubscriptionSpec::on_retract(sym("ready"), Vec::new()))
            .expect("subscribe");

        assert!(plan(&mut engine, &store).is_empty());
        engine.settle();

        store.append(Statement::assign(sym("a"), sym("status"), sym("done")));
        let activations = plan(&mut engine, &store);
        assert_eq!(activations.len(), 1);
        assert_eq!(activations[0].key.target, Some(sym("a")));
    }

    #[test]
    fn timers_fire_on_schedule() {
        let store = FactStore::new();
        let mut engine = TriggerEngine::new();
        engine
            .subscribe(SubscriptionSpec::timer(100, Vec::new()))
            .expect("subscribe");
        let hosts = HostRegistry::new();
        let config = EngineConfig::default();
        let mut due = |now| {
            let count = engine.plan_timers(store.snapshot(), &hosts, &config, now).len();
            engine.settle();
            count
        };
        assert_eq!(due(0), 1);
        assert_eq!(due(50), 0);
        assert_eq!(due(100), 1);
        assert_eq!(due(150), 0);
    }

    #[test]
    fn instantiate_substitutes_self_and_variables() {
        let key = BindingKey {
            target: Some(sym("a")),
            bindings: [(Variable::new("n"), Subject::int(3))].into_iter().collect(),
        };
        let mutation = Mutation::assign(Term::this(), "seen", Value::variable("n"));
        let statement = mutation.instantiate(&key.scope()).expect("instantiate");
        assert_eq!(statement.target, sym("a"));
        assert_eq!(statement.property, sym("seen"));
        assert_eq!(statement.value, Value::Subject(Subject::int(3)));

        let unbound = Mutation::assign("?missing", "p", Subject::int(1));
        assert!(unbound.instantiate(&key.scope()).is_err());
    }
}
