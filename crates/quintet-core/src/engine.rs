//! # Engine
//!
//! The facade tying the components together.
//!
//! | Component        | Role                                             |
//! |------------------|--------------------------------------------------|
//! | `SubjectRegistry`| canonical subjects, generated identifiers        |
//! | `FactStore`      | append-only log, the single write path           |
//! | `TriggerEngine`  | subscriptions and their firing plans             |
//! | `HostRegistry`   | host functions for opaque operations             |
//! | `EngineConfig`   | fan-out, validation policy, recursion limits     |
//!
//! ## Write Path
//!
//! ```text
//! statement -> shape check -> canonicalize -> #NOW/#SNAPSHOT freeze
//!           -> validation -> append -> (end of batch) drain triggers
//! ```
//!
//! Draining re-evaluates subscriptions round by round until no round
//! appends anything. Every trigger mutation goes back through `commit`, so
//! the log stays one totally ordered sequence.

use crate::access::{AccessFilter, TemporalBinding};
use crate::compute::{self, HostFunction, HostRegistry};
use crate::config::{EngineConfig, ValidationPolicy};
use crate::evaluator::{self, Bindings, EvalContext, Evaluation, Resolution};
use crate::explain::{self, Explanation};
use crate::primitives::{MAX_BATCH_LENGTH, MAX_FIRING_LOG, MAX_META_TAGS, MAX_TEXT_LENGTH};
use crate::registry::{RegistryState, SubjectRegistry};
use crate::store::FactStore;
use crate::trigger::{Activation, Firing, SubscriptionSpec, TriggerEngine};
use crate::validation::Validator;
use crate::{
    ErrorKind, ErrorMarker, Fact, FactId, Operator, QueryMode, QuintetError, ReadOptions, Resolved,
    ResolvedFact, Statement, Subject, SubscriptionId, Timestamp, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, trace, warn};

/// Counters reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub facts: usize,
    pub targets: usize,
    pub properties: usize,
    pub symbols: usize,
    pub texts: usize,
    pub generated: u64,
    pub subscriptions: usize,
    pub now: Timestamp,
}

#[derive(Debug, Default)]
pub struct Engine {
    registry: SubjectRegistry,
    store: FactStore,
    triggers: TriggerEngine,
    hosts: HostRegistry,
    config: EngineConfig,
    firings: VecDeque<Firing>,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Rebuild an engine around a replayed store.
    ///
    /// Subscriptions and host functions are runtime state and start empty.
    #[must_use]
    pub fn from_parts(registry: SubjectRegistry, store: FactStore, config: EngineConfig) -> Self {
        Self {
            registry,
            store,
            config,
            ..Self::default()
        }
    }

    /// Rebuild an engine by replaying a saved log.
    pub fn replay(
        facts: Vec<Fact>,
        state: RegistryState,
        config: EngineConfig,
    ) -> Result<Self, QuintetError> {
        let mut registry = SubjectRegistry::new();
        registry.restore(state);
        let mut store = FactStore::new();
        for fact in facts {
            store.replay(registry.canonicalize_fact(fact))?;
        }
        debug!(facts = store.len(), "log replayed");
        Ok(Self::from_parts(registry, store, config))
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &SubjectRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &FactStore {
        &self.store
    }

    #[must_use]
    pub fn triggers(&self) -> &TriggerEngine {
        &self.triggers
    }

    #[must_use]
    pub fn hosts(&self) -> &HostRegistry {
        &self.hosts
    }

    pub fn register_host(&mut self, name: impl Into<String>, function: impl HostFunction + 'static) {
        self.hosts.register(name, function);
    }

    pub fn unregister_host(&mut self, name: &str) -> bool {
        self.hosts.unregister(name)
    }

    // =========================================================================
    // SUBJECTS
    // =========================================================================

    pub fn symbol(&mut self, name: &str) -> Subject {
        self.registry.symbol(name)
    }

    pub fn text(&mut self, value: &str) -> Subject {
        self.registry.text(value)
    }

    pub fn generate(&mut self) -> Subject {
        self.registry.generate()
    }

    pub fn generate_labelled(&mut self, label: impl Into<String>) -> Subject {
        self.registry.generate_labelled(label)
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Append one statement and drain triggers.
    ///
    /// Returns the first appended fact; a frozen `#ALL` value may append
    /// several consecutive slots.
    pub fn assert(&mut self, statement: Statement) -> Result<FactId, QuintetError> {
        self.assert_batch(vec![statement])?
            .first()
            .copied()
            .ok_or_else(|| QuintetError::InvalidStatement("statement appended nothing".into()))
    }

    /// Append a batch, then drain triggers once.
    ///
    /// Shape errors refuse the whole batch before anything is appended. A
    /// rejected validation stops the batch at that statement; the facts
    /// before it are already part of the log and their triggers still run.
    pub fn assert_batch(&mut self, statements: Vec<Statement>) -> Result<Vec<FactId>, QuintetError> {
        if statements.len() > MAX_BATCH_LENGTH {
            return Err(QuintetError::InvalidStatement(format!(
                "batch of {} statements exceeds maximum {}",
                statements.len(),
                MAX_BATCH_LENGTH
            )));
        }
        statements.iter().try_for_each(check_shape)?;

        let batch_start = self.store.now();
        let mut ids = Vec::with_capacity(statements.len());
        let mut rejected = None;
        for statement in statements {
            match self.commit(statement, batch_start) {
                Ok(appended) => ids.extend(appended),
                Err(error) => {
                    rejected = Some(error);
                    break;
                }
            }
        }
        debug!(facts = ids.len(), "batch committed");
        self.drain()?;
        match rejected {
            Some(error) => Err(error),
            None => Ok(ids),
        }
    }

    /// Append a tombstone withdrawing `target/property = value`.
    ///
    /// A wildcard value withdraws every earlier value of the property.
    pub fn retract(
        &mut self,
        target: Subject,
        property: Subject,
        value: impl Into<Value>,
    ) -> Result<FactId, QuintetError> {
        self.assert(Statement::new(
            target,
            property,
            Operator::Retract,
            value.into(),
        ))
    }

    fn commit(
        &mut self,
        statement: Statement,
        batch_start: Timestamp,
    ) -> Result<Vec<FactId>, QuintetError> {
        check_shape(&statement)?;
        let statement = self.registry.canonicalize_statement(statement);
        let binding = AccessFilter::temporal_binding(&statement.meta);
        let statements = if binding == TemporalBinding::Virtual || !statement.operator.is_assignment()
        {
            vec![statement]
        } else {
            self.freeze(statement, binding, batch_start)?
        };

        let mut ids = Vec::with_capacity(statements.len());
        for statement in statements {
            let statement = self.validated(statement)?;
            trace!(target = %statement.target, property = %statement.property, "append");
            ids.push(self.store.append(statement));
        }
        Ok(ids)
    }

    /// Compute a `#NOW`/`#SNAPSHOT` assignment once and turn each resulting
    /// value into a constant in consecutive slots.
    fn freeze(
        &self,
        statement: Statement,
        binding: TemporalBinding,
        batch_start: Timestamp,
    ) -> Result<Vec<Statement>, QuintetError> {
        let snapshot = match binding {
            TemporalBinding::Snapshot => self.store.snapshot_at(batch_start),
            _ => self.store.snapshot(),
        };
        let ctx = EvalContext::new(snapshot, &self.hosts, &self.config, ReadOptions::new());
        let resolutions = evaluator::resolve_value(
            &ctx,
            &statement.target,
            &statement.property,
            &statement.operator,
            &statement.value,
            AccessFilter::is_array(&statement.meta),
        )?;

        let values: Vec<Value> = if resolutions.is_empty() {
            vec![Value::Error(Box::new(
                ErrorMarker::new(ErrorKind::MissingInput, "frozen value resolved to nothing").at(
                    &statement.target,
                    &statement.property,
                    None,
                ),
            ))]
        } else {
            resolutions.into_iter().map(frozen_value).collect()
        };
        Ok(values
            .into_iter()
            .enumerate()
            .map(|(index, value)| Statement {
                target: statement.target.clone(),
                property: statement.property.clone(),
                operator: Operator::Assign,
                value,
                meta: statement.meta.clone(),
                slot: statement.slot.saturating_add(index as u32),
            })
            .collect())
    }

    fn validated(&self, mut statement: Statement) -> Result<Statement, QuintetError> {
        if statement.operator != Operator::Assign {
            return Ok(statement);
        }
        let Value::Subject(value) = &statement.value else {
            return Ok(statement);
        };
        let snapshot = self.store.snapshot();
        let Some(violation) = Validator::check(&snapshot, &statement.property, &statement.value)
        else {
            return Ok(statement);
        };
        match self.config.validation {
            ValidationPolicy::Reject => Err(QuintetError::ValidationRejected {
                property: statement.property,
                message: violation.message,
            }),
            ValidationPolicy::Poison => {
                debug!(property = %statement.property, message = %violation.message, "poisoned by validation");
                let marker = violation.into_marker(&statement.target, &statement.property, value);
                statement.value = Value::Error(Box::new(marker));
                Ok(statement)
            }
        }
    }

    // =========================================================================
    // TRIGGERS
    // =========================================================================

    /// Run trigger rounds until a round appends nothing.
    fn drain(&mut self) -> Result<(), QuintetError> {
        let mut rounds = 0;
        while self.store.pending_events() > 0 {
            if rounds >= self.config.max_trigger_rounds {
                let discarded = self.store.take_events().len();
                warn!(rounds, discarded, "trigger cascade did not settle");
                return Err(QuintetError::TriggerCascade(rounds));
            }
            rounds += 1;
            let events = self.store.take_events();
            if self.triggers.is_empty() {
                continue;
            }
            trace!(round = rounds, events = events.len(), "trigger round");
            let activations = self
                .triggers
                .plan(self.store.snapshot(), &self.hosts, &self.config);
            self.execute(activations);
            self.triggers.settle();
        }
        Ok(())
    }

    /// Run each activation's program to completion through `commit`.
    fn execute(&mut self, activations: Vec<Activation>) {
        for activation in activations {
            let Some(program) = self.triggers.program(activation.subscription) else {
                continue;
            };
            let program = program.to_vec();
            let scope = activation.key.scope();
            let batch_start = self.store.now();
            let mut firing = Firing {
                subscription: activation.subscription,
                target: activation.key.target,
                bindings: activation.key.bindings,
                facts: Vec::new(),
                errors: Vec::new(),
            };
            for mutation in &program {
                match mutation
                    .instantiate(&scope)
                    .and_then(|statement| self.commit(statement, batch_start))
                {
                    Ok(ids) => firing.facts.extend(ids),
                    Err(error) => {
                        warn!(subscription = %firing.subscription, %error, "trigger mutation failed");
                        firing.errors.push(error.to_string());
                    }
                }
            }
            debug!(subscription = %firing.subscription, facts = firing.facts.len(), "trigger fired");
            if self.firings.len() >= MAX_FIRING_LOG {
                self.firings.pop_front();
            }
            self.firings.push_back(firing);
        }
    }

    /// Register a subscription and run it once against the current store.
    pub fn subscribe(&mut self, mut spec: SubscriptionSpec) -> Result<SubscriptionId, QuintetError> {
        spec.query = spec.query.map(|query| self.registry.canonicalize(query));
        spec.reader = spec.reader.map(|reader| self.registry.canonicalize(reader));
        let id = self.triggers.subscribe(spec)?;
        let activations = self
            .triggers
            .plan(self.store.snapshot(), &self.hosts, &self.config);
        self.execute(activations);
        self.triggers.settle();
        self.drain()?;
        Ok(id)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), QuintetError> {
        if self.triggers.unsubscribe(id) {
            debug!(subscription = %id, "unsubscribed");
            Ok(())
        } else {
            Err(QuintetError::UnknownSubscription(id))
        }
    }

    /// Fire timer subscriptions due at `now_ms`. Returns the number of
    /// firings.
    pub fn tick(&mut self, now_ms: u64) -> Result<usize, QuintetError> {
        let activations =
            self.triggers
                .plan_timers(self.store.snapshot(), &self.hosts, &self.config, now_ms);
        let fired = activations.len();
        self.execute(activations);
        self.triggers.settle();
        self.drain()?;
        Ok(fired)
    }

    /// Drain the firing records collected since the last call.
    pub fn take_firings(&mut self) -> Vec<Firing> {
        self.firings.drain(..).collect()
    }

    // =========================================================================
    // READS
    // =========================================================================

    fn context(&self, options: ReadOptions) -> EvalContext<'_> {
        let snapshot = match options.as_of {
            Some(as_of) => self.store.snapshot_at(as_of),
            None => self.store.snapshot(),
        };
        EvalContext::new(snapshot, &self.hosts, &self.config, options)
    }

    /// Top-level read: stored facts (`Literal`) or the unification result
    /// (`Evaluate`).
    pub fn query(
        &self,
        target: &Subject,
        mode: QueryMode,
        options: ReadOptions,
    ) -> Result<Vec<ResolvedFact>, QuintetError> {
        match mode {
            QueryMode::Literal => self.literal(target, options),
            QueryMode::Evaluate => Ok(self.evaluate(target, options)?.facts()),
        }
    }

    pub fn literal(
        &self,
        target: &Subject,
        options: ReadOptions,
    ) -> Result<Vec<ResolvedFact>, QuintetError> {
        evaluator::literal(&self.context(options), target)
    }

    pub fn evaluate(&self, target: &Subject, options: ReadOptions) -> Result<Evaluation, QuintetError> {
        evaluator::evaluate(&self.context(options), target, &Bindings::new(), None)
    }

    /// Resolved facts of `target/property`.
    pub fn read(
        &self,
        target: &Subject,
        property: &Subject,
        options: ReadOptions,
    ) -> Result<Vec<ResolvedFact>, QuintetError> {
        evaluator::read(&self.context(options), target, property)
    }

    /// Current value(s) of a computation subject.
    #[must_use]
    pub fn compute(&self, subject: &Subject, options: ReadOptions) -> Vec<Resolution> {
        compute::compute(&self.context(options), subject)
    }

    pub fn explain(&self, subject: &Subject, options: ReadOptions) -> Result<Explanation, QuintetError> {
        explain::explain(&self.context(options), subject)
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            facts: self.store.len(),
            targets: self.store.target_count(),
            properties: self.store.property_count(),
            symbols: self.registry.symbol_count(),
            texts: self.registry.text_count(),
            generated: self.registry.generated_count(),
            subscriptions: self.triggers.len(),
            now: self.store.now(),
        }
    }
}

fn frozen_value(resolution: Resolution) -> Value {
    match resolution.value {
        Resolved::Value(subject) => Value::Subject(subject),
        Resolved::Error(marker) => Value::Error(Box::new(marker)),
        Resolved::Pattern(value) => value,
    }
}

fn check_subject(subject: &Subject) -> Result<(), QuintetError> {
    let length = match subject {
        Subject::Symbol(text) | Subject::Text(text) => text.len(),
        _ => 0,
    };
    if length > MAX_TEXT_LENGTH {
        return Err(QuintetError::InvalidStatement(format!(
            "{} of {length} bytes exceeds maximum {MAX_TEXT_LENGTH}",
            subject.kind_name()
        )));
    }
    Ok(())
}

fn check_shape(statement: &Statement) -> Result<(), QuintetError> {
    if statement.meta.len() > MAX_META_TAGS {
        return Err(QuintetError::InvalidStatement(format!(
            "{} meta tags exceed maximum {MAX_META_TAGS}",
            statement.meta.len()
        )));
    }
    check_subject(&statement.target)?;
    check_subject(&statement.property)?;
    statement.meta.iter().try_for_each(check_subject)?;
    if let Operator::Predicate(name) = &statement.operator {
        check_subject(name)?;
    }
    match &statement.value {
        Value::Subject(subject) | Value::Evaluate(subject) => check_subject(subject),
        Value::Path { subject, property } => {
            check_subject(subject)?;
            check_subject(property)
        }
        _ => Ok(()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
