//! # Unification Evaluator
//!
//! Evaluation mode and literal mode reads over one fixed snapshot.
//!
//! The requirement facts of a subject (`==` and predicate operators) form a
//! conjunctive query. Candidates are discovered from the first
//! requirement's property in assertion order, then checked by a
//! backtracking search that threads a single binding context through every
//! requirement.
//!
//! Nested `?subject` values recurse into `evaluate`; computed values recurse
//! into the computational engine. Every recursion pushes a frame on the
//! `EvalContext` stack, which turns re-entry into `CyclicEvaluation` and
//! runaway nesting into `EvaluationDepthExceeded`.

use crate::access::AccessFilter;
use crate::compute::{self, HostRegistry};
use crate::config::EngineConfig;
use crate::explain::{ExplainEvent, Outcome, Rejection, Trace};
use crate::store::Snapshot;
use crate::validation::Validator;
use crate::vocab;
use crate::{
    ErrorKind, ErrorMarker, Fact, Operator, QuintetError, ReadOptions, Resolved, ResolvedFact,
    Subject, Value, Variable,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// =============================================================================
// BINDINGS
// =============================================================================

/// Variable assignments of one evaluation path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bindings(BTreeMap<Variable, Subject>);

impl Bindings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, variable: &Variable) -> Option<&Subject> {
        self.0.get(variable)
    }

    /// A copy extended with `variable = value`.
    ///
    /// Returns `None` when the variable is already bound to something else.
    #[must_use]
    pub fn with(&self, variable: &Variable, value: &Subject) -> Option<Self> {
        match self.0.get(variable) {
            Some(bound) if bound == value => Some(self.clone()),
            Some(_) => None,
            None => {
                let mut extended = self.clone();
                extended.0.insert(variable.clone(), value.clone());
                Some(extended)
            }
        }
    }

    pub fn insert(&mut self, variable: Variable, value: Subject) -> Option<Subject> {
        self.0.insert(variable, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Subject)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(Variable, Subject)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Variable, Subject)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// EVALUATION CONTEXT
// =============================================================================

/// One level of nested work, used for cycle detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Evaluate(Subject),
    Compute(Subject),
    Read(Subject, Subject),
}

impl Frame {
    fn subject(&self) -> &Subject {
        match self {
            Self::Evaluate(subject) | Self::Compute(subject) | Self::Read(subject, _) => subject,
        }
    }
}

/// Pops its frame when dropped.
pub(crate) struct FrameGuard<'c> {
    stack: &'c RefCell<Vec<Frame>>,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

/// Everything one read needs: the snapshot, the host functions, the
/// configuration and the caller's read options.
///
/// A context lives for a single top-level call and is never shared between
/// threads.
#[derive(Debug)]
pub struct EvalContext<'a> {
    snapshot: Snapshot<'a>,
    hosts: &'a HostRegistry,
    config: &'a EngineConfig,
    options: ReadOptions,
    stack: RefCell<Vec<Frame>>,
    /// Targets of nested evaluations already performed under this snapshot.
    nested: RefCell<BTreeMap<(Subject, Bindings), Vec<Subject>>>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(
        snapshot: Snapshot<'a>,
        hosts: &'a HostRegistry,
        config: &'a EngineConfig,
        options: ReadOptions,
    ) -> Self {
        Self {
            snapshot,
            hosts,
            config,
            options,
            stack: RefCell::new(Vec::new()),
            nested: RefCell::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot<'a> {
        self.snapshot
    }

    #[must_use]
    pub fn hosts(&self) -> &'a HostRegistry {
        self.hosts
    }

    #[must_use]
    pub fn config(&self) -> &'a EngineConfig {
        self.config
    }

    #[must_use]
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Access-filter check under this context's read options.
    #[must_use]
    pub fn visible(&self, fact: &Fact) -> bool {
        AccessFilter::visible_with(&self.snapshot, fact, &self.options)
    }

    pub(crate) fn enter(&self, frame: Frame) -> Result<FrameGuard<'_>, QuintetError> {
        let mut stack = self.stack.borrow_mut();
        if stack.contains(&frame) {
            return Err(QuintetError::CyclicEvaluation(frame.subject().clone()));
        }
        if stack.len() >= self.config.max_evaluation_depth {
            return Err(QuintetError::EvaluationDepthExceeded(
                self.config.max_evaluation_depth,
            ));
        }
        stack.push(frame);
        Ok(FrameGuard { stack: &self.stack })
    }
}

/// Data-level form of a recursion failure, for value positions.
pub(crate) fn cycle_marker(error: &QuintetError) -> ErrorMarker {
    ErrorMarker::new(ErrorKind::Cycle, error.to_string())
}

// =============================================================================
// VALUE RESOLUTION
// =============================================================================

/// One resolved value of a stored fact.
///
/// Fan-outs and reverse evaluations resolve a single fact to several values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: Resolved,
    /// Element positions of the `#ALL` inputs that produced this value.
    pub positions: Vec<u32>,
}

impl Resolution {
    #[must_use]
    pub fn new(value: Resolved) -> Self {
        Self {
            value,
            positions: Vec::new(),
        }
    }

    #[must_use]
    pub fn error(marker: ErrorMarker) -> Self {
        Self::new(Resolved::Error(marker))
    }

    #[must_use]
    pub fn at_positions(mut self, positions: Vec<u32>) -> Self {
        self.positions = positions;
        self
    }

    /// Extend an error's source path with the fact it was read through.
    #[must_use]
    pub fn observed_at(self, subject: &Subject, property: &Subject) -> Self {
        match self.value {
            Resolved::Error(marker) => Self {
                value: Resolved::Error(marker.observed(subject, property)),
                positions: self.positions,
            },
            _ => self,
        }
    }
}

/// Resolve the value slot of a stored fact.
pub fn resolve_fact(
    ctx: &EvalContext<'_>,
    fact: &Fact,
) -> Result<Vec<Resolution>, QuintetError> {
    resolve_value(
        ctx,
        &fact.target,
        &fact.property,
        &fact.operator,
        &fact.value,
        AccessFilter::is_array(&fact.meta),
    )
}

/// Resolve a value as if it were assigned to `target/property`.
///
/// - Requirement and tombstone values come back verbatim as patterns
/// - Computation subjects are computed, possibly to several values
/// - Paths read the current value(s) of the referenced property; with
///   `all`, every live element
/// - `?subject` values (and `?=` assignments) yield the evaluated targets
/// - An unbound variable in assignment position poisons
pub fn resolve_value(
    ctx: &EvalContext<'_>,
    target: &Subject,
    property: &Subject,
    operator: &Operator,
    value: &Value,
    all: bool,
) -> Result<Vec<Resolution>, QuintetError> {
    if !operator.is_assignment() {
        return Ok(vec![Resolution::new(Resolved::Pattern(value.clone()))]);
    }
    let resolutions = match value {
        Value::Error(marker) => vec![Resolution::error(marker.as_ref().clone())],
        Value::Evaluate(query) => reverse(ctx, query)?,
        Value::Subject(query) if *operator == Operator::ReverseEvaluate => reverse(ctx, query)?,
        Value::Subject(subject) if compute::is_computation(&ctx.snapshot, subject) => {
            compute::compute(ctx, subject)
                .into_iter()
                .map(|resolution| validate_virtual(ctx, target, property, resolution))
                .collect()
        }
        Value::Subject(subject) => vec![Resolution::new(Resolved::Value(subject.clone()))],
        Value::Path {
            subject,
            property: referenced,
        } => read_values(ctx, subject, referenced, all)?
            .into_iter()
            .map(|resolution| validate_virtual(ctx, target, property, resolution))
            .collect(),
        Value::Variable(variable) => vec![Resolution::error(
            ErrorMarker::new(
                ErrorKind::UnboundVariable,
                format!("{variable} has no binding"),
            )
            .at(target, property, None),
        )],
        Value::Wildcard => vec![Resolution::new(Resolved::Pattern(Value::Wildcard))],
    };
    Ok(resolutions)
}

/// Check a virtual value against the rules of the property it is read
/// through. Violations poison; earlier failures pass through.
fn validate_virtual(
    ctx: &EvalContext<'_>,
    target: &Subject,
    property: &Subject,
    resolution: Resolution,
) -> Resolution {
    let violation = match &resolution.value {
        Resolved::Value(value) => Validator::check_subject(&ctx.snapshot, property, value)
            .map(|violation| violation.into_marker(target, property, value)),
        _ => None,
    };
    match violation {
        Some(marker) => Resolution {
            value: Resolved::Error(marker),
            positions: resolution.positions,
        },
        None => resolution.observed_at(target, property),
    }
}

/// Current values of `subject/property` as seen by this context.
///
/// Re-reading a property while it is being resolved poisons with a cycle
/// marker instead of recursing.
pub fn read_values(
    ctx: &EvalContext<'_>,
    subject: &Subject,
    property: &Subject,
    all: bool,
) -> Result<Vec<Resolution>, QuintetError> {
    let _guard = match ctx.enter(Frame::Read(subject.clone(), property.clone())) {
        Ok(guard) => guard,
        Err(error) => return Ok(vec![Resolution::error(cycle_marker(&error))]),
    };
    let mut values = Vec::new();
    for fact in ctx.snapshot.lookup(subject, property, all) {
        if fact.operator.is_assignment() && ctx.visible(fact) {
            values.extend(resolve_fact(ctx, fact)?);
        }
    }
    Ok(values)
}

/// `?=`: the targets that satisfy `query`, one value each.
fn reverse(ctx: &EvalContext<'_>, query: &Subject) -> Result<Vec<Resolution>, QuintetError> {
    match nested_targets(ctx, query, &Bindings::new()) {
        Ok(targets) => Ok(targets
            .into_iter()
            .enumerate()
            .map(|(index, target)| {
                Resolution::new(Resolved::Value(target)).at_positions(vec![index as u32])
            })
            .collect()),
        Err(
            error @ (QuintetError::CyclicEvaluation(_)
            | QuintetError::EvaluationDepthExceeded(_)),
        ) => Ok(vec![Resolution::error(cycle_marker(&error))]),
        Err(error) => Err(error),
    }
}

fn nested_targets(
    ctx: &EvalContext<'_>,
    query: &Subject,
    bindings: &Bindings,
) -> Result<Vec<Subject>, QuintetError> {
    let key = (query.clone(), bindings.clone());
    if let Some(targets) = ctx.nested.borrow().get(&key) {
        return Ok(targets.clone());
    }
    let targets = evaluate(ctx, query, bindings, None)?.targets();
    ctx.nested.borrow_mut().insert(key, targets.clone());
    Ok(targets)
}

fn to_resolved_fact(fact: &Fact, resolution: Resolution) -> ResolvedFact {
    ResolvedFact {
        fact: fact.id,
        target: fact.target.clone(),
        property: fact.property.clone(),
        operator: fact.operator.clone(),
        value: resolution.value,
        meta: fact.meta.clone(),
        slot: fact.slot,
        positions: resolution.positions,
        created_at: fact.created_at,
    }
}

fn push_resolved(
    ctx: &EvalContext<'_>,
    fact: &Fact,
    out: &mut Vec<ResolvedFact>,
) -> Result<(), QuintetError> {
    for resolution in resolve_fact(ctx, fact)? {
        if ctx.options.force || !resolution.value.is_error() {
            out.push(to_resolved_fact(fact, resolution));
        }
    }
    Ok(())
}

// =============================================================================
// LITERAL MODE
// =============================================================================

/// Stored facts of `target` with virtual values resolved.
///
/// Newest per (property, slot) unless the options ask for `all`. Invisible
/// facts are absent; poisoned values are absent unless forced.
pub fn literal(ctx: &EvalContext<'_>, target: &Subject) -> Result<Vec<ResolvedFact>, QuintetError> {
    let mut out = Vec::new();
    for fact in ctx.snapshot.target_facts(target, ctx.options.all) {
        if ctx.visible(fact) && AccessFilter::shows_property(fact, &ctx.options) {
            push_resolved(ctx, fact, &mut out)?;
        }
    }
    Ok(out)
}

/// Resolved facts of one `target/property` pair.
pub fn read(
    ctx: &EvalContext<'_>,
    target: &Subject,
    property: &Subject,
) -> Result<Vec<ResolvedFact>, QuintetError> {
    let mut out = Vec::new();
    for fact in ctx.snapshot.lookup(target, property, ctx.options.all) {
        if ctx.visible(fact) {
            push_resolved(ctx, fact, &mut out)?;
        }
    }
    Ok(out)
}

// =============================================================================
// MATCH PREDICATES
// =============================================================================

/// How a requirement compares a candidate's stored fact with its expected
/// value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchPredicate {
    /// `==`, satisfied by `=` and `?=` facts.
    Equal,
    /// `error::equals`, satisfied by poisoned assignments of a given kind.
    ErrorEquals,
    /// A domain predicate such as `says`, satisfied by facts using the same
    /// predicate.
    Custom(Subject),
}

/// Result of matching one stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(Bindings),
    Mismatch,
    /// A variable was already bound to a different subject.
    Conflict,
}

impl MatchPredicate {
    /// Predicate for a requirement operator; `None` for assignments and
    /// tombstones.
    #[must_use]
    pub fn from_operator(operator: &Operator) -> Option<Self> {
        match operator {
            Operator::Equal => Some(Self::Equal),
            Operator::Predicate(name) if name.is_symbol(vocab::ERROR_EQUALS) => {
                Some(Self::ErrorEquals)
            }
            Operator::Predicate(name) => Some(Self::Custom(name.clone())),
            Operator::Assign | Operator::ReverseEvaluate | Operator::Retract => None,
        }
    }

    /// Operator compatibility with a stored fact.
    #[must_use]
    pub fn accepts(&self, stored: &Operator) -> bool {
        match self {
            Self::Equal | Self::ErrorEquals => stored.is_assignment(),
            Self::Custom(name) => matches!(stored, Operator::Predicate(other) if other == name),
        }
    }

    /// Match a resolved stored value against the expected value.
    pub fn matches(
        &self,
        ctx: &EvalContext<'_>,
        stored: &Operator,
        value: &Resolved,
        expected: &Value,
        bindings: &Bindings,
    ) -> Result<MatchOutcome, QuintetError> {
        if !self.accepts(stored) {
            return Ok(MatchOutcome::Mismatch);
        }
        match (self, value) {
            (Self::Equal, Resolved::Value(actual))
            | (Self::Custom(_), Resolved::Value(actual))
            | (Self::Custom(_), Resolved::Pattern(Value::Subject(actual))) => {
                unify(ctx, actual, expected, bindings)
            }
            (Self::ErrorEquals, Resolved::Error(marker)) => {
                unify(ctx, &marker.kind.subject(), expected, bindings)
            }
            _ => Ok(MatchOutcome::Mismatch),
        }
    }
}

/// Unify one concrete subject with an expected value.
pub fn unify(
    ctx: &EvalContext<'_>,
    actual: &Subject,
    expected: &Value,
    bindings: &Bindings,
) -> Result<MatchOutcome, QuintetError> {
    let matched = |hit: bool| {
        if hit {
            MatchOutcome::Matched(bindings.clone())
        } else {
            MatchOutcome::Mismatch
        }
    };
    Ok(match expected {
        Value::Subject(subject) => matched(subject == actual),
        Value::Wildcard => matched(true),
        Value::Variable(variable) => match bindings.with(variable, actual) {
            Some(extended) => MatchOutcome::Matched(extended),
            None => MatchOutcome::Conflict,
        },
        Value::Evaluate(query) => matched(nested_targets(ctx, query, bindings)?.contains(actual)),
        Value::Path { subject, property } => matched(
            read_values(ctx, subject, property, false)?
                .iter()
                .any(|resolution| resolution.value.as_value() == Some(actual)),
        ),
        Value::Error(_) => MatchOutcome::Mismatch,
    })
}

// =============================================================================
// EVALUATION MODE
// =============================================================================

/// One satisfying candidate under one binding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub target: Subject,
    pub bindings: Bindings,
    /// The candidate facts that satisfied each requirement, in requirement
    /// order.
    pub facts: Vec<ResolvedFact>,
}

/// Result of `evaluate`: solutions in candidate discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub solutions: Vec<Solution>,
}

impl Evaluation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    /// Satisfying targets in discovery order, each once.
    #[must_use]
    pub fn targets(&self) -> Vec<Subject> {
        let mut seen = BTreeSet::new();
        self.solutions
            .iter()
            .filter(|solution| seen.insert(&solution.target))
            .map(|solution| solution.target.clone())
            .collect()
    }

    /// Matching facts of every solution, each stored value once.
    #[must_use]
    pub fn facts(&self) -> Vec<ResolvedFact> {
        let mut seen = BTreeSet::new();
        self.solutions
            .iter()
            .flat_map(|solution| solution.facts.iter())
            .filter(|fact| seen.insert((fact.fact, fact.positions.clone(), fact.value.clone())))
            .cloned()
            .collect()
    }
}

struct Requirement<'f> {
    fact: &'f Fact,
    predicate: MatchPredicate,
    array: bool,
}

fn requirements<'a>(ctx: &EvalContext<'a>, target: &Subject) -> Vec<Requirement<'a>> {
    ctx.snapshot
        .target_facts(target, false)
        .into_iter()
        .filter(|fact| ctx.visible(fact))
        .filter_map(|fact| {
            MatchPredicate::from_operator(&fact.operator).map(|predicate| Requirement {
                fact,
                predicate,
                array: AccessFilter::is_array(&fact.meta),
            })
        })
        .collect()
}

/// The requirement facts that make up `target`'s query.
pub(crate) fn requirement_facts(ctx: &EvalContext<'_>, target: &Subject) -> Vec<Fact> {
    requirements(ctx, target)
        .into_iter()
        .map(|requirement| requirement.fact.clone())
        .collect()
}

/// Candidates for a query: targets of facts using the first requirement's
/// property, in assertion order. The query subject never matches itself.
fn discover(ctx: &EvalContext<'_>, query: &Subject, first: &Requirement<'_>) -> Vec<Subject> {
    let mut seen = BTreeSet::new();
    let mut candidates = Vec::new();
    for fact in ctx.snapshot.with_property(&first.fact.property) {
        if fact.target == *query || !first.predicate.accepts(&fact.operator) || !ctx.visible(fact)
        {
            continue;
        }
        if seen.insert(&fact.target) {
            candidates.push(fact.target.clone());
        }
    }
    candidates
}

fn record(trace: &mut Option<&mut Trace>, event: ExplainEvent) {
    if let Some(trace) = trace.as_deref_mut() {
        trace.record(event);
    }
}

/// Evaluation mode: every candidate satisfying all of `target`'s
/// requirements under one consistent binding context.
///
/// A subject without requirements matches nothing. A `system::anyOf`
/// computation evaluates to the union of its inputs' solutions.
pub fn evaluate(
    ctx: &EvalContext<'_>,
    target: &Subject,
    bindings: &Bindings,
    mut trace: Option<&mut Trace>,
) -> Result<Evaluation, QuintetError> {
    let _guard = ctx.enter(Frame::Evaluate(target.clone()))?;
    if compute::operation_of(&ctx.snapshot, target).is_some_and(|op| op.is_symbol(vocab::ANY_OF)) {
        return any_of(ctx, target, bindings);
    }

    let requirements = requirements(ctx, target);
    let Some(first) = requirements.first() else {
        return Ok(Evaluation::default());
    };

    let mut evaluation = Evaluation::default();
    for candidate in discover(ctx, target, first) {
        record(
            &mut trace,
            ExplainEvent::CandidateConsidered {
                candidate: candidate.clone(),
            },
        );
        let mut found = Vec::new();
        solve(
            ctx,
            &candidate,
            &requirements,
            bindings.clone(),
            &mut Vec::new(),
            &mut found,
            trace.as_deref_mut(),
        )?;

        let before = evaluation.solutions.len();
        for (solved, facts) in found {
            let duplicate = evaluation.solutions[before..]
                .iter()
                .any(|solution| solution.bindings == solved);
            if !duplicate {
                evaluation.solutions.push(Solution {
                    target: candidate.clone(),
                    bindings: solved,
                    facts,
                });
            }
        }
        let accepted = evaluation.solutions.len() - before;
        record(
            &mut trace,
            if accepted > 0 {
                ExplainEvent::CandidateAccepted {
                    candidate,
                    solutions: accepted,
                }
            } else {
                ExplainEvent::CandidateRejected { candidate }
            },
        );
    }

    debug!(
        target_subject = %target,
        requirements = requirements.len(),
        solutions = evaluation.len(),
        "evaluated"
    );
    Ok(evaluation)
}

/// Depth-first search over the remaining requirements.
fn solve(
    ctx: &EvalContext<'_>,
    candidate: &Subject,
    requirements: &[Requirement<'_>],
    bindings: Bindings,
    matched: &mut Vec<ResolvedFact>,
    found: &mut Vec<(Bindings, Vec<ResolvedFact>)>,
    mut trace: Option<&mut Trace>,
) -> Result<(), QuintetError> {
    let Some((requirement, rest)) = requirements.split_first() else {
        found.push((bindings, matched.clone()));
        return Ok(());
    };

    let facts: Vec<&Fact> = ctx
        .snapshot
        .lookup(candidate, &requirement.fact.property, requirement.array)
        .into_iter()
        .filter(|fact| requirement.predicate.accepts(&fact.operator) && ctx.visible(fact))
        .collect();

    let mut outcome = if facts.is_empty() {
        Outcome::Rejected(Rejection::NotFound)
    } else {
        Outcome::Rejected(Rejection::ValueMismatch)
    };
    for fact in facts {
        for resolution in resolve_fact(ctx, fact)? {
            let result = requirement.predicate.matches(
                ctx,
                &fact.operator,
                &resolution.value,
                &requirement.fact.value,
                &bindings,
            )?;
            match result {
                MatchOutcome::Matched(extended) => {
                    outcome = Outcome::Passed;
                    matched.push(to_resolved_fact(fact, resolution));
                    solve(
                        ctx,
                        candidate,
                        rest,
                        extended,
                        matched,
                        found,
                        trace.as_deref_mut(),
                    )?;
                    matched.pop();
                }
                MatchOutcome::Conflict if outcome != Outcome::Passed => {
                    outcome = Outcome::Rejected(Rejection::BindingConflict);
                }
                MatchOutcome::Conflict | MatchOutcome::Mismatch => {}
            }
        }
    }

    record(
        &mut trace,
        ExplainEvent::RequirementChecked {
            candidate: candidate.clone(),
            requirement: requirement.fact.id,
            property: requirement.fact.property.clone(),
            outcome,
        },
    );
    Ok(())
}

/// OR over independently evaluated inputs; the first solution per target
/// wins.
fn any_of(
    ctx: &EvalContext<'_>,
    target: &Subject,
    bindings: &Bindings,
) -> Result<Evaluation, QuintetError> {
    let mut evaluation = Evaluation::default();
    for fact in compute::input_facts(ctx, target) {
        let query = match &fact.value {
            Value::Evaluate(query) | Value::Subject(query) if query.is_reference() => query,
            _ => continue,
        };
        for solution in evaluate(ctx, query, bindings, None)?.solutions {
            if !evaluation
                .solutions
                .iter()
                .any(|existing| existing.target == solution.target)
            {
                evaluation.solutions.push(solution);
            }
        }
    }
    Ok(evaluation)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FactStore;
    use crate::Statement;

    fn sym(name: &str) -> Subject {
        Subject::symbol(name)
    }

    fn text(value: &str) -> Subject {
        Subject::text(value)
    }

    fn with_ctx<R>(store: &FactStore, options: ReadOptions, f: impl FnOnce(&EvalContext<'_>) -> R) -> R {
        let hosts = HostRegistry::new();
        let config = EngineConfig::default();
        let ctx = EvalContext::new(store.snapshot(), &hosts, &config, options);
        f(&ctx)
    }

    fn person(store: &mut FactStore, name: &str, first: &str, last: &str) {
        store.append(Statement::assign(sym(name), sym("firstName"), text(first)));
        store.append(Statement::assign(sym(name), sym("lastName"), text(last)));
    }

    fn targets(store: &FactStore, query: &str) -> Vec<Subject> {
        with_ctx(store, ReadOptions::new(), |ctx| {
            evaluate(ctx, &sym(query), &Bindings::new(), None)
                .expect("evaluate")
                .targets()
        })
    }

    #[test]
    fn bindings_refuse_conflicting_values() {
        let variable = Variable::new("x");
        let bound = Bindings::new().with(&variable, &sym("a")).expect("bind");
        assert!(bound.with(&variable, &sym("a")).is_some());
        assert!(bound.with(&variable, &sym("b")).is_none());
    }

    #[test]
    fn zero_requirements_match_nothing() {
        let mut store = FactStore::new();
        person(&mut store, "p1", "Ann", "Lee");
        store.append(Statement::assign(sym("query"), sym("label"), text("x")));
        assert!(targets(&store, "query").is_empty());
    }

    #[test]
    fn shared_variable_forces_self_join() {
        let mut store = FactStore::new();
        person(&mut store, "p1", "Ann", "Lee");
        person(&mut store, "p2", "Bob", "Bob");
        person(&mut store, "p3", "Cy", "Dee");
        store.append(Statement::require(
            sym("same"),
            sym("firstName"),
            Value::variable("name"),
        ));
        store.append(Statement::require(
            sym("same"),
            sym("lastName"),
            Value::variable("name"),
        ));
        assert_eq!(targets(&store, "same"), vec![sym("p2")]);
    }

    #[test]
    fn conjunctive_requirements_in_discovery_order() {
        let mut store = FactStore::new();
        for (name, age, city) in [("a", 30, "x"), ("b", 30, "y"), ("c", 30, "x")] {
            store.append(Statement::assign(sym(name), sym("age"), Subject::int(age)));
            store.append(Statement::assign(sym(name), sym("city"), sym(city)));
        }
        store.append(Statement::require(sym("q"), sym("age"), Subject::int(30)));
        store.append(Statement::require(sym("q"), sym("city"), sym("x")));
        assert_eq!(targets(&store, "q"), vec![sym("a"), sym("c")]);
    }

    #[test]
    fn wildcard_is_existential() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("email"), text("a@x")));
        store.append(Statement::assign(sym("b"), sym("phone"), text("1")));
        store.append(Statement::require(sym("q"), sym("email"), Value::Wildcard));
        assert_eq!(targets(&store, "q"), vec![sym("a")]);
    }

    #[test]
    fn nested_evaluation_matches_any_result() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("acme"), sym("kind"), sym("company")));
        store.append(Statement::assign(sym("ann"), sym("employer"), sym("acme")));
        store.append(Statement::assign(sym("bob"), sym("employer"), sym("solo")));
        store.append(Statement::require(sym("companies"), sym("kind"), sym("company")));
        store.append(Statement::require(
            sym("employed"),
            sym("employer"),
            Value::Evaluate(sym("companies")),
        ));
        assert_eq!(targets(&store, "employed"), vec![sym("ann")]);
    }

    #[test]
    fn most_recent_value_decides_match() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("state"), sym("open")));
        store.append(Statement::assign(sym("a"), sym("state"), sym("closed")));
        store.append(Statement::require(sym("q"), sym("state"), sym("open")));
        assert!(targets(&store, "q").is_empty());
    }

    #[test]
    fn array_requirement_matches_any_element() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("tag"), sym("red")).tagged(vocab::ALL));
        store.append(Statement::assign(sym("a"), sym("tag"), sym("blue")).tagged(vocab::ALL));
        store.append(Statement::require(sym("reds"), sym("tag"), sym("red")).tagged(vocab::ALL));
        store.append(Statement::require(sym("plain"), sym("tag"), sym("red")));
        assert_eq!(targets(&store, "reds"), vec![sym("a")]);
        assert!(targets(&store, "plain").is_empty());
    }

    #[test]
    fn custom_predicate_requires_same_operator() {
        let mut store = FactStore::new();
        store.append(Statement::new(
            sym("alice"),
            sym("quote"),
            Operator::predicate(vocab::SAYS),
            Value::Subject(text("hello")),
        ));
        store.append(Statement::assign(sym("bob"), sym("quote"), text("hello")));
        store.append(Statement::new(
            sym("speakers"),
            sym("quote"),
            Operator::predicate(vocab::SAYS),
            Value::variable("what"),
        ));
        assert_eq!(targets(&store, "speakers"), vec![sym("alice")]);
    }

    #[test]
    fn self_referencing_query_reports_cycle() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("p"), sym("x")));
        store.append(Statement::require(
            sym("loop"),
            sym("p"),
            Value::Evaluate(sym("loop")),
        ));
        let result = with_ctx(&store, ReadOptions::new(), |ctx| {
            evaluate(ctx, &sym("loop"), &Bindings::new(), None).map(|e| e.len())
        });
        assert!(matches!(result, Err(QuintetError::CyclicEvaluation(_))));
    }

    #[test]
    fn reverse_evaluate_assignment_reads_targets() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("done"), Subject::bool(true)));
        store.append(Statement::assign(sym("b"), sym("done"), Subject::bool(false)));
        store.append(Statement::require(sym("finished"), sym("done"), Subject::bool(true)));
        store.append(Statement::new(
            sym("list"),
            sym("items"),
            Operator::ReverseEvaluate,
            Value::Subject(sym("finished")),
        ));
        let values: Vec<Subject> = with_ctx(&store, ReadOptions::new(), |ctx| {
            read(ctx, &sym("list"), &sym("items")).expect("read")
        })
        .into_iter()
        .filter_map(|fact| fact.value().cloned())
        .collect();
        assert_eq!(values, vec![sym("a")]);
    }

    #[test]
    fn path_values_follow_the_referenced_property() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("foo"), sym("a"), Subject::int(1)));
        store.append(Statement::assign(
            sym("bar"),
            sym("copy"),
            Value::path(sym("foo"), sym("a")),
        ));
        store.append(Statement::assign(sym("foo"), sym("a"), Subject::int(2)));
        let facts = with_ctx(&store, ReadOptions::new(), |ctx| {
            literal(ctx, &sym("bar")).expect("literal")
        });
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].value(), Some(&Subject::int(2)));
    }

    #[test]
    fn literal_hides_poisoned_values_unless_forced() {
        let mut store = FactStore::new();
        let marker = ErrorMarker::new(ErrorKind::TypeMismatch, "bad");
        store.append(Statement::assign(
            sym("a"),
            sym("p"),
            Value::Error(Box::new(marker.clone())),
        ));
        let plain = with_ctx(&store, ReadOptions::new(), |ctx| {
            literal(ctx, &sym("a")).expect("literal")
        });
        assert!(plain.is_empty());
        let forced = with_ctx(&store, ReadOptions::new().forced(), |ctx| {
            literal(ctx, &sym("a")).expect("literal")
        });
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].value.as_error(), Some(&marker));
    }

    #[test]
    fn error_equals_matches_poisoned_values_by_kind() {
        let mut store = FactStore::new();
        store.append(Statement::assign(
            sym("a"),
            sym("total"),
            Value::Error(Box::new(ErrorMarker::new(ErrorKind::TypeMismatch, "bad"))),
        ));
        store.append(Statement::assign(sym("b"), sym("total"), Subject::int(3)));
        store.append(Statement::new(
            sym("broken"),
            sym("total"),
            Operator::predicate(vocab::ERROR_EQUALS),
            Value::Subject(ErrorKind::TypeMismatch.subject()),
        ));
        assert_eq!(targets(&store, "broken"), vec![sym("a")]);
    }

    #[test]
    fn trace_records_rejection_reasons() {
        let mut store = FactStore::new();
        store.append(Statement::assign(sym("a"), sym("age"), Subject::int(30)));
        store.append(Statement::assign(sym("b"), sym("age"), Subject::int(40)));
        store.append(Statement::require(sym("q"), sym("age"), Subject::int(30)));
        let mut trace = Trace::new();
        with_ctx(&store, ReadOptions::new(), |ctx| {
            evaluate(ctx, &sym("q"), &Bindings::new(), Some(&mut trace)).expect("evaluate");
        });
        assert!(trace.events().iter().any(|event| matches!(
            event,
            ExplainEvent::RequirementChecked {
                outcome: Outcome::Rejected(Rejection::ValueMismatch),
                ..
            }
        )));
        assert!(trace.events().contains(&ExplainEvent::CandidateAccepted {
            candidate: sym("a"),
            solutions: 1,
        }));
    }
}
