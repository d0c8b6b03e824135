//! # Core Type Definitions
//!
//! This module contains the data model shared by every component:
//! - Subjects and identifiers (`Subject`, `SubjectId`, `Float`)
//! - Fact shape (`Fact`, `FactId`, `Timestamp`, `Operator`, `Value`, `Statement`)
//! - Data-level failures (`ErrorMarker`, `ErrorKind`, `PathStep`)
//! - Read results (`Resolved`, `ResolvedFact`, `ReadOptions`)
//! - Error types (`QuintetError`)
//!
//! ## Ordering Guarantees
//!
//! Every type used as a map key implements `Ord`, so indices can use
//! `BTreeMap`/`BTreeSet` and iterate deterministically.

use crate::vocab;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Identity of a generated subject. Two generated subjects are equal only if
/// they carry the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub u64);

/// Position of a fact in the append-only log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FactId(pub u64);

/// Logical timestamp. Every append advances it by exactly one, so it totally
/// orders the facts of a store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The timestamp before any fact exists.
    pub const ORIGIN: Self = Self(0);

    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// Identifier returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// =============================================================================
// SUBJECT
// =============================================================================

/// A float with a total order, so it can live inside `Subject` keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Float(pub f64);

impl PartialEq for Float {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Float {}

impl PartialOrd for Float {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Float {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Float {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// An atomic value: the indivisible unit of the data model.
///
/// Literals (`Symbol`, `Text`, `Int`, `Float`, `Bool`) compare by value.
/// `Generated` subjects compare by identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Subject {
    /// A named subject such as `person1` or `system::sum`.
    Symbol(Arc<str>),
    /// A string literal.
    Text(Arc<str>),
    Int(i64),
    Float(Float),
    Bool(bool),
    /// An opaque identifier handed out by the registry.
    Generated(SubjectId),
}

impl Subject {
    #[must_use]
    pub fn symbol(name: &str) -> Self {
        Self::Symbol(Arc::from(name))
    }

    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::Text(Arc::from(value))
    }

    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::Int(value)
    }

    #[must_use]
    pub const fn float(value: f64) -> Self {
        Self::Float(Float(value))
    }

    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Bool(value)
    }

    /// The symbol name, if this is a named subject.
    #[must_use]
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Self::Symbol(name) => Some(name),
            _ => None,
        }
    }

    /// Check whether this subject is the named symbol `name`.
    #[must_use]
    pub fn is_symbol(&self, name: &str) -> bool {
        self.as_symbol() == Some(name)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Only named and generated subjects can carry facts describing a
    /// computation; literals are plain data.
    #[must_use]
    pub const fn is_reference(&self) -> bool {
        matches!(self, Self::Symbol(_) | Self::Generated(_))
    }

    /// Symbols in the `system::` namespace.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.as_symbol()
            .is_some_and(|name| name.starts_with(vocab::SYSTEM_NAMESPACE))
    }

    /// Short name of the subject kind, used in type-mismatch messages and
    /// `system::property::type` validation.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Symbol(_) => "symbol",
            Self::Text(_) => "text",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Generated(_) => "generated",
        }
    }

    /// Truthiness used by trigger conditions and `system::anyOf`.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => value.0 != 0.0,
            Self::Text(value) => !value.is_empty(),
            Self::Symbol(_) | Self::Generated(_) => true,
        }
    }

    /// Text rendering without quotes, used by `concat` and `format`.
    #[must_use]
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Symbol(value) | Self::Text(value) => value.to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(name) => write!(f, "{}", name),
            Self::Text(value) => write!(f, "{:?}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{:?}", value.0),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Generated(id) => write!(f, "@{}", id.0),
        }
    }
}

// =============================================================================
// VALUE
// =============================================================================

/// A unification variable, written `?name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Variable(pub String);

impl Variable {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// The value slot of a fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    /// A constant subject. When the subject describes a computation the
    /// value is virtual and recomputed on every read.
    Subject(Subject),
    /// The current value of `subject/property`.
    Path { subject: Subject, property: Subject },
    /// A unification variable (`?x`).
    Variable(Variable),
    /// A nested evaluation-mode subject (`?subject`).
    Evaluate(Subject),
    /// Existential match (`*`).
    Wildcard,
    /// A poisoned value.
    Error(Box<ErrorMarker>),
}

impl Value {
    #[must_use]
    pub fn subject(subject: Subject) -> Self {
        Self::Subject(subject)
    }

    #[must_use]
    pub fn variable(name: &str) -> Self {
        Self::Variable(Variable::new(name))
    }

    #[must_use]
    pub fn path(subject: Subject, property: Subject) -> Self {
        Self::Path { subject, property }
    }

    #[must_use]
    pub fn as_subject(&self) -> Option<&Subject> {
        match self {
            Self::Subject(subject) => Some(subject),
            _ => None,
        }
    }

    /// Variables, nested evaluations and wildcards only make sense on the
    /// expected side of a requirement.
    #[must_use]
    pub const fn is_pattern(&self) -> bool {
        matches!(self, Self::Variable(_) | Self::Evaluate(_) | Self::Wildcard)
    }
}

impl From<Subject> for Value {
    fn from(subject: Subject) -> Self {
        Self::Subject(subject)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject(subject) => write!(f, "{}", subject),
            Self::Path { subject, property } => write!(f, "{}/{}", subject, property),
            Self::Variable(variable) => write!(f, "{}", variable),
            Self::Evaluate(subject) => write!(f, "?{}", subject),
            Self::Wildcard => write!(f, "*"),
            Self::Error(marker) => write!(f, "<error {}>", marker.kind.name()),
        }
    }
}

// =============================================================================
// OPERATOR
// =============================================================================

/// Fact operator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// `=`
    Assign,
    /// `==`
    Equal,
    /// `?=`
    ReverseEvaluate,
    /// `/=`: tombstone withdrawing an earlier (target, property, value).
    Retract,
    /// Domain predicates such as `says` or `error::equals`.
    Predicate(Subject),
}

impl Operator {
    /// Requirement operators make a fact part of its target's query.
    #[must_use]
    pub const fn is_requirement(&self) -> bool {
        matches!(self, Self::Equal | Self::Predicate(_))
    }

    /// Assignment-shaped operators produce readable values.
    #[must_use]
    pub const fn is_assignment(&self) -> bool {
        matches!(self, Self::Assign | Self::ReverseEvaluate)
    }

    #[must_use]
    pub fn predicate(name: &str) -> Self {
        Self::Predicate(Subject::symbol(name))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign => write!(f, "="),
            Self::Equal => write!(f, "=="),
            Self::ReverseEvaluate => write!(f, "?="),
            Self::Retract => write!(f, "/="),
            Self::Predicate(name) => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// FACT
// =============================================================================

/// The only composite record. Facts are immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub target: Subject,
    pub property: Subject,
    pub operator: Operator,
    pub value: Value,
    /// Fixed at creation; extending it means appending a new fact.
    pub meta: BTreeSet<Subject>,
    /// Array position. Default reads keep the newest live fact per slot.
    pub slot: u32,
    pub created_at: Timestamp,
}

impl Fact {
    /// Check whether the meta-set contains the named tag.
    #[must_use]
    pub fn has_tag(&self, name: &str) -> bool {
        self.meta.iter().any(|tag| tag.is_symbol(name))
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} {} {}",
            self.target, self.property, self.operator, self.value
        )
    }
}

/// An assignment-shaped statement waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub target: Subject,
    pub property: Subject,
    pub operator: Operator,
    pub value: Value,
    #[serde(default)]
    pub meta: BTreeSet<Subject>,
    #[serde(default)]
    pub slot: u32,
}

impl Statement {
    #[must_use]
    pub fn new(target: Subject, property: Subject, operator: Operator, value: Value) -> Self {
        Self {
            target,
            property,
            operator,
            value,
            meta: BTreeSet::new(),
            slot: 0,
        }
    }

    /// `target/property = value`
    #[must_use]
    pub fn assign(target: Subject, property: Subject, value: impl Into<Value>) -> Self {
        Self::new(target, property, Operator::Assign, value.into())
    }

    /// `target/property == expected`
    #[must_use]
    pub fn require(target: Subject, property: Subject, expected: impl Into<Value>) -> Self {
        Self::new(target, property, Operator::Equal, expected.into())
    }

    #[must_use]
    pub fn with_meta(mut self, tag: Subject) -> Self {
        self.meta.insert(tag);
        self
    }

    /// Shorthand for tagging with a well-known symbol such as `#ALL`.
    #[must_use]
    pub fn tagged(self, name: &str) -> Self {
        self.with_meta(Subject::symbol(name))
    }

    #[must_use]
    pub fn in_slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self
    }
}

// =============================================================================
// ERROR MARKER
// =============================================================================

/// Kind of data-level failure carried by an `ErrorMarker`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    TypeMismatch,
    ValidationViolation,
    /// Division by zero and integer overflow.
    Arithmetic,
    MissingInput,
    UnknownOperation,
    UnboundVariable,
    Cycle,
    Format,
    Host,
}

impl ErrorKind {
    /// Short name, also the suffix of the error's well-known subject.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::TypeMismatch => "typeMismatch",
            Self::ValidationViolation => "validationViolation",
            Self::Arithmetic => "arithmetic",
            Self::MissingInput => "missingInput",
            Self::UnknownOperation => "unknownOperation",
            Self::UnboundVariable => "unboundVariable",
            Self::Cycle => "cycle",
            Self::Format => "format",
            Self::Host => "host",
        }
    }

    /// The subject `error::equals` requirements compare against.
    #[must_use]
    pub fn subject(self) -> Subject {
        Subject::symbol(&format!("{}{}", vocab::ERROR_PREFIX, self.name()))
    }

    pub const ALL: [Self; 9] = [
        Self::TypeMismatch,
        Self::ValidationViolation,
        Self::Arithmetic,
        Self::MissingInput,
        Self::UnknownOperation,
        Self::UnboundVariable,
        Self::Cycle,
        Self::Format,
        Self::Host,
    ];
}

/// One hop of an error's provenance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathStep {
    pub subject: Subject,
    pub property: Subject,
    pub value: Option<Subject>,
}

/// Sentinel value for a poisoned computation.
///
/// The source path runs from the root cause to the point of observation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub kind: ErrorKind,
    pub message: String,
    pub source_path: Vec<PathStep>,
}

impl ErrorMarker {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source_path: Vec::new(),
        }
    }

    /// Append a provenance step.
    #[must_use]
    pub fn at(mut self, subject: &Subject, property: &Subject, value: Option<&Subject>) -> Self {
        self.source_path.push(PathStep {
            subject: subject.clone(),
            property: property.clone(),
            value: value.cloned(),
        });
        self
    }

    /// Record that the failure was observed through `subject/property`.
    ///
    /// Unlike `at`, a step equal to the last recorded one is not repeated.
    #[must_use]
    pub fn observed(self, subject: &Subject, property: &Subject) -> Self {
        let repeated = self
            .source_path
            .last()
            .is_some_and(|step| step.subject == *subject && step.property == *property);
        if repeated {
            self
        } else {
            self.at(subject, property, None)
        }
    }

    /// Same failure as `other`, ignoring where it was observed.
    #[must_use]
    pub fn same_cause(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message
    }
}

impl fmt::Display for ErrorMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

// =============================================================================
// READ RESULTS
// =============================================================================

/// A fact value after resolution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Resolved {
    Value(Subject),
    Error(ErrorMarker),
    /// Requirement patterns are returned verbatim.
    Pattern(Value),
}

impl Resolved {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Subject> {
        match self {
            Self::Value(subject) => Some(subject),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_error(&self) -> Option<&ErrorMarker> {
        match self {
            Self::Error(marker) => Some(marker),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// A stored fact as seen by a particular read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFact {
    /// The stored fact this result derives from.
    pub fact: FactId,
    pub target: Subject,
    pub property: Subject,
    pub operator: Operator,
    pub value: Resolved,
    pub meta: BTreeSet<Subject>,
    pub slot: u32,
    /// Input element positions when the value came from an `#ALL` fan-out.
    pub positions: Vec<u32>,
    pub created_at: Timestamp,
}

impl ResolvedFact {
    #[must_use]
    pub fn value(&self) -> Option<&Subject> {
        self.value.as_value()
    }
}

/// Options shared by every read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Identity checked by the access filter. `None` reads as anonymous.
    #[serde(default)]
    pub reader: Option<Subject>,
    /// `#FORCE`: bypass the access filter and poison suppression.
    #[serde(default)]
    pub force: bool,
    /// Return every live fact instead of the newest per slot.
    #[serde(default)]
    pub all: bool,
    /// Pin the snapshot. `None` fixes it at the start of the call.
    #[serde(default)]
    pub as_of: Option<Timestamp>,
    /// Include `system::` properties in literal reads.
    #[serde(default)]
    pub include_system_meta: bool,
}

impl ReadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn as_reader(mut self, reader: Subject) -> Self {
        self.reader = Some(reader);
        self
    }

    #[must_use]
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    #[must_use]
    pub fn all(mut self) -> Self {
        self.all = true;
        self
    }

    #[must_use]
    pub fn at(mut self, as_of: Timestamp) -> Self {
        self.as_of = Some(as_of);
        self
    }

    #[must_use]
    pub fn with_system_meta(mut self) -> Self {
        self.include_system_meta = true;
        self
    }
}

/// Query mode for `query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    Literal,
    Evaluate,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Quintet engine.
///
/// Data-level failures (type mismatches, poisoned inputs) are `ErrorMarker`
/// values, not `QuintetError`s. These errors cover malformed requests,
/// runaway recursion and storage failures.
#[derive(Debug, Error)]
pub enum QuintetError {
    /// The statement cannot be appended as given.
    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    /// A validation rule rejected the write (reject policy only).
    #[error("Validation rejected {property}: {message}")]
    ValidationRejected { property: Subject, message: String },

    /// Nested evaluation re-entered a subject already being evaluated.
    #[error("Cyclic evaluation of {0}")]
    CyclicEvaluation(Subject),

    /// Nested evaluation went deeper than the configured limit.
    #[error("Evaluation depth exceeded: {0}")]
    EvaluationDepthExceeded(usize),

    /// Trigger draining did not reach a fixed point.
    #[error("Trigger cascade did not settle after {0} rounds")]
    TriggerCascade(usize),

    /// The subscription request is malformed.
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    /// No subscription with this id exists.
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_compare_by_value() {
        assert_eq!(Subject::text("a"), Subject::text("a"));
        assert_eq!(Subject::float(1.5), Subject::float(1.5));
        assert_ne!(Subject::symbol("a"), Subject::text("a"));
        assert_ne!(Subject::int(1), Subject::float(1.0));
    }

    #[test]
    fn generated_subjects_compare_by_identity() {
        assert_eq!(
            Subject::Generated(SubjectId(4)),
            Subject::Generated(SubjectId(4))
        );
        assert_ne!(
            Subject::Generated(SubjectId(4)),
            Subject::Generated(SubjectId(5))
        );
    }

    #[test]
    fn float_total_order() {
        let mut values = [Subject::float(2.0), Subject::float(-1.0), Subject::float(0.5)];
        values.sort();
        assert_eq!(
            values,
            [Subject::float(-1.0), Subject::float(0.5), Subject::float(2.0)]
        );
    }

    #[test]
    fn system_namespace_detection() {
        assert!(Subject::symbol("system::sum").is_system());
        assert!(!Subject::symbol("person").is_system());
        assert!(!Subject::text("system::sum").is_system());
    }

    #[test]
    fn operator_classes() {
        assert!(Operator::Equal.is_requirement());
        assert!(Operator::predicate("says").is_requirement());
        assert!(Operator::Assign.is_assignment());
        assert!(Operator::ReverseEvaluate.is_assignment());
        assert!(!Operator::Retract.is_assignment());
    }

    #[test]
    fn error_marker_path_grows_toward_observer() {
        let marker = ErrorMarker::new(ErrorKind::TypeMismatch, "bad")
            .at(&Subject::symbol("calc"), &Subject::int(1), None)
            .at(&Subject::symbol("a"), &Subject::symbol("p"), None);
        assert_eq!(marker.source_path.len(), 2);
        assert_eq!(marker.source_path[0].subject, Subject::symbol("calc"));
        assert!(marker.same_cause(&ErrorMarker::new(ErrorKind::TypeMismatch, "bad")));
    }

    #[test]
    fn error_kind_subjects_are_namespaced() {
        assert_eq!(
            ErrorKind::TypeMismatch.subject(),
            Subject::symbol("system::error::typeMismatch")
        );
    }

    #[test]
    fn statement_builder_collects_meta() {
        let statement = Statement::assign(
            Subject::symbol("a"),
            Subject::symbol("p"),
            Subject::int(1),
        )
        .tagged(vocab::ALL)
        .in_slot(2);
        assert!(statement.meta.contains(&Subject::symbol("#ALL")));
        assert_eq!(statement.slot, 2);
    }
}
