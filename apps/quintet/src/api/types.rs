//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API and the CLI.
//!
//! ## Value Notation
//!
//! | JSON                      | Meaning                          |
//! |---------------------------|----------------------------------|
//! | `"person1"`               | named subject                    |
//! | `{"text": "hello"}`       | text literal                     |
//! | `3`, `2.5`, `true`        | int, float, bool literal         |
//! | `{"generated": 7}`        | generated subject                |
//! | `"?name"`                 | variable (value position)        |
//! | `"*"`                     | wildcard (value position)        |
//! | `{"path": ["foo", "a"]}`  | current value of `foo/a`         |
//! | `{"eval": "query"}`       | nested evaluation (`?query`)     |

use quintet_core::{
    ConditionKind, EngineStatus, ErrorMarker, Fact, Firing, Mutation, Operator, QueryMode,
    QuintetError, Resolved, ResolvedFact, Statement, Subject, SubjectId, SubscriptionSpec, Term,
    Value, Variable,
    primitives::{MAX_BATCH_LENGTH, MAX_TEXT_LENGTH},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SUBJECTS AND VALUES
// =============================================================================

/// JSON form of a `Subject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectJson {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text { text: String },
    Generated { generated: u64 },
    Symbol(String),
}

impl SubjectJson {
    /// Convert to a subject, validating sizes.
    pub fn to_subject(&self) -> Result<Subject, QuintetError> {
        match self {
            Self::Int(value) => Ok(Subject::int(*value)),
            Self::Float(value) => Ok(Subject::float(*value)),
            Self::Bool(value) => Ok(Subject::bool(*value)),
            Self::Text { text } => {
                if text.len() > MAX_TEXT_LENGTH {
                    return Err(QuintetError::InvalidStatement(format!(
                        "Text length {} exceeds maximum {} bytes",
                        text.len(),
                        MAX_TEXT_LENGTH
                    )));
                }
                Ok(Subject::text(text))
            }
            Self::Generated { generated } => Ok(Subject::Generated(SubjectId(*generated))),
            Self::Symbol(name) => {
                if name.is_empty() {
                    return Err(QuintetError::InvalidStatement(
                        "Empty subject name".to_string(),
                    ));
                }
                if name.len() > MAX_TEXT_LENGTH {
                    return Err(QuintetError::InvalidStatement(format!(
                        "Subject name length {} exceeds maximum {} bytes",
                        name.len(),
                        MAX_TEXT_LENGTH
                    )));
                }
                Ok(Subject::symbol(name))
            }
        }
    }

    /// Term position: `?name` is a variable, anything else a subject.
    pub fn to_term(&self) -> Result<Term, QuintetError> {
        match self {
            Self::Symbol(name) if name.starts_with('?') && name.len() > 1 => {
                Ok(Term::var(&name[1..]))
            }
            other => other.to_subject().map(Term::Subject),
        }
    }
}

impl From<&Subject> for SubjectJson {
    fn from(subject: &Subject) -> Self {
        match subject {
            Subject::Symbol(name) => Self::Symbol(name.to_string()),
            Subject::Text(text) => Self::Text {
                text: text.to_string(),
            },
            Subject::Int(value) => Self::Int(*value),
            Subject::Float(value) => Self::Float(value.0),
            Subject::Bool(value) => Self::Bool(*value),
            Subject::Generated(id) => Self::Generated { generated: id.0 },
        }
    }
}

impl From<&str> for SubjectJson {
    fn from(name: &str) -> Self {
        Self::Symbol(name.to_string())
    }
}

/// JSON form of a fact value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueJson {
    Path { path: (SubjectJson, SubjectJson) },
    Evaluate { eval: SubjectJson },
    Subject(SubjectJson),
}

impl ValueJson {
    pub fn to_value(&self) -> Result<Value, QuintetError> {
        match self {
            Self::Path { path } => Ok(Value::path(path.0.to_subject()?, path.1.to_subject()?)),
            Self::Evaluate { eval } => Ok(Value::Evaluate(eval.to_subject()?)),
            Self::Subject(SubjectJson::Symbol(name)) if name == "*" => Ok(Value::Wildcard),
            Self::Subject(SubjectJson::Symbol(name)) if name.starts_with('?') && name.len() > 1 => {
                Ok(Value::Variable(Variable::new(&name[1..])))
            }
            Self::Subject(subject) => subject.to_subject().map(Value::Subject),
        }
    }
}

impl From<SubjectJson> for ValueJson {
    fn from(subject: SubjectJson) -> Self {
        Self::Subject(subject)
    }
}

/// Parse an operator: `=`, `==`, `?=`, `/=` or a predicate name.
pub fn parse_operator(operator: &str) -> Result<Operator, QuintetError> {
    match operator {
        "=" => Ok(Operator::Assign),
        "==" => Ok(Operator::Equal),
        "?=" => Ok(Operator::ReverseEvaluate),
        "/=" => Ok(Operator::Retract),
        "" => Err(QuintetError::InvalidStatement("Empty operator".to_string())),
        name => Ok(Operator::predicate(name)),
    }
}

fn default_operator() -> String {
    "=".to_string()
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Store status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub facts: usize,
    pub targets: usize,
    pub properties: usize,
    pub symbols: usize,
    pub texts: usize,
    pub generated: u64,
    pub subscriptions: usize,
    pub now: u64,
}

impl From<EngineStatus> for StatusResponse {
    fn from(status: EngineStatus) -> Self {
        Self {
            facts: status.facts,
            targets: status.targets,
            properties: status.properties,
            symbols: status.symbols,
            texts: status.texts,
            generated: status.generated,
            subscriptions: status.subscriptions,
            now: status.now.value(),
        }
    }
}

// =============================================================================
// ASSERT REQUEST/RESPONSE
// =============================================================================

/// One statement to append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementJson {
    pub target: SubjectJson,
    pub property: SubjectJson,
    #[serde(default = "default_operator")]
    pub operator: String,
    pub value: ValueJson,
    #[serde(default)]
    pub meta: Vec<SubjectJson>,
    #[serde(default)]
    pub slot: u32,
}

impl StatementJson {
    pub fn to_statement(&self) -> Result<Statement, QuintetError> {
        let mut statement = Statement::new(
            self.target.to_subject()?,
            self.property.to_subject()?,
            parse_operator(&self.operator)?,
            self.value.to_value()?,
        )
        .in_slot(self.slot);
        for tag in &self.meta {
            statement = statement.with_meta(tag.to_subject()?);
        }
        Ok(statement)
    }
}

/// Batch assert request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertRequest {
    pub statements: Vec<StatementJson>,
}

impl AssertRequest {
    /// Convert every statement, failing on the first malformed one.
    pub fn to_statements(&self) -> Result<Vec<Statement>, QuintetError> {
        if self.statements.is_empty() {
            return Err(QuintetError::InvalidStatement("Empty batch".to_string()));
        }
        if self.statements.len() > MAX_BATCH_LENGTH {
            return Err(QuintetError::InvalidStatement(format!(
                "Batch length {} exceeds maximum {}",
                self.statements.len(),
                MAX_BATCH_LENGTH
            )));
        }
        self.statements
            .iter()
            .map(StatementJson::to_statement)
            .collect()
    }
}

/// Batch assert response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssertResponse {
    pub success: bool,
    pub facts: Vec<u64>,
    pub error: Option<String>,
}

impl AssertResponse {
    pub fn success(facts: Vec<u64>) -> Self {
        Self {
            success: true,
            facts,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            facts: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// RETRACT REQUEST/RESPONSE
// =============================================================================

/// Retract request. A missing value withdraws every value of the property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractRequest {
    pub target: SubjectJson,
    pub property: SubjectJson,
    #[serde(default)]
    pub value: Option<ValueJson>,
}

impl RetractRequest {
    pub fn to_parts(&self) -> Result<(Subject, Subject, Value), QuintetError> {
        let value = match &self.value {
            Some(value) => value.to_value()?,
            None => Value::Wildcard,
        };
        Ok((self.target.to_subject()?, self.property.to_subject()?, value))
    }
}

/// Retract response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetractResponse {
    pub success: bool,
    pub fact: Option<u64>,
    pub error: Option<String>,
}

impl RetractResponse {
    pub fn success(fact: u64) -> Self {
        Self {
            success: true,
            fact: Some(fact),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            fact: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// QUERY REQUEST/RESPONSE
// =============================================================================

/// Query request. With `property` set, reads that single property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub subject: SubjectJson,
    #[serde(default = "default_mode")]
    pub mode: QueryMode,
    #[serde(default)]
    pub property: Option<SubjectJson>,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub as_of: Option<u64>,
    #[serde(default)]
    pub include_system_meta: bool,
}

fn default_mode() -> QueryMode {
    QueryMode::Evaluate
}

/// Poison marker as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorJson {
    pub kind: String,
    pub message: String,
    pub source_path: Vec<String>,
}

impl From<&ErrorMarker> for ErrorJson {
    fn from(marker: &ErrorMarker) -> Self {
        Self {
            kind: marker.kind.name().to_string(),
            message: marker.message.clone(),
            source_path: marker
                .source_path
                .iter()
                .map(|step| format!("{}/{}", step.subject, step.property))
                .collect(),
        }
    }
}

/// A fact as seen by a read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFactJson {
    pub fact: u64,
    pub target: SubjectJson,
    pub property: SubjectJson,
    pub operator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub value: Option<SubjectJson>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub error: Option<ErrorJson>,
    pub meta: Vec<SubjectJson>,
    pub slot: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub positions: Vec<u32>,
    pub created_at: u64,
}

impl From<&ResolvedFact> for ResolvedFactJson {
    fn from(fact: &ResolvedFact) -> Self {
        let (value, pattern, error) = match &fact.value {
            Resolved::Value(subject) => (Some(SubjectJson::from(subject)), None, None),
            Resolved::Pattern(value) => (None, Some(value.to_string()), None),
            Resolved::Error(marker) => (None, None, Some(ErrorJson::from(marker))),
        };
        Self {
            fact: fact.fact.0,
            target: SubjectJson::from(&fact.target),
            property: SubjectJson::from(&fact.property),
            operator: fact.operator.to_string(),
            value,
            pattern,
            error,
            meta: fact.meta.iter().map(SubjectJson::from).collect(),
            slot: fact.slot,
            positions: fact.positions.clone(),
            created_at: fact.created_at.value(),
        }
    }
}

/// One solution of an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionJson {
    pub target: SubjectJson,
    pub bindings: BTreeMap<String, SubjectJson>,
}

/// Query response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub success: bool,
    pub found: bool,
    pub targets: Vec<SubjectJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[serde(default)]
    pub solutions: Vec<SolutionJson>,
    pub facts: Vec<ResolvedFactJson>,
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn with_facts(facts: &[ResolvedFact]) -> Self {
        Self {
            success: true,
            found: !facts.is_empty(),
            targets: vec![],
            solutions: vec![],
            facts: facts.iter().map(ResolvedFactJson::from).collect(),
            error: None,
        }
    }

    pub fn with_evaluation(evaluation: &quintet_core::Evaluation) -> Self {
        let solutions = evaluation
            .solutions
            .iter()
            .map(|solution| SolutionJson {
                target: SubjectJson::from(&solution.target),
                bindings: bindings_json(&solution.bindings),
            })
            .collect();
        Self {
            success: true,
            found: !evaluation.is_empty(),
            targets: evaluation.targets().iter().map(SubjectJson::from).collect(),
            solutions,
            facts: evaluation
                .facts()
                .iter()
                .map(ResolvedFactJson::from)
                .collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            found: false,
            targets: vec![],
            solutions: vec![],
            facts: vec![],
            error: Some(msg.into()),
        }
    }
}

fn bindings_json(bindings: &quintet_core::Bindings) -> BTreeMap<String, SubjectJson> {
    bindings
        .iter()
        .map(|(variable, value)| (variable.name().to_string(), SubjectJson::from(value)))
        .collect()
}

// =============================================================================
// EXPLAIN REQUEST/RESPONSE
// =============================================================================

/// Explain request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub subject: SubjectJson,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub as_of: Option<u64>,
}

/// Explain response; the trace is the engine's own event list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub success: bool,
    pub requirements: Vec<String>,
    pub accepted: Vec<SubjectJson>,
    pub events: Vec<serde_json::Value>,
    pub error: Option<String>,
}

impl ExplainResponse {
    pub fn success(explanation: &quintet_core::Explanation) -> Self {
        Self {
            success: true,
            requirements: explanation
                .requirements
                .iter()
                .map(ToString::to_string)
                .collect(),
            accepted: explanation
                .accepted()
                .into_iter()
                .map(SubjectJson::from)
                .collect(),
            events: explanation
                .events
                .iter()
                .filter_map(|event| serde_json::to_value(event).ok())
                .collect(),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            requirements: vec![],
            accepted: vec![],
            events: vec![],
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// One step of a trigger program.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MutationJson {
    Assert {
        target: SubjectJson,
        property: SubjectJson,
        #[serde(default = "default_operator")]
        operator: String,
        value: ValueJson,
        #[serde(default)]
        meta: Vec<SubjectJson>,
    },
    Retract {
        target: SubjectJson,
        property: SubjectJson,
        #[serde(default)]
        value: Option<ValueJson>,
    },
}

impl MutationJson {
    pub fn to_mutation(&self) -> Result<Mutation, QuintetError> {
        match self {
            Self::Assert {
                target,
                property,
                operator,
                value,
                meta,
            } => Ok(Mutation::Assert {
                target: target.to_term()?,
                property: property.to_term()?,
                operator: parse_operator(operator)?,
                value: value.to_value()?,
                meta: meta
                    .iter()
                    .map(SubjectJson::to_subject)
                    .collect::<Result<_, _>>()?,
            }),
            Self::Retract {
                target,
                property,
                value,
            } => Ok(Mutation::Retract {
                target: target.to_term()?,
                property: property.to_term()?,
                value: match value {
                    Some(value) => value.to_value()?,
                    None => Value::Wildcard,
                },
            }),
        }
    }
}

/// Subscription request. The reader comes from the identity header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub query: Option<SubjectJson>,
    pub program: Vec<MutationJson>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub kind: ConditionKind,
}

impl SubscribeRequest {
    pub fn to_spec(&self, reader: Option<Subject>) -> Result<SubscriptionSpec, QuintetError> {
        let query = self
            .query
            .as_ref()
            .map(SubjectJson::to_subject)
            .transpose()?;
        let program = self
            .program
            .iter()
            .map(MutationJson::to_mutation)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SubscriptionSpec {
            query,
            program,
            limit: self.limit,
            kind: self.kind,
            reader,
        })
    }
}

/// Subscription response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub success: bool,
    pub id: Option<u64>,
    pub error: Option<String>,
}

impl SubscribeResponse {
    pub fn success(id: u64) -> Self {
        Self {
            success: true,
            id: Some(id),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(msg.into()),
        }
    }
}

/// A recorded firing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiringJson {
    pub subscription: u64,
    pub target: Option<SubjectJson>,
    pub bindings: BTreeMap<String, SubjectJson>,
    pub facts: Vec<u64>,
    pub errors: Vec<String>,
}

impl From<&Firing> for FiringJson {
    fn from(firing: &Firing) -> Self {
        Self {
            subscription: firing.subscription.0,
            target: firing.target.as_ref().map(SubjectJson::from),
            bindings: bindings_json(&firing.bindings),
            facts: firing.facts.iter().map(|id| id.0).collect(),
            errors: firing.errors.clone(),
        }
    }
}

/// Firings drained since the last call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiringsResponse {
    pub firings: Vec<FiringJson>,
}

// =============================================================================
// EXPORT
// =============================================================================

/// A stored fact, rendered for inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactJson {
    pub id: u64,
    pub target: SubjectJson,
    pub property: SubjectJson,
    pub operator: String,
    pub value: String,
    pub meta: Vec<SubjectJson>,
    pub slot: u32,
    pub created_at: u64,
}

impl From<&Fact> for FactJson {
    fn from(fact: &Fact) -> Self {
        Self {
            id: fact.id.0,
            target: SubjectJson::from(&fact.target),
            property: SubjectJson::from(&fact.property),
            operator: fact.operator.to_string(),
            value: fact.value.to_string(),
            meta: fact.meta.iter().map(SubjectJson::from).collect(),
            slot: fact.slot,
            created_at: fact.created_at.value(),
        }
    }
}

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub hash: Option<String>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: Vec<u8>, checksum: u64, hash: String) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &data,
            )),
            checksum: Some(checksum),
            hash: Some(hash),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            checksum: None,
            hash: None,
            error: Some(msg.into()),
        }
    }
}
