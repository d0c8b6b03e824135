//! # Explain
//!
//! Why a candidate did or did not satisfy a query.
//!
//! `explain` runs an ordinary evaluation with a `Trace` attached and returns
//! the recorded events next to the query's requirement facts.

use crate::evaluator::{self, Bindings, EvalContext, Solution};
use crate::{Fact, FactId, QuintetError, Subject};
use serde::{Deserialize, Serialize};

/// Why a requirement rejected a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The candidate has no visible, compatible fact for the property.
    NotFound,
    ValueMismatch,
    /// A variable was already bound to a different value.
    BindingConflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Rejected(Rejection),
}

/// One step of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExplainEvent {
    CandidateConsidered {
        candidate: Subject,
    },
    RequirementChecked {
        candidate: Subject,
        requirement: FactId,
        property: Subject,
        outcome: Outcome,
    },
    CandidateAccepted {
        candidate: Subject,
        solutions: usize,
    },
    CandidateRejected {
        candidate: Subject,
    },
}

/// Event sink threaded through `evaluate`.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    events: Vec<ExplainEvent>,
}

impl Trace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: ExplainEvent) {
        self.events.push(event);
    }

    #[must_use]
    pub fn events(&self) -> &[ExplainEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<ExplainEvent> {
        self.events
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub subject: Subject,
    pub requirements: Vec<Fact>,
    pub events: Vec<ExplainEvent>,
    pub solutions: Vec<Solution>,
}

impl Explanation {
    /// Candidates that ended up accepted.
    #[must_use]
    pub fn accepted(&self) -> Vec<&Subject> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ExplainEvent::CandidateAccepted { candidate, .. } => Some(candidate),
                _ => None,
            })
            .collect()
    }
}

/// Evaluate `subject` and report every decision taken on the way.
pub fn explain(ctx: &EvalContext<'_>, subject: &Subject) -> Result<Explanation, QuintetError> {
    let requirements = evaluator::requirement_facts(ctx, subject);
    let mut trace = Trace::new();
    let evaluation = evaluator::evaluate(ctx, subject, &Bindings::new(), Some(&mut trace))?;
    Ok(Explanation {
        subject: subject.clone(),
        requirements,
        events: trace.into_events(),
        solutions: evaluation.solutions,
    })
}
