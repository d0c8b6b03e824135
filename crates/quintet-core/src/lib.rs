//! # quintet-core
//!
//! The fact store and unification engine for Quintet.
//!
//! Everything is a fact: `target/property operator value` plus a meta-set
//! and a logical timestamp. Facts are appended, never changed. Queries
//! either read stored facts (literal mode) or unify a subject's
//! requirements against every candidate (evaluation mode). Computations are
//! subjects too, resolved on read unless frozen with `#NOW`/`#SNAPSHOT`.
//! Triggers watch queries and append facts of their own.
//!
//! ## Architectural Constraints
//!
//! - One serialized append path; reads run against fixed snapshots
//! - Every operation receives its store handle; no global state
//! - Data-level failures are `ErrorMarker` values, never panics
//! - No async, no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod access;
pub mod compute;
pub mod config;
pub mod engine;
pub mod evaluator;
pub mod explain;
pub mod export;
pub mod formats;
pub mod primitives;
pub mod registry;
pub mod session;
pub mod storage;
pub mod store;
pub mod trigger;
pub mod types;
pub mod validation;
pub mod vocab;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ErrorKind, ErrorMarker, Fact, FactId, Float, Operator, PathStep, QueryMode, QuintetError,
    ReadOptions, Resolved, ResolvedFact, Statement, Subject, SubjectId, SubscriptionId, Timestamp,
    Value, Variable,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use access::{AccessFilter, TemporalBinding};
pub use compute::{Builtin, HostFunction, HostRegistry};
pub use config::{EngineConfig, FanOut, ValidationPolicy};
pub use engine::{Engine, EngineStatus};
pub use evaluator::{Bindings, EvalContext, Evaluation, MatchPredicate, Resolution, Solution};
pub use explain::{ExplainEvent, Explanation, Outcome, Rejection};
pub use registry::{RegistryState, SubjectRegistry};
pub use session::{Session, StorageBackend};
pub use storage::RedbJournal;
pub use store::{ChangeEvent, FactStore, Snapshot};
pub use trigger::{
    ConditionKind, Firing, Mutation, Subscription, SubscriptionSpec, SubscriptionState, Term,
    TriggerEngine,
};
pub use validation::{Validator, Violation};

// =============================================================================
// RE-EXPORTS: Formats and export
// =============================================================================

pub use export::{
    CanonicalHeader, canonical_checksum, export_canonical, import_canonical, verify_canonical,
};
pub use formats::{LogImage, PersistenceHeader, engine_from_bytes, engine_to_bytes};
