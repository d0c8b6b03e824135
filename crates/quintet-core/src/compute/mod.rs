//! # Computational Engine
//!
//! Computes subjects that carry a `system::operation` fact.
//!
//! A computation's inputs are its other, non-`system::` facts: integer
//! properties are positional, symbol properties are named. Inputs are
//! resolved through the evaluator, so they may themselves be virtual,
//! `#ALL`-expanded or nested computations.
//!
//! ## Dispatch
//!
//! 1. `system::error::default` sees poisoned inputs and substitutes
//! 2. Aggregating built-ins splice `#ALL` inputs into one argument list
//! 3. Every other operation fans out over its `#ALL` inputs, producing one
//!    output per combination, tagged with the element positions
//!
//! Within one combination the operation is a built-in, a registered host
//! function, or a reusable (a subject with a `system::body`). Anything else
//! poisons with `UnknownOperation`.
//!
//! Failures are data: a poisoned input poisons the output, and every
//! failure is an `ErrorMarker` whose path starts at the root cause.

mod builtins;
mod formula;

pub use builtins::{Arg, Args, Builtin, Failure, Number};
pub use formula::Formula;

use crate::access::AccessFilter;
use crate::config::FanOut;
use crate::evaluator::{self, Bindings, EvalContext, Frame, Resolution};
use crate::primitives::MAX_FAN_OUT;
use crate::store::Snapshot;
use crate::vocab;
use crate::{ErrorKind, ErrorMarker, Fact, Resolved, Subject, Value, Variable};
use std::collections::BTreeMap;
use std::fmt;
use tracing::trace;

// =============================================================================
// HOST FUNCTIONS
// =============================================================================

/// A computation implemented outside the core, such as file access or
/// console output.
///
/// Called synchronously with the resolved inputs of one combination.
pub trait HostFunction: Send + Sync {
    fn call(&self, args: &Args) -> Result<Subject, ErrorMarker>;
}

impl<F> HostFunction for F
where
    F: Fn(&Args) -> Result<Subject, ErrorMarker> + Send + Sync,
{
    fn call(&self, args: &Args) -> Result<Subject, ErrorMarker> {
        self(args)
    }
}

/// Host functions by operation name.
#[derive(Default)]
pub struct HostRegistry {
    functions: BTreeMap<String, Box<dyn HostFunction>>,
}

impl fmt::Debug for HostRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HostRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the function behind an operation name.
    pub fn register(&mut self, name: impl Into<String>, function: impl HostFunction + 'static) {
        self.functions.insert(name.into(), Box::new(function));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn HostFunction> {
        self.functions.get(name).map(Box::as_ref)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

// =============================================================================
// COMPUTATION SUBJECTS
// =============================================================================

/// The operation a subject computes, if it is a computation.
#[must_use]
pub fn operation_of<'a>(snapshot: &Snapshot<'a>, subject: &Subject) -> Option<&'a Subject> {
    if !subject.is_reference() {
        return None;
    }
    snapshot.constant(subject, &Subject::symbol(vocab::OPERATION))
}

#[must_use]
pub fn is_computation(snapshot: &Snapshot<'_>, subject: &Subject) -> bool {
    operation_of(snapshot, subject).is_some()
}

/// Input facts of a computation: visible assignments outside the
/// `system::` namespace, newest per (property, slot).
pub fn input_facts<'a>(ctx: &EvalContext<'a>, subject: &Subject) -> Vec<&'a Fact> {
    ctx.snapshot()
        .target_facts(subject, false)
        .into_iter()
        .filter(|fact| {
            !fact.property.is_system() && fact.operator.is_assignment() && ctx.visible(fact)
        })
        .collect()
}

// =============================================================================
// INPUTS
// =============================================================================

#[derive(Debug, Clone)]
struct Input {
    name: Subject,
    elements: Vec<Resolved>,
    array: bool,
}

impl Input {
    fn is_positional(&self) -> bool {
        matches!(self.name, Subject::Int(_))
    }
}

fn gather_inputs(ctx: &EvalContext<'_>, subject: &Subject, scope: &Bindings) -> Vec<Input> {
    let mut inputs: Vec<Input> = Vec::new();
    for fact in input_facts(ctx, subject) {
        let array = AccessFilter::is_array(&fact.meta);
        if let Some(existing) = inputs.iter_mut().find(|input| input.name == fact.property) {
            // Further slots of a scalar input extend it; an array input
            // already holds every element.
            if !existing.array {
                existing.elements.extend(resolve_input(ctx, fact, scope));
            }
            continue;
        }
        let elements = if array {
            ctx.snapshot()
                .lookup(subject, &fact.property, true)
                .into_iter()
                .filter(|element| element.operator.is_assignment() && ctx.visible(element))
                .flat_map(|element| resolve_input(ctx, element, scope))
                .collect()
        } else {
            resolve_input(ctx, fact, scope)
        };
        inputs.push(Input {
            name: fact.property.clone(),
            elements,
            array,
        });
    }
    inputs.sort_by_key(|input| match input.name {
        Subject::Int(index) => (0, index),
        _ => (1, 0),
    });
    inputs
}

fn resolve_input(ctx: &EvalContext<'_>, fact: &Fact, scope: &Bindings) -> Vec<Resolved> {
    if let Value::Variable(variable) = &fact.value {
        return vec![match scope.get(variable) {
            Some(value) => Resolved::Value(value.clone()),
            None => Resolved::Error(
                ErrorMarker::new(
                    ErrorKind::UnboundVariable,
                    format!("{variable} is not bound in this scope"),
                )
                .at(&fact.target, &fact.property, None),
            ),
        }];
    }
    match evaluator::resolve_fact(ctx, fact) {
        Ok(resolutions) => resolutions
            .into_iter()
            .map(|resolution| resolution.value)
            .collect(),
        Err(error) => vec![Resolved::Error(
            evaluator::cycle_marker(&error).at(&fact.target, &fact.property, None),
        )],
    }
}

/// The value an argument slot receives, or the marker poisoning the call.
fn argument(subject: &Subject, input: &Input, element: &Resolved) -> Result<Arg, ErrorMarker> {
    match element {
        Resolved::Value(value) => Ok(Arg {
            name: input.name.clone(),
            value: value.clone(),
        }),
        Resolved::Error(marker) => Err(marker.clone().observed(subject, &input.name)),
        Resolved::Pattern(pattern) => Err(ErrorMarker::new(
            ErrorKind::MissingInput,
            format!("input holds the pattern {pattern}"),
        )
        .at(subject, &input.name, None)),
    }
}

// =============================================================================
// COMPUTE
// =============================================================================

/// Compute `subject` under this context's snapshot.
///
/// Never fails: every problem becomes a poisoned `Resolution`.
pub fn compute(ctx: &EvalContext<'_>, subject: &Subject) -> Vec<Resolution> {
    compute_in_scope(ctx, subject, &Bindings::new())
}

fn compute_in_scope(ctx: &EvalContext<'_>, subject: &Subject, scope: &Bindings) -> Vec<Resolution> {
    let _guard = match ctx.enter(Frame::Compute(subject.clone())) {
        Ok(guard) => guard,
        Err(error) => return vec![Resolution::error(evaluator::cycle_marker(&error))],
    };
    let Some(operation) = operation_of(&ctx.snapshot(), subject) else {
        return vec![Resolution::error(ErrorMarker::new(
            ErrorKind::MissingInput,
            format!("{subject} has no {}", vocab::OPERATION),
        ))];
    };

    let inputs = gather_inputs(ctx, subject, scope);
    let results = match operation.as_symbol().and_then(Builtin::from_name) {
        Some(Builtin::ErrorDefault) => error_default(&inputs),
        Some(builtin) if builtin.aggregates() => vec![Resolution::new(aggregate(
            subject, builtin, &inputs,
        ))],
        _ => fan_out(ctx, subject, operation, &inputs),
    };
    trace!(
        subject = %subject,
        operation = %operation,
        outputs = results.len(),
        "computed"
    );
    results
}

/// `system::error::default`: the source unless it is poisoned or absent,
/// otherwise the fallback. An `#ALL` source substitutes element-wise.
fn error_default(inputs: &[Input]) -> Vec<Resolution> {
    let find = |key: &str, index: i64| {
        inputs.iter().find(|input| {
            input.name.is_symbol(key) || input.name.as_int() == Some(index)
        })
    };
    let fallback = || {
        find("fallback", 1)
            .and_then(|input| input.elements.first().cloned())
            .unwrap_or_else(|| {
                Resolved::Error(ErrorMarker::new(
                    ErrorKind::MissingInput,
                    "missing input `fallback`",
                ))
            })
    };
    match find("source", 0) {
        Some(source) if !source.elements.is_empty() => source
            .elements
            .iter()
            .enumerate()
            .map(|(index, element)| {
                let value = match element {
                    Resolved::Value(_) => element.clone(),
                    Resolved::Error(_) | Resolved::Pattern(_) => fallback(),
                };
                let resolution = Resolution::new(value);
                if source.array {
                    resolution.at_positions(vec![index as u32])
                } else {
                    resolution
                }
            })
            .collect(),
        _ => vec![Resolution::new(fallback())],
    }
}

fn aggregate(subject: &Subject, builtin: Builtin, inputs: &[Input]) -> Resolved {
    let mut args = Args::default();
    for input in inputs {
        let elements = if input.is_positional() {
            &input.elements[..]
        } else {
            &input.elements[..input.elements.len().min(1)]
        };
        for element in elements {
            match argument(subject, input, element) {
                Ok(arg) if input.is_positional() => args.positional.push(arg),
                Ok(arg) => args.named.push(arg),
                Err(marker) => return Resolved::Error(marker),
            }
        }
    }
    match builtin.apply(&args) {
        Ok(value) => Resolved::Value(value),
        Err(failure) => Resolved::Error(failure.into_marker(subject)),
    }
}

fn fan_out(
    ctx: &EvalContext<'_>,
    subject: &Subject,
    operation: &Subject,
    inputs: &[Input],
) -> Vec<Resolution> {
    let arrays: Vec<usize> = inputs
        .iter()
        .enumerate()
        .filter(|(_, input)| input.array)
        .map(|(index, _)| index)
        .collect();
    let combos = match combinations(inputs, &arrays, ctx.config().fan_out) {
        Ok(combos) => combos,
        Err(marker) => return vec![Resolution::error(marker.at(subject, operation, None))],
    };

    let mut results = Vec::new();
    for combo in combos {
        let positions: Vec<u32> = arrays.iter().map(|&k| combo[k] as u32).collect();
        let args = match build_args(subject, inputs, &combo) {
            Ok(args) => args,
            Err(marker) => {
                results.push(Resolution::error(marker).at_positions(positions));
                continue;
            }
        };
        for value in invoke(ctx, subject, operation, &args) {
            results.push(Resolution::new(value).at_positions(positions.clone()));
        }
    }
    results
}

/// Element index per input for every call. Scalar inputs always use
/// element 0.
fn combinations(
    inputs: &[Input],
    arrays: &[usize],
    mode: FanOut,
) -> Result<Vec<Vec<usize>>, ErrorMarker> {
    let base = vec![0; inputs.len()];
    if arrays.is_empty() {
        return Ok(vec![base]);
    }
    let lengths: Vec<usize> = arrays.iter().map(|&k| inputs[k].elements.len()).collect();
    let too_many = || {
        ErrorMarker::new(
            ErrorKind::Arithmetic,
            format!("fan-out exceeds {MAX_FAN_OUT} combinations"),
        )
    };

    match mode {
        FanOut::Zip => {
            let count = lengths.iter().copied().min().unwrap_or(0);
            if count > MAX_FAN_OUT {
                return Err(too_many());
            }
            Ok((0..count)
                .map(|i| {
                    let mut combo = base.clone();
                    for &k in arrays {
                        combo[k] = i;
                    }
                    combo
                })
                .collect())
        }
        FanOut::CrossProduct => {
            let total = lengths
                .iter()
                .try_fold(1usize, |acc, &len| acc.checked_mul(len))
                .filter(|&total| total <= MAX_FAN_OUT)
                .ok_or_else(too_many)?;
            let mut combos = Vec::with_capacity(total);
            if total == 0 {
                return Ok(combos);
            }
            // Odometer: the last array input varies fastest.
            let mut cursor = vec![0usize; arrays.len()];
            loop {
                let mut combo = base.clone();
                for (slot, &k) in arrays.iter().enumerate() {
                    combo[k] = cursor[slot];
                }
                combos.push(combo);

                let mut slot = arrays.len();
                loop {
                    if slot == 0 {
                        return Ok(combos);
                    }
                    slot -= 1;
                    cursor[slot] += 1;
                    if cursor[slot] < lengths[slot] {
                        break;
                    }
                    cursor[slot] = 0;
                }
            }
        }
    }
}

fn build_args(subject: &Subject, inputs: &[Input], combo: &[usize]) -> Result<Args, ErrorMarker> {
    let mut args = Args::default();
    for (input, &index) in inputs.iter().zip(combo) {
        let Some(element) = input.elements.get(index) else {
            return Err(ErrorMarker::new(
                ErrorKind::MissingInput,
                format!("input {} has no value", input.name),
            )
            .at(subject, &input.name, None));
        };
        let arg = argument(subject, input, element)?;
        if input.is_positional() {
            args.positional.push(arg);
        } else {
            args.named.push(arg);
        }
    }
    Ok(args)
}

/// Run one call of `operation` with resolved arguments.
fn invoke(
    ctx: &EvalContext<'_>,
    subject: &Subject,
    operation: &Subject,
    args: &Args,
) -> Vec<Resolved> {
    if let Some(builtin) = operation.as_symbol().and_then(Builtin::from_name) {
        return vec![match builtin.apply(args) {
            Ok(value) => Resolved::Value(value),
            Err(failure) => Resolved::Error(failure.into_marker(subject)),
        }];
    }
    if let Some(host) = operation.as_symbol().and_then(|name| ctx.hosts().get(name)) {
        return vec![match host.call(args) {
            Ok(value) => Resolved::Value(value),
            Err(marker) => Resolved::Error(marker.at(subject, operation, None)),
        }];
    }
    let body = ctx
        .snapshot()
        .constant(operation, &Subject::symbol(vocab::BODY))
        .cloned();
    match body {
        Some(body) => reusable(ctx, subject, &body, args),
        None => vec![Resolved::Error(
            ErrorMarker::new(
                ErrorKind::UnknownOperation,
                format!("no built-in, host function or body for {operation}"),
            )
            .at(subject, &Subject::symbol(vocab::OPERATION), Some(operation)),
        )],
    }
}

/// Compute a reusable's body in a fresh scope holding only the call's
/// arguments: `?name` for named inputs, `?0`, `?1`, ... for positional ones.
fn reusable(ctx: &EvalContext<'_>, subject: &Subject, body: &Subject, args: &Args) -> Vec<Resolved> {
    let scope: Bindings = args
        .positional
        .iter()
        .chain(args.named.iter())
        .map(|arg| {
            (
                Variable::new(arg.name.to_plain_string()),
                arg.value.clone(),
            )
        })
        .collect();
    compute_in_scope(ctx, body, &scope)
        .into_iter()
        .map(|resolution| match resolution.value {
            Resolved::Error(marker) => {
                Resolved::Error(marker.observed(subject, &Subject::symbol(vocab::OPERATION)))
            }
            value => value,
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
