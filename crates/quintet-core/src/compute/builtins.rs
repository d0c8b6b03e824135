//! Built-in operations and the numeric tower they share.
//!
//! Integer arithmetic stays integral and reports overflow; any float operand
//! promotes the result to a float.

#![allow(clippy::float_arithmetic)]

use crate::vocab;
use crate::{ErrorKind, ErrorMarker, Subject};
use std::cmp::Ordering;

// =============================================================================
// ARGUMENTS
// =============================================================================

/// One resolved input value, with the input property it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub name: Subject,
    pub value: Subject,
}

/// The resolved inputs of one call.
///
/// Positional inputs use integer properties and keep their index order;
/// named inputs use symbol properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Args {
    pub positional: Vec<Arg>,
    pub named: Vec<Arg>,
}

impl Args {
    #[must_use]
    pub fn named(&self, key: &str) -> Option<&Arg> {
        self.named.iter().find(|arg| arg.name.is_symbol(key))
    }

    /// A named input, falling back to the positional input at `index`.
    #[must_use]
    pub fn named_or_nth(&self, key: &str, index: usize) -> Option<&Arg> {
        self.named(key).or_else(|| self.positional.get(index))
    }

    /// Every input value, positional first.
    pub fn values(&self) -> impl Iterator<Item = &Subject> {
        self.positional
            .iter()
            .chain(self.named.iter())
            .map(|arg| &arg.value)
    }
}

/// Failure of a built-in, before it is attributed to a computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    /// The offending input, when one can be named.
    pub input: Option<Arg>,
}

impl Failure {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            input: None,
        }
    }

    pub(crate) fn on(mut self, arg: &Arg) -> Self {
        self.input = Some(arg.clone());
        self
    }

    /// Attribute the failure to `subject`, making it the root of the path.
    #[must_use]
    pub fn into_marker(self, subject: &Subject) -> ErrorMarker {
        let marker = ErrorMarker::new(self.kind, self.message);
        match &self.input {
            Some(arg) => marker.at(subject, &arg.name, Some(&arg.value)),
            None => marker.at(subject, &Subject::symbol(vocab::OPERATION), None),
        }
    }
}

fn missing(key: &str) -> Failure {
    Failure::new(ErrorKind::MissingInput, format!("missing input `{key}`"))
}

// =============================================================================
// NUMBERS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[must_use]
    pub fn of(subject: &Subject) -> Option<Self> {
        match subject {
            Subject::Int(value) => Some(Self::Int(*value)),
            Subject::Float(value) => Some(Self::Float(value.0)),
            _ => None,
        }
    }

    /// The numeric value of an argument, or a type mismatch naming it.
    pub(crate) fn of_arg(arg: &Arg) -> Result<Self, Failure> {
        Self::of(&arg.value).ok_or_else(|| {
            Failure::new(
                ErrorKind::TypeMismatch,
                format!("expected a number, got {} {}", arg.value.kind_name(), arg.value),
            )
            .on(arg)
        })
    }

    #[must_use]
    pub fn into_subject(self) -> Subject {
        match self {
            Self::Int(value) => Subject::int(value),
            Self::Float(value) => Subject::float(value),
        }
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    fn overflow() -> Failure {
        Failure::new(ErrorKind::Arithmetic, "integer overflow")
    }

    pub fn checked_add(self, other: Self) -> Result<Self, Failure> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_add(b).map(Self::Int).ok_or_else(Self::overflow),
            (a, b) => Ok(Self::Float(a.as_f64() + b.as_f64())),
        }
    }

    pub fn checked_sub(self, other: Self) -> Result<Self, Failure> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_sub(b).map(Self::Int).ok_or_else(Self::overflow),
            (a, b) => Ok(Self::Float(a.as_f64() - b.as_f64())),
        }
    }

    pub fn checked_mul(self, other: Self) -> Result<Self, Failure> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_mul(b).map(Self::Int).ok_or_else(Self::overflow),
            (a, b) => Ok(Self::Float(a.as_f64() * b.as_f64())),
        }
    }

    /// Exact integer quotients stay integral; `7 / 2` is `3.5`.
    pub fn checked_div(self, other: Self) -> Result<Self, Failure> {
        if other.is_zero() {
            return Err(Failure::new(ErrorKind::Arithmetic, "division by zero"));
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => match a.checked_rem(b) {
                Some(0) => a.checked_div(b).map(Self::Int).ok_or_else(Self::overflow),
                Some(_) => Ok(Self::Float(a as f64 / b as f64)),
                None => Err(Self::overflow()),
            },
            (a, b) => Ok(Self::Float(a.as_f64() / b.as_f64())),
        }
    }

    pub fn checked_rem(self, other: Self) -> Result<Self, Failure> {
        if other.is_zero() {
            return Err(Failure::new(ErrorKind::Arithmetic, "division by zero"));
        }
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.checked_rem(b).map(Self::Int).ok_or_else(Self::overflow),
            (a, b) => Ok(Self::Float(a.as_f64() % b.as_f64())),
        }
    }

    pub fn checked_neg(self) -> Result<Self, Failure> {
        match self {
            Self::Int(value) => value.checked_neg().map(Self::Int).ok_or_else(Self::overflow),
            Self::Float(value) => Ok(Self::Float(-value)),
        }
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(value) => value == 0,
            Self::Float(value) => value == 0.0,
        }
    }

    /// Numeric comparison across ints and floats.
    #[must_use]
    pub fn compare(self, other: Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }
}

// =============================================================================
// BUILT-INS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Builtin {
    Add,
    Subtract,
    Multiply,
    Divide,
    Sum,
    Count,
    Concat,
    Format,
    Formular,
    AnyOf,
    Collision,
    ErrorDefault,
}

impl Builtin {
    pub const ALL: [Self; 12] = [
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Sum,
        Self::Count,
        Self::Concat,
        Self::Format,
        Self::Formular,
        Self::AnyOf,
        Self::Collision,
        Self::ErrorDefault,
    ];

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|builtin| builtin.name() == name)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Add => vocab::ADD,
            Self::Subtract => vocab::SUBTRACT,
            Self::Multiply => vocab::MULTIPLY,
            Self::Divide => vocab::DIVIDE,
            Self::Sum => vocab::SUM,
            Self::Count => vocab::COUNT,
            Self::Concat => vocab::CONCAT,
            Self::Format => vocab::FORMAT,
            Self::Formular => vocab::FORMULAR,
            Self::AnyOf => vocab::ANY_OF,
            Self::Collision => vocab::COLLISION,
            Self::ErrorDefault => vocab::ERROR_DEFAULT,
        }
    }

    /// Aggregating built-ins take `#ALL` inputs as one spliced argument
    /// list instead of fanning out over them.
    #[must_use]
    pub const fn aggregates(self) -> bool {
        matches!(self, Self::Sum | Self::Count | Self::Concat | Self::AnyOf)
    }

    /// Apply the built-in to fully resolved, unpoisoned arguments.
    ///
    /// `ErrorDefault` is handled by the engine before poisoning applies;
    /// here it only passes its source through.
    pub fn apply(self, args: &Args) -> Result<Subject, Failure> {
        match self {
            Self::Add | Self::Sum => fold(args, Number::checked_add, Some(Number::Int(0))),
            Self::Subtract => fold(args, Number::checked_sub, None),
            Self::Multiply => fold(args, Number::checked_mul, None),
            Self::Divide => fold(args, Number::checked_div, None),
            Self::Count => Ok(Subject::int(args.positional.len() as i64)),
            Self::Concat => Ok(Subject::text(
                &args
                    .positional
                    .iter()
                    .map(|arg| arg.value.to_plain_string())
                    .collect::<String>(),
            )),
            Self::Format => format(args),
            Self::Formular => formular(args),
            Self::AnyOf => Ok(Subject::bool(args.values().any(Subject::is_truthy))),
            Self::Collision => collision(args),
            Self::ErrorDefault => args
                .named_or_nth("source", 0)
                .map(|arg| arg.value.clone())
                .ok_or_else(|| missing("source")),
        }
    }
}

/// Left fold over the positional inputs. `empty` is the result for no
/// inputs; `None` makes an empty call a missing-input failure.
fn fold(
    args: &Args,
    op: fn(Number, Number) -> Result<Number, Failure>,
    empty: Option<Number>,
) -> Result<Subject, Failure> {
    let mut inputs = args.positional.iter();
    let Some(first) = inputs.next() else {
        return empty.map(Number::into_subject).ok_or_else(|| missing("0"));
    };
    let mut acc = Number::of_arg(first)?;
    for arg in inputs {
        acc = op(acc, Number::of_arg(arg)?).map_err(|failure| failure.on(arg))?;
    }
    Ok(acc.into_subject())
}

/// `{0}` refers to positional input 0, `{name}` to a named input.
/// `{{` and `}}` are literal braces.
fn format(args: &Args) -> Result<Subject, Failure> {
    let template = args.named("template").ok_or_else(|| missing("template"))?;
    let Some(pattern) = template.value.as_text() else {
        return Err(Failure::new(ErrorKind::TypeMismatch, "template must be text").on(template));
    };

    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => key.push(c),
                        None => {
                            return Err(Failure::new(
                                ErrorKind::Format,
                                "unterminated placeholder",
                            )
                            .on(template));
                        }
                    }
                }
                let arg = match key.parse::<usize>() {
                    Ok(index) => args.positional.get(index),
                    Err(_) => args.named(&key),
                };
                let arg = arg.ok_or_else(|| {
                    Failure::new(ErrorKind::Format, format!("unknown placeholder `{{{key}}}`"))
                        .on(template)
                })?;
                out.push_str(&arg.value.to_plain_string());
            }
            '}' => {
                return Err(Failure::new(ErrorKind::Format, "unmatched `}`").on(template));
            }
            other => out.push(other),
        }
    }
    Ok(Subject::text(&out))
}

fn formular(args: &Args) -> Result<Subject, Failure> {
    let formula = args.named("formula").ok_or_else(|| missing("formula"))?;
    let Some(source) = formula.value.as_text() else {
        return Err(Failure::new(ErrorKind::TypeMismatch, "formula must be text").on(formula));
    };
    let parsed = super::formula::Formula::parse(source).map_err(|failure| failure.on(formula))?;
    parsed
        .evaluate(&|name| args.named(name))
        .map(Number::into_subject)
}

/// Axis-aligned rectangle overlap. Touching edges do not collide.
fn collision(args: &Args) -> Result<Subject, Failure> {
    let get = |key: &str| -> Result<Number, Failure> {
        let arg = args.named(key).ok_or_else(|| missing(key))?;
        Number::of_arg(arg)
    };
    let (ax, ay, aw, ah) = (get("ax")?, get("ay")?, get("aw")?, get("ah")?);
    let (bx, by, bw, bh) = (get("bx")?, get("by")?, get("bw")?, get("bh")?);

    let less = |a: Number, b: Number| a.compare(b) == Ordering::Less;
    let overlaps = less(ax, bx.checked_add(bw)?)
        && less(bx, ax.checked_add(aw)?)
        && less(ay, by.checked_add(bh)?)
        && less(by, ay.checked_add(ah)?);
    Ok(Subject::bool(overlaps))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn positional(values: &[Subject]) -> Args {
        Args {
            positional: values
                .iter()
                .enumerate()
                .map(|(i, value)| Arg {
                    name: Subject::int(i as i64),
                    value: value.clone(),
                })
                .collect(),
            named: Vec::new(),
        }
    }

    fn named(pairs: &[(&str, Subject)]) -> Args {
        Args {
            positional: Vec::new(),
            named: pairs
                .iter()
                .map(|(key, value)| Arg {
                    name: Subject::symbol(key),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    #[test]
    fn names_roundtrip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()), Some(builtin));
        }
        assert_eq!(Builtin::from_name("system::nope"), None);
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        let args = positional(&[Subject::int(2), Subject::int(3)]);
        assert_eq!(Builtin::Add.apply(&args), Ok(Subject::int(5)));
        assert_eq!(Builtin::Multiply.apply(&args), Ok(Subject::int(6)));
        assert_eq!(Builtin::Subtract.apply(&args), Ok(Subject::int(-1)));
    }

    #[test]
    fn mixed_arithmetic_promotes_to_float() {
        let args = positional(&[Subject::int(1), Subject::float(0.5)]);
        assert_eq!(Builtin::Add.apply(&args), Ok(Subject::float(1.5)));
        let args = positional(&[Subject::int(7), Subject::int(2)]);
        assert_eq!(Builtin::Divide.apply(&args), Ok(Subject::float(3.5)));
    }

    #[test]
    fn sum_of_number_and_text_is_a_type_mismatch() {
        let args = positional(&[Subject::int(1), Subject::text("string")]);
        let failure = Builtin::Sum.apply(&args).expect_err("mismatch");
        assert_eq!(failure.kind, ErrorKind::TypeMismatch);
        assert_eq!(
            failure.input.map(|arg| arg.value),
            Some(Subject::text("string"))
        );
    }

    #[test]
    fn division_by_zero_is_arithmetic() {
        let args = positional(&[Subject::int(1), Subject::int(0)]);
        let failure = Builtin::Divide.apply(&args).expect_err("zero");
        assert_eq!(failure.kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn overflow_is_reported() {
        let args = positional(&[Subject::int(i64::MAX), Subject::int(1)]);
        assert_eq!(
            Builtin::Add.apply(&args).map_err(|f| f.kind),
            Err(ErrorKind::Arithmetic)
        );
    }

    #[test]
    fn empty_sum_is_zero_and_empty_count_is_zero() {
        let args = Args::default();
        assert_eq!(Builtin::Sum.apply(&args), Ok(Subject::int(0)));
        assert_eq!(Builtin::Count.apply(&args), Ok(Subject::int(0)));
        assert_eq!(
            Builtin::Subtract.apply(&args).map_err(|f| f.kind),
            Err(ErrorKind::MissingInput)
        );
    }

    #[test]
    fn concat_joins_plain_strings() {
        let args = positional(&[Subject::text("a"), Subject::symbol("b"), Subject::int(3)]);
        assert_eq!(Builtin::Concat.apply(&args), Ok(Subject::text("ab3")));
    }

    #[test]
    fn format_fills_placeholders() {
        let mut args = positional(&[Subject::text("Ann")]);
        args.named.push(Arg {
            name: Subject::symbol("template"),
            value: Subject::text("Hi {0}, you are {age} {{years}}"),
        });
        args.named.push(Arg {
            name: Subject::symbol("age"),
            value: Subject::int(30),
        });
        assert_eq!(
            Builtin::Format.apply(&args),
            Ok(Subject::text("Hi Ann, you are 30 {years}"))
        );
    }

    #[test]
    fn format_rejects_unknown_placeholders() {
        let args = named(&[("template", Subject::text("{missing}"))]);
        assert_eq!(
            Builtin::Format.apply(&args).map_err(|f| f.kind),
            Err(ErrorKind::Format)
        );
    }

    #[test]
    fn collision_detects_overlap() {
        let rect = |ax, ay, bx, by| {
            named(&[
                ("ax", Subject::int(ax)),
                ("ay", Subject::int(ay)),
                ("aw", Subject::int(10)),
                ("ah", Subject::int(10)),
                ("bx", Subject::int(bx)),
                ("by", Subject::int(by)),
                ("bw", Subject::int(10)),
                ("bh", Subject::int(10)),
            ])
        };
        assert_eq!(Builtin::Collision.apply(&rect(0, 0, 5, 5)), Ok(Subject::bool(true)));
        assert_eq!(Builtin::Collision.apply(&rect(0, 0, 10, 0)), Ok(Subject::bool(false)));
        assert_eq!(Builtin::Collision.apply(&rect(0, 0, 30, 30)), Ok(Subject::bool(false)));
    }

    #[test]
    fn any_of_is_truthiness() {
        let args = positional(&[Subject::bool(false), Subject::int(0)]);
        assert_eq!(Builtin::AnyOf.apply(&args), Ok(Subject::bool(false)));
        let args = positional(&[Subject::bool(false), Subject::bool(true)]);
        assert_eq!(Builtin::AnyOf.apply(&args), Ok(Subject::bool(true)));
    }

    #[test]
    fn failure_marker_roots_at_the_input() {
        let args = positional(&[Subject::int(1), Subject::text("x")]);
        let failure = Builtin::Add.apply(&args).expect_err("mismatch");
        let marker = failure.into_marker(&Subject::symbol("calc"));
        assert_eq!(marker.source_path.len(), 1);
        assert_eq!(marker.source_path[0].property, Subject::int(1));
        assert_eq!(marker.source_path[0].value, Some(Subject::text("x")));
    }
}
