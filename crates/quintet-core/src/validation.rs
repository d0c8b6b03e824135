//! # Validation Rules
//!
//! Pre-commit checks read from the store itself. A property subject may
//! carry rule facts:
//!
//! | Rule property             | Meaning                                   |
//! |---------------------------|-------------------------------------------|
//! | `system::property::type`  | `number`, `integer`, `float`, `text`, `bool`, `symbol`, `subject` |
//! | `system::property::min`   | lower bound (numbers) or minimum length (text) |
//! | `system::property::max`   | upper bound (numbers) or maximum length (text) |
//! | `system::property::regex` | pattern the textual value must match      |
//!
//! Constant assignments are checked before they are appended. Virtual
//! values (computations and paths) are checked against the same rules each
//! time they are read; a violation there always poisons, whatever the
//! configured policy.

use crate::compute::{self, Number};
use crate::store::Snapshot;
use crate::vocab;
use crate::{ErrorKind, ErrorMarker, Subject, Value};
use regex::Regex;
use std::cmp::Ordering;
use tracing::warn;

/// A rule failure, attributed to the offending `target/property = value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ErrorKind,
    pub message: String,
}

impl Violation {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn into_marker(self, target: &Subject, property: &Subject, value: &Subject) -> ErrorMarker {
        ErrorMarker::new(self.kind, self.message).at(target, property, Some(value))
    }
}

/// Stateless rule checker.
#[derive(Debug, Default, Clone, Copy)]
pub struct Validator;

impl Validator {
    /// Check an assignment of `value` to `property` against the property's
    /// rules. Returns the first violation.
    #[must_use]
    pub fn check(snapshot: &Snapshot<'_>, property: &Subject, value: &Value) -> Option<Violation> {
        let Value::Subject(value) = value else {
            return None;
        };
        if compute::is_computation(snapshot, value) {
            return None;
        }
        Self::check_subject(snapshot, property, value)
    }

    /// Check one concrete value of `property`, such as the result of a
    /// virtual value read.
    #[must_use]
    pub fn check_subject(
        snapshot: &Snapshot<'_>,
        property: &Subject,
        value: &Subject,
    ) -> Option<Violation> {
        if !property.is_reference() {
            return None;
        }
        let rule = |name: &str| snapshot.constant(property, &Subject::symbol(name));

        rule(vocab::PROPERTY_TYPE)
            .and_then(|expected| check_type(&expected.to_plain_string(), value))
            .or_else(|| {
                rule(vocab::PROPERTY_MIN)
                    .and_then(|min| check_bound(value, min, Ordering::Less, "below minimum"))
            })
            .or_else(|| {
                rule(vocab::PROPERTY_MAX)
                    .and_then(|max| check_bound(value, max, Ordering::Greater, "above maximum"))
            })
            .or_else(|| {
                rule(vocab::PROPERTY_REGEX)
                    .and_then(|pattern| check_pattern(&pattern.to_plain_string(), value))
            })
    }
}

fn check_type(expected: &str, value: &Subject) -> Option<Violation> {
    let ok = match expected {
        "number" => value.is_numeric(),
        "integer" | "int" => matches!(value, Subject::Int(_)),
        "float" => matches!(value, Subject::Float(_)),
        "text" | "string" => matches!(value, Subject::Text(_)),
        "bool" | "boolean" => matches!(value, Subject::Bool(_)),
        "symbol" => matches!(value, Subject::Symbol(_)),
        "subject" => value.is_reference(),
        unknown => {
            warn!(rule = unknown, "ignoring unknown type rule");
            true
        }
    };
    (!ok).then(|| {
        Violation::new(
            ErrorKind::TypeMismatch,
            format!("expected {expected}, got {} {value}", value.kind_name()),
        )
    })
}

/// Numbers compare by value, text by character count.
fn check_bound(value: &Subject, bound: &Subject, failing: Ordering, what: &str) -> Option<Violation> {
    let Some(limit) = Number::of(bound) else {
        warn!(bound = %bound, "ignoring non-numeric bound rule");
        return None;
    };
    let measured = match value {
        Subject::Text(text) => Number::Int(text.chars().count() as i64),
        other => match Number::of(other) {
            Some(number) => number,
            None => {
                return Some(Violation::new(
                    ErrorKind::TypeMismatch,
                    format!("bounded property needs a number or text, got {}", other.kind_name()),
                ));
            }
        },
    };
    (measured.compare(limit) == failing).then(|| {
        Violation::new(
            ErrorKind::ValidationViolation,
            format!("{value} is {what} {bound}"),
        )
    })
}

fn check_pattern(pattern: &str, value: &Subject) -> Option<Violation> {
    let regex = match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => {
            return Some(Violation::new(
                ErrorKind::ValidationViolation,
                format!("invalid pattern {pattern:?}: {error}"),
            ));
        }
    };
    let text = value.to_plain_string();
    (!regex.is_match(&text)).then(|| {
        Violation::new(
            ErrorKind::ValidationViolation,
            format!("{value} does not match {pattern:?}"),
        )
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Statement;
    use crate::store::FactStore;

    fn rule(store: &mut FactStore, property: &str, name: &str, value: Subject) {
        store.append(Statement::assign(
            Subject::symbol(property),
            Subject::symbol(name),
            value,
        ));
    }

    fn check(store: &FactStore, property: &str, value: Subject) -> Option<ErrorKind> {
        Validator::check(
            &store.snapshot(),
            &Subject::symbol(property),
            &Value::Subject(value),
        )
        .map(|violation| violation.kind)
    }

    #[test]
    fn unconstrained_properties_accept_anything() {
        let store = FactStore::new();
        assert_eq!(check(&store, "age", Subject::text("old")), None);
    }

    #[test]
    fn type_rule_reports_type_mismatch() {
        let mut store = FactStore::new();
        rule(&mut store, "age", vocab::PROPERTY_TYPE, Subject::text("number"));
        assert_eq!(check(&store, "age", Subject::int(3)), None);
        assert_eq!(check(&store, "age", Subject::float(3.5)), None);
        assert_eq!(
            check(&store, "age", Subject::text("three")),
            Some(ErrorKind::TypeMismatch)
        );
    }

    #[test]
    fn bounds_apply_to_numbers_and_text_length() {
        let mut store = FactStore::new();
        rule(&mut store, "age", vocab::PROPERTY_MIN, Subject::int(0));
        rule(&mut store, "age", vocab::PROPERTY_MAX, Subject::int(150));
        assert_eq!(check(&store, "age", Subject::int(40)), None);
        assert_eq!(
            check(&store, "age", Subject::int(-1)),
            Some(ErrorKind::ValidationViolation)
        );
        assert_eq!(
            check(&store, "age", Subject::int(151)),
            Some(ErrorKind::ValidationViolation)
        );

        rule(&mut store, "code", vocab::PROPERTY_MAX, Subject::int(3));
        assert_eq!(check(&store, "code", Subject::text("abc")), None);
        assert_eq!(
            check(&store, "code", Subject::text("abcd")),
            Some(ErrorKind::ValidationViolation)
        );
    }

    #[test]
    fn regex_rule_matches_text() {
        let mut store = FactStore::new();
        rule(
            &mut store,
            "email",
            vocab::PROPERTY_REGEX,
            Subject::text(r"^[^@]+@[^@]+$"),
        );
        assert_eq!(check(&store, "email", Subject::text("a@b")), None);
        assert_eq!(
            check(&store, "email", Subject::text("nope")),
            Some(ErrorKind::ValidationViolation)
        );
    }

    /// The computation's result is checked on read instead.
    #[test]
    fn computation_subjects_are_not_checked_at_commit() {
        let mut store = FactStore::new();
        rule(&mut store, "age", vocab::PROPERTY_TYPE, Subject::text("number"));
        store.append(Statement::assign(
            Subject::symbol("calc"),
            Subject::symbol(vocab::OPERATION),
            Subject::symbol(vocab::SUM),
        ));
        assert_eq!(check(&store, "age", Subject::symbol("calc")), None);
    }
}
