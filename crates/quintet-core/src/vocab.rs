//! # Well-Known Vocabulary
//!
//! Names of the system subjects every registry installs at creation.
//! Meta tags, access control properties, built-in operations, validation
//! properties and error types all live here.

/// Reserved namespace for engine-defined subjects.
pub const SYSTEM_NAMESPACE: &str = "system::";

// =============================================================================
// COMPUTATIONS
// =============================================================================

/// Names the operation a computation subject performs.
pub const OPERATION: &str = "system::operation";
/// Body of a reusable: a computation subject evaluated in a fresh scope.
pub const BODY: &str = "system::body";

pub const ADD: &str = "system::add";
pub const SUBTRACT: &str = "system::subtract";
pub const MULTIPLY: &str = "system::multiply";
pub const DIVIDE: &str = "system::divide";
pub const SUM: &str = "system::sum";
pub const COUNT: &str = "system::count";
pub const CONCAT: &str = "system::concat";
pub const FORMAT: &str = "system::format";
pub const FORMULAR: &str = "system::formular";
pub const ANY_OF: &str = "system::anyOf";
pub const COLLISION: &str = "system::math::collision";
pub const ERROR_DEFAULT: &str = "system::error::default";
pub const IO_FILE: &str = "system::io::file";
pub const LOG: &str = "system::log";

// =============================================================================
// META
// =============================================================================

pub const META_TYPE: &str = "system::meta::type";
pub const META_USER: &str = "system::meta::user";
pub const META_DENIAL: &str = "system::meta::denial";
/// `system::meta::type = access`
pub const ACCESS: &str = "access";
/// `system::meta::denial = hidden`
pub const HIDDEN: &str = "hidden";

pub const ALL: &str = "#ALL";
pub const NOW: &str = "#NOW";
pub const SNAPSHOT: &str = "#SNAPSHOT";
pub const FORCE: &str = "#FORCE";

// =============================================================================
// PREDICATES
// =============================================================================

pub const SAYS: &str = "says";
pub const ERROR_EQUALS: &str = "error::equals";

// =============================================================================
// VALIDATION
// =============================================================================

pub const PROPERTY_TYPE: &str = "system::property::type";
pub const PROPERTY_MIN: &str = "system::property::min";
pub const PROPERTY_MAX: &str = "system::property::max";
pub const PROPERTY_REGEX: &str = "system::property::regex";

// =============================================================================
// ERRORS & TRIGGERS
// =============================================================================

/// Prefix of the error-type subjects (`system::error::typeMismatch`, ...).
pub const ERROR_PREFIX: &str = "system::error::";

/// Variable bound to the candidate target when a trigger fires.
pub const SELF_VARIABLE: &str = "self";

/// Installed into every registry, in this order.
pub const WELL_KNOWN: &[&str] = &[
    OPERATION,
    BODY,
    ADD,
    SUBTRACT,
    MULTIPLY,
    DIVIDE,
    SUM,
    COUNT,
    CONCAT,
    FORMAT,
    FORMULAR,
    ANY_OF,
    COLLISION,
    ERROR_DEFAULT,
    IO_FILE,
    LOG,
    META_TYPE,
    META_USER,
    META_DENIAL,
    ACCESS,
    HIDDEN,
    ALL,
    NOW,
    SNAPSHOT,
    FORCE,
    SAYS,
    ERROR_EQUALS,
    PROPERTY_TYPE,
    PROPERTY_MIN,
    PROPERTY_MAX,
    PROPERTY_REGEX,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn well_known_names_are_unique() {
        let unique: BTreeSet<_> = WELL_KNOWN.iter().collect();
        assert_eq!(unique.len(), WELL_KNOWN.len());
    }

    #[test]
    fn built_ins_live_in_system_namespace() {
        for name in [ADD, SUM, CONCAT, FORMAT, FORMULAR, ANY_OF, COLLISION, ERROR_DEFAULT] {
            assert!(name.starts_with(SYSTEM_NAMESPACE), "{name}");
        }
    }
}
