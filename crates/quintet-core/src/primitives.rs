//! # Engine Primitives
//!
//! Hardcoded runtime constants for the Quintet engine.
//!
//! Configurable limits (`EngineConfig`) default to the values defined here;
//! format constants are fixed.

/// Magic bytes for the Quintet binary snapshot header.
///
/// - File Header = Magic Bytes ("QNTT") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"QNTT";

/// Current serialization format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

/// Default bound on nested evaluation and computation frames.
///
/// A requirement naming `?subject` recurses into `subject`'s own
/// requirements; computations recurse into their inputs. Deeper stacks are
/// reported instead of overflowing.
pub const DEFAULT_MAX_EVALUATION_DEPTH: usize = 64;

/// Default number of trigger drain rounds per top-level batch.
///
/// Each round re-evaluates every subscription once. A batch whose triggers
/// keep producing new facts past this bound is reported as a runaway cascade.
pub const DEFAULT_MAX_TRIGGER_ROUNDS: usize = 1024;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for symbol names and text literals.
///
/// Statements carrying longer strings are rejected before they reach the log.
pub const MAX_TEXT_LENGTH: usize = 65536;

/// Maximum number of meta tags on one fact.
pub const MAX_META_TAGS: usize = 64;

/// Maximum number of statements in a single batch.
pub const MAX_BATCH_LENGTH: usize = 10000;

/// Maximum number of combinations one `#ALL` fan-out may produce.
///
/// Larger cross-products poison the computation instead of allocating.
pub const MAX_FAN_OUT: usize = 4096;

/// Maximum nesting of a `system::formular` expression.
///
/// Counts parentheses, unary minus and chained operators. Deeper formulas
/// fail with a format error.
pub const MAX_FORMULA_DEPTH: usize = 256;

/// Maximum number of firing records kept until `take_firings` drains them.
///
/// Older records are dropped first.
pub const MAX_FIRING_LOG: usize = 10000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_bytes_correct() {
        assert_eq!(MAGIC_BYTES, b"QNTT");
    }

    #[test]
    fn limits_are_positive() {
        assert!(DEFAULT_MAX_EVALUATION_DEPTH > 0);
        assert!(DEFAULT_MAX_TRIGGER_ROUNDS > 0);
        assert!(MAX_FAN_OUT > 0);
    }
}
