//! # Engine Configuration
//!
//! Behavioural switches for the engine. Deserializable so the application
//! can load them from the `[engine]` section of its TOML file.

use crate::primitives::{DEFAULT_MAX_EVALUATION_DEPTH, DEFAULT_MAX_TRIGGER_ROUNDS};
use serde::{Deserialize, Serialize};

/// How `#ALL` inputs of one computation are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanOut {
    /// Every combination of elements.
    #[default]
    CrossProduct,
    /// Element `i` of every input together; stops at the shortest input.
    Zip,
}

/// What `assert` does with a statement that breaks a validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// Append the fact with an `ErrorMarker` value.
    #[default]
    Poison,
    /// Refuse the write with `QuintetError::ValidationRejected`.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fan_out: FanOut,
    pub validation: ValidationPolicy,
    pub max_evaluation_depth: usize,
    pub max_trigger_rounds: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fan_out: FanOut::default(),
            validation: ValidationPolicy::default(),
            max_evaluation_depth: DEFAULT_MAX_EVALUATION_DEPTH,
            max_trigger_rounds: DEFAULT_MAX_TRIGGER_ROUNDS,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    #[must_use]
    pub fn with_validation(mut self, validation: ValidationPolicy) -> Self {
        self.validation = validation;
        self
    }

    #[must_use]
    pub fn with_max_evaluation_depth(mut self, depth: usize) -> Self {
        self.max_evaluation_depth = depth;
        self
    }

    #[must_use]
    pub fn with_max_trigger_rounds(mut self, rounds: usize) -> Self {
        self.max_trigger_rounds = rounds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_choices() {
        let config = EngineConfig::default();
        assert_eq!(config.fan_out, FanOut::CrossProduct);
        assert_eq!(config.validation, ValidationPolicy::Poison);
        assert_eq!(config.max_evaluation_depth, DEFAULT_MAX_EVALUATION_DEPTH);
    }

    #[test]
    fn builders_override_fields() {
        let config = EngineConfig::default()
            .with_fan_out(FanOut::Zip)
            .with_validation(ValidationPolicy::Reject)
            .with_max_evaluation_depth(3);
        assert_eq!(config.fan_out, FanOut::Zip);
        assert_eq!(config.validation, ValidationPolicy::Reject);
        assert_eq!(config.max_evaluation_depth, 3);
    }
}
