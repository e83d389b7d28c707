//! Concrete, reusable `Validator` implementations.

use crate::crv::{ValidationResult, Validator};
use crate::error::FailureCode;
use crate::types::Commit;

/// Requires a fixed set of top-level keys to be present in the payload.
pub struct SchemaShapeValidator {
    required_fields: Vec<String>,
}

impl SchemaShapeValidator {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }
}

impl Validator for SchemaShapeValidator {
    fn name(&self) -> &str {
        "schema_shape"
    }

    fn validate(&self, commit: &Commit) -> ValidationResult {
        let missing: Vec<&str> = self
            .required_fields
            .iter()
            .filter(|f| commit.payload.get(f.as_str()).is_none())
            .map(|f| f.as_str())
            .collect();

        if missing.is_empty() {
            ValidationResult {
                validator_name: self.name().to_string(),
                valid: true,
                reason: None,
                confidence: 1.0,
                failure_code: None,
            }
        } else {
            ValidationResult {
                validator_name: self.name().to_string(),
                valid: false,
                reason: Some(format!("missing required field(s): {}", missing.join(", "))),
                confidence: 1.0,
                failure_code: Some(FailureCode::MissingData),
            }
        }
    }
}

/// Requires a numeric field to fall within `[min, max]`. Confidence tracks
/// how far inside the range the value falls; the closer to a boundary, the
/// less confident.
pub struct NumericRangeValidator {
    field: String,
    min: f64,
    max: f64,
}

impl NumericRangeValidator {
    pub fn new(field: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            field: field.into(),
            min,
            max,
        }
    }
}

impl Validator for NumericRangeValidator {
    fn name(&self) -> &str {
        "numeric_range"
    }

    fn validate(&self, commit: &Commit) -> ValidationResult {
        let Some(value) = commit.payload.get(&self.field).and_then(|v| v.as_f64()) else {
            return ValidationResult {
                validator_name: self.name().to_string(),
                valid: false,
                reason: Some(format!("field {} missing or not numeric", self.field)),
                confidence: 1.0,
                failure_code: Some(FailureCode::MissingData),
            };
        };

        if value < self.min || value > self.max {
            return ValidationResult {
                validator_name: self.name().to_string(),
                valid: false,
                reason: Some(format!(
                    "{} = {value} out of range [{}, {}]",
                    self.field, self.min, self.max
                )),
                confidence: 1.0,
                failure_code: Some(FailureCode::OutOfScope),
            };
        }

        let span = (self.max - self.min).max(f64::EPSILON);
        let center = (self.min + self.max) / 2.0;
        let distance_from_center = (value - center).abs() / (span / 2.0);
        let confidence = (1.0 - distance_from_center).clamp(0.0, 1.0);

        ValidationResult {
            validator_name: self.name().to_string(),
            valid: true,
            reason: None,
            confidence,
            failure_code: None,
        }
    }
}

/// Requires a numeric field to not decrease relative to `previous_state`.
/// Used for counters and sequence numbers that must be monotonic.
pub struct MonotonicPreviousStateValidator {
    field: String,
}

impl MonotonicPreviousStateValidator {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Validator for MonotonicPreviousStateValidator {
    fn name(&self) -> &str {
        "monotonic_previous_state"
    }

    fn validate(&self, commit: &Commit) -> ValidationResult {
        let current = commit.payload.get(&self.field).and_then(|v| v.as_f64());
        let previous = commit
            .previous_state
            .as_ref()
            .and_then(|p| p.get(&self.field))
            .and_then(|v| v.as_f64());

        match (current, previous) {
            (Some(c), Some(p)) if c < p => ValidationResult {
                validator_name: self.name().to_string(),
                valid: false,
                reason: Some(format!("{} regressed from {p} to {c}", self.field)),
                confidence: 1.0,
                failure_code: Some(FailureCode::Conflict),
            },
            _ => ValidationResult {
                validator_name: self.name().to_string(),
                valid: true,
                reason: None,
                confidence: 1.0,
                failure_code: None,
            },
        }
    }
}
