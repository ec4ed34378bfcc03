//! Schema validation for raw evaluation payloads
//!
//! Validation is a parse step: untrusted bytes go in, a typed
//! [`RawEvaluationRecord`] or a [`ValidationError`] comes out. Nothing here has
//! side effects; a rejected payload leaves no trace anywhere in the pipeline.
//!
//! Rules (schema `1.0`):
//! - all nine fields are required and must not be `null`
//! - `evaluation_id`, `text_hash`, `processing_timestamp`, `context` are strings
//! - the three scores are JSON numbers (integers accepted), finite, in `[0, 1]`
//! - `bias_indicators` is an array of strings (may be empty)
//! - `uncertainty_acknowledgment` is a boolean
//! - unknown extra fields are ignored

use crate::error::ValidationError;
use crate::record::RawEvaluationRecord;
use serde_json::{Map, Value};

/// The schema version this validator implements
pub const SCHEMA_VERSION: &str = "1.0";

/// Schema versions accepted in configuration
pub const SUPPORTED_SCHEMA_VERSIONS: &[&str] = &[SCHEMA_VERSION];

/// Validator for raw evaluation payloads
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    version: String,
}

impl SchemaValidator {
    /// Create a validator for the given schema version
    pub fn new(version: impl Into<String>) -> Result<Self, ValidationError> {
        let version = version.into();
        if !SUPPORTED_SCHEMA_VERSIONS.contains(&version.as_str()) {
            return Err(ValidationError::UnknownSchemaVersion(version));
        }
        Ok(SchemaValidator { version })
    }

    /// Schema version this validator checks against
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Decode raw payload bytes and validate them
    pub fn decode(&self, payload: &[u8]) -> Result<RawEvaluationRecord, ValidationError> {
        let value: Value = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::Malformed(e.to_string()))?;
        self.validate(&value)
    }

    /// Validate an already-decoded JSON value
    pub fn validate(&self, value: &Value) -> Result<RawEvaluationRecord, ValidationError> {
        let obj = value.as_object().ok_or(ValidationError::NotAnObject)?;

        Ok(RawEvaluationRecord {
            evaluation_id: string_field(obj, "evaluation_id")?,
            text_hash: string_field(obj, "text_hash")?,
            overall_score: score_field(obj, "overall_score")?,
            logical_validity_score: score_field(obj, "logical_validity_score")?,
            confidence_calibration: score_field(obj, "confidence_calibration")?,
            bias_indicators: string_list_field(obj, "bias_indicators")?,
            uncertainty_acknowledgment: bool_field(obj, "uncertainty_acknowledgment")?,
            processing_timestamp: string_field(obj, "processing_timestamp")?,
            context: string_field(obj, "context")?,
        })
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        SchemaValidator {
            version: SCHEMA_VERSION.to_string(),
        }
    }
}

// ============================================================================
// Field extraction
// ============================================================================

fn required<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ValidationError> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(v) => Ok(v),
    }
}

fn string_field(obj: &Map<String, Value>, field: &'static str) -> Result<String, ValidationError> {
    required(obj, field)?
        .as_str()
        .map(str::to_string)
        .ok_or(ValidationError::WrongType {
            field,
            expected: "a string",
        })
}

fn score_field(obj: &Map<String, Value>, field: &'static str) -> Result<f64, ValidationError> {
    let value = required(obj, field)?
        .as_f64()
        .ok_or(ValidationError::WrongType {
            field,
            expected: "a number",
        })?;
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::ScoreOutOfRange { field, value });
    }
    Ok(value)
}

fn string_list_field(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, ValidationError> {
    let wrong = ValidationError::WrongType {
        field,
        expected: "an array of strings",
    };
    let items = required(obj, field)?.as_array().ok_or_else(|| wrong.clone())?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string).ok_or_else(|| wrong.clone()))
        .collect()
}

fn bool_field(obj: &Map<String, Value>, field: &'static str) -> Result<bool, ValidationError> {
    required(obj, field)?.as_bool().ok_or(ValidationError::WrongType {
        field,
        expected: "a boolean",
    })
}
