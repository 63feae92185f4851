//! Flat comma-delimited wire records exchanged over the bus.
//!
//! - Request record: `id,operation,operand1,operand2`
//! - Result record: `id,outcome`
//!
//! Neither record escapes commas. Ids are UUIDs or numeric strings, operands
//! are decimal literals and outcomes are encoder output or one of the
//! [`diagnostics`] tags, none of which contain a comma.

use std::fmt;

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::encoder::encode;
use crate::evaluator::{parse_operand, Operation};

/// Field separator of both record kinds.
pub const FIELD_DELIMITER: char = ',';

/// Diagnostic tags carried in the outcome field of failed results.
pub mod diagnostics {
    /// The request named an operation the worker does not support.
    pub const INVALID_OPERATION: &str = "Invalid operation";
    /// Any other failure: malformed record, invalid operand, division by zero.
    pub const PROCESSING_ERROR: &str = "Error processing message";
}

/// Errors from decoding wire records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record {record:?}: expected at least {expected} fields, found {found}")]
    MalformedRecord {
        expected: usize,
        found: usize,
        record: String,
    },
}

// ---------------------------------------------------------------------------
// CalculationRequest
// ---------------------------------------------------------------------------

/// A calculation request as carried on the request topic.
///
/// The operation and operands stay textual: validating them is the
/// worker's job, and a bad value must still produce a result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationRequest {
    pub id: String,
    pub operation: String,
    pub operand1: String,
    pub operand2: String,
}

impl CalculationRequest {
    /// Number of fields in a request record.
    pub const FIELD_COUNT: usize = 4;

    /// Builds a request from parsed values. Operands are written in plain
    /// decimal notation.
    #[must_use]
    pub fn new(id: impl Into<String>, operation: Operation, a: &BigDecimal, b: &BigDecimal) -> Self {
        Self {
            id: id.into(),
            operation: operation.wire_name().to_string(),
            operand1: a.to_plain_string(),
            operand2: b.to_plain_string(),
        }
    }

    /// Decodes a request record. Fields past the fourth are ignored.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::MalformedRecord` when fewer than four fields
    /// are present.
    pub fn parse(record: &str) -> Result<Self, RecordError> {
        let parts: Vec<&str> = record.split(FIELD_DELIMITER).collect();
        if parts.len() < Self::FIELD_COUNT {
            return Err(RecordError::MalformedRecord {
                expected: Self::FIELD_COUNT,
                found: parts.len(),
                record: record.to_string(),
            });
        }
        Ok(Self {
            id: parts[0].to_string(),
            operation: parts[1].to_string(),
            operand1: parts[2].to_string(),
            operand2: parts[3].to_string(),
        })
    }

    /// Best-effort id of a record that may not decode: its first field,
    /// when non-empty.
    #[must_use]
    pub fn recover_id(record: &str) -> Option<&str> {
        record
            .split(FIELD_DELIMITER)
            .next()
            .filter(|id| !id.is_empty())
    }

    /// Encodes this request as a wire record.
    #[must_use]
    pub fn to_record(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CalculationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}",
            self.id, self.operation, self.operand1, self.operand2
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// The outcome field of a result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Canonical encoder output of the computed value.
    Value(String),
    /// A diagnostic tag describing why no value was produced.
    Failure(String),
}

impl Outcome {
    /// Wraps a computed value in its canonical encoding.
    #[must_use]
    pub fn value(value: &BigDecimal) -> Self {
        Outcome::Value(encode(value))
    }

    /// Interprets an outcome field: decimal text is a value, anything else
    /// is a diagnostic.
    #[must_use]
    pub fn from_wire(text: &str) -> Self {
        if parse_operand(text).is_ok() {
            Outcome::Value(text.to_string())
        } else {
            Outcome::Failure(text.to_string())
        }
    }

    /// The text written into the outcome field.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Outcome::Value(s) | Outcome::Failure(s) => s,
        }
    }

    #[must_use]
    pub fn is_value(&self) -> bool {
        matches!(self, Outcome::Value(_))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CalculationResult
// ---------------------------------------------------------------------------

/// A calculation result as carried on the result topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub id: String,
    pub outcome: Outcome,
}

impl CalculationResult {
    /// Minimum number of fields in a result record.
    pub const FIELD_COUNT: usize = 2;

    #[must_use]
    pub fn success(id: impl Into<String>, value: &BigDecimal) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::value(value),
        }
    }

    #[must_use]
    pub fn failure(id: impl Into<String>, tag: &str) -> Self {
        Self {
            id: id.into(),
            outcome: Outcome::Failure(tag.to_string()),
        }
    }

    /// Decodes a result record, splitting at the first delimiter only.
    ///
    /// # Errors
    ///
    /// Returns `RecordError::MalformedRecord` when the record has no
    /// delimiter.
    pub fn parse(record: &str) -> Result<Self, RecordError> {
        let Some((id, outcome)) = record.split_once(FIELD_DELIMITER) else {
            return Err(RecordError::MalformedRecord {
                expected: Self::FIELD_COUNT,
                found: 1,
                record: record.to_string(),
            });
        };
        Ok(Self {
            id: id.to_string(),
            outcome: Outcome::from_wire(outcome),
        })
    }

    /// Encodes this result as a wire record.
    #[must_use]
    pub fn to_record(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CalculationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{FIELD_DELIMITER}{}", self.id, self.outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
