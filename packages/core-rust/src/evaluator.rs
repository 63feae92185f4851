//! Decimal arithmetic evaluator.
//!
//! Maps `(operation, operand1, operand2)` to an arbitrary-precision decimal
//! or a typed [`EvalError`]. Addition, subtraction and multiplication are
//! exact. Division is rounded half-up (ties away from zero) to a fixed
//! number of fractional digits, computed on the unscaled integers so the
//! quotient is rounded exactly once.
//!
//! The evaluator holds no mutable state and is safe to share across tasks.

use std::fmt;
use std::str::FromStr;

use bigdecimal::num_bigint::{BigInt, Sign};
use bigdecimal::{BigDecimal, Signed, Zero};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fractional digits kept by division unless configured otherwise.
pub const DEFAULT_DIVISION_SCALE: i64 = 10;

/// Largest accepted magnitude of an operand's decimal exponent.
///
/// `1E+4096` is accepted, `1E+4097` is not. Bounds the size of the
/// integers built while dividing.
pub const MAX_OPERAND_EXPONENT: i64 = 4096;

/// Largest configurable division scale.
pub const MAX_DIVISION_SCALE: i64 = 1000;

// ---------------------------------------------------------------------------
// EvalError
// ---------------------------------------------------------------------------

/// Failures produced by the evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("invalid operand {text:?}: {reason}")]
    InvalidOperand { text: String, reason: &'static str },
    #[error("unknown operation: {name:?}")]
    UnknownOperation { name: String },
    #[error("division by zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// The four supported arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    /// Name written into request records. Addition travels as `sum`.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Operation::Add => "sum",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for Operation {
    type Err = EvalError;

    /// Accepts `sum`/`add`, `subtract`, `multiply`, `divide`. Case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sum" | "add" => Ok(Operation::Add),
            "subtract" => Ok(Operation::Subtract),
            "multiply" => Ok(Operation::Multiply),
            "divide" => Ok(Operation::Divide),
            other => Err(EvalError::UnknownOperation {
                name: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Operand parsing
// ---------------------------------------------------------------------------

/// Parses decimal-literal text into a `BigDecimal`.
///
/// Surrounding whitespace is ignored. Scientific notation (`1.5E3`) is
/// accepted as long as the exponent stays within [`MAX_OPERAND_EXPONENT`].
///
/// # Errors
///
/// Returns `EvalError::InvalidOperand` when the text is empty, is not a
/// decimal literal, or carries an out-of-range exponent.
pub fn parse_operand(text: &str) -> Result<BigDecimal, EvalError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EvalError::InvalidOperand {
            text: text.to_string(),
            reason: "empty operand",
        });
    }
    let value = BigDecimal::from_str(trimmed).map_err(|_| EvalError::InvalidOperand {
        text: text.to_string(),
        reason: "not a decimal number",
    })?;
    let (_, exponent) = value.as_bigint_and_exponent();
    if exponent.abs() > MAX_OPERAND_EXPONENT {
        return Err(EvalError::InvalidOperand {
            text: text.to_string(),
            reason: "exponent out of range",
        });
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Pure decimal calculator with a fixed division scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluator {
    division_scale: i64,
}

impl Evaluator {
    /// Creates an evaluator using [`DEFAULT_DIVISION_SCALE`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            division_scale: DEFAULT_DIVISION_SCALE,
        }
    }

    /// Creates an evaluator that keeps `scale` fractional digits when dividing.
    /// The scale is clamped to `[0, MAX_DIVISION_SCALE]`.
    #[must_use]
    pub fn with_division_scale(scale: i64) -> Self {
        Self {
            division_scale: scale.clamp(0, MAX_DIVISION_SCALE),
        }
    }

    /// Fractional digits kept by division.
    #[must_use]
    pub fn division_scale(&self) -> i64 {
        self.division_scale
    }

    /// Applies `operation` to two parsed operands.
    ///
    /// # Errors
    ///
    /// Returns `EvalError::DivisionByZero` for a zero divisor.
    pub fn evaluate(
        &self,
        operation: Operation,
        a: &BigDecimal,
        b: &BigDecimal,
    ) -> Result<BigDecimal, EvalError> {
        debug!(%operation, %a, %b, "evaluating");
        match operation {
            Operation::Add => Ok(a + b),
            Operation::Subtract => Ok(a - b),
            Operation::Multiply => Ok(a * b),
            Operation::Divide => divide_half_up(a, b, self.division_scale),
        }
    }

    /// Parses the operation name and both operands, then evaluates.
    ///
    /// The operation is checked first, then operand1, then operand2.
    ///
    /// # Errors
    ///
    /// Returns `UnknownOperation`, `InvalidOperand` or `DivisionByZero`.
    pub fn evaluate_text(
        &self,
        operation: &str,
        operand1: &str,
        operand2: &str,
    ) -> Result<BigDecimal, EvalError> {
        let operation = Operation::from_str(operation)?;
        let a = parse_operand(operand1)?;
        let b = parse_operand(operand2)?;
        self.evaluate(operation, &a, &b)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

/// `a / b` rounded half-up to `scale` fractional digits.
///
/// With `a = ma * 10^-ea` and `b = mb * 10^-eb`, the scaled quotient is
/// `ma * 10^(scale + eb - ea) / mb`. The power of ten goes on whichever side
/// keeps both terms integral.
fn divide_half_up(a: &BigDecimal, b: &BigDecimal, scale: i64) -> Result<BigDecimal, EvalError> {
    if b.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    let (ma, ea) = a.as_bigint_and_exponent();
    let (mb, eb) = b.as_bigint_and_exponent();

    let shift = scale + eb - ea;
    let (numerator, denominator) = if shift >= 0 {
        (ma * pow10(shift), mb)
    } else {
        (ma, mb * pow10(-shift))
    };

    let mut quotient = &numerator / &denominator;
    let remainder = &numerator % &denominator;

    // Ties round away from zero.
    if remainder.abs() * 2u32 >= denominator.abs() {
        let negative = (numerator.sign() == Sign::Minus) != (denominator.sign() == Sign::Minus);
        let unit = BigInt::from(1u8);
        if negative {
            quotient -= unit;
        } else {
            quotient += unit;
        }
    }

    Ok(BigDecimal::new(quotient, scale))
}

fn pow10(exp: i64) -> BigInt {
    // Bounded by MAX_DIVISION_SCALE + 2 * MAX_OPERAND_EXPONENT.
    let exp = u32::try_from(exp).unwrap_or(u32::MAX);
    BigInt::from(10u8).pow(exp)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
