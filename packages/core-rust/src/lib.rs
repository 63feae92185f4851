//! `calcbus` Core -- decimal evaluator, result encoder, wire records, and partitioning.

pub mod encoder;
pub mod evaluator;
pub mod hash;
pub mod partition;
pub mod records;

pub use encoder::encode;
pub use evaluator::{parse_operand, EvalError, Evaluator, Operation, DEFAULT_DIVISION_SCALE};
pub use partition::{hash_to_partition, DEFAULT_PARTITION_COUNT};
pub use records::{diagnostics, CalculationRequest, CalculationResult, Outcome, RecordError};
