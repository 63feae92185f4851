//! Bus-facing domain handlers.
//!
//! - [`dispatcher`]: the worker side. Consumes request records, evaluates
//!   them, and publishes exactly one result record per request.
//! - [`listener`]: the gateway side. Consumes result records and completes
//!   the matching pending request.

pub mod dispatcher;
pub mod listener;

pub use dispatcher::{DispatcherStats, WorkerDispatcher};
pub use listener::{ListenOutcome, ResultListener};
