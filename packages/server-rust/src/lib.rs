//! `calcbus` Server -- synchronous calculator calls bridged over a partitioned
//! message bus: correlation registry, worker dispatcher, axum gateway.

pub mod app;
pub mod bus;
pub mod network;
pub mod service;
pub mod traits;

pub use app::CalcbusApp;
pub use bus::{BusError, BusRecord, InMemoryBus, RecordMetadata, Subscription};
pub use traits::MessageBus;
