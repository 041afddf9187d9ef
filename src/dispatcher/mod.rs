//! Dispatcher side: worker registry, class queues and the protocol handler.
//!
//! - `registry`: worker records and liveness checks
//! - `queues`: per-class FIFO queues with `default` fallback
//! - `handler`: `Dispatcher`, the single owner of both
//! - `sweep`: periodic liveness sweep
//! - `server`: WebSocket request/reply endpoint plus read-only status routes
//! - `seed`: start-up batch loading

pub mod handler;
pub mod queues;
pub mod registry;
pub mod seed;
pub mod server;
pub mod sweep;

pub use handler::Dispatcher;
pub use queues::ClassQueues;
pub use registry::{WorkerRecord, WorkerRegistry};
pub use server::dispatch_routes;
pub use sweep::spawn_liveness_sweep;
