//! Worker side: connect, register, poll for batches and run them.
//!
//! - `state`: agent connection state machine
//! - `transport`: request/reply channel to the dispatcher
//! - `executor`: payload execution backends
//! - `agent`: the run loop tying them together

pub mod agent;
pub mod executor;
pub mod state;
pub mod transport;

pub use agent::WorkerAgent;
pub use executor::{PayloadExecutor, ShellExecutor};
pub use state::AgentState;
pub use transport::{Connection, Connector, WsConnector};
