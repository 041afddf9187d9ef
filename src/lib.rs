//! Batch dispatch: a class-routed task-batch dispatcher and its worker agent.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod worker;
