//! Lifecycle of the node processes a test runs against.

pub mod bitcoind;
pub mod error;
pub mod launcher;
pub mod orchestrator;
