//! Drives bitcoind regtest nodes for functional tests of a system that
//! consumes their data: node processes, chain bootstrap, block mining and
//! synchronization on the system's event bus.
//!
//! A test typically builds a [`fixture::BitcoindFixture`], lets it start and
//! fund node 0, exercises the system under test and finally calls
//! [`fixture::BitcoindFixture::cleanup`].

pub mod bootstrap;
pub mod config_models;
pub mod error;
pub mod event_bus;
pub mod fixture;
pub mod logging;
pub mod macros;
pub mod mine;
pub mod models;
pub mod process;
pub mod rpc;


pub use error::HarnessError;
pub use fixture::BitcoindFixture;

/// Regtest address that receives test coins.
pub const TEST_ADDRESS: &str = "msRNSw5hHA1W1jXXadxMDMQCErX1X8whTk";

/// Key for [`TEST_ADDRESS`], for tests that sign spends of its coins.
pub const TEST_PRIVATE_KEY_WIF: &str = "cNpxQaWe36eHdfU3fo2jHVkWXVt5CakPDrZSYguoZiRHSz9rq8nF";
