//! Domain events carried by the in-process event bus.
//!
//! These are produced by collaborators outside this crate (the ZMQ bridge
//! and the persistence pipeline); the harness only waits for them.

use bitcoin::BlockHash;
use serde::Deserialize;
use serde::Serialize;

/// A ZMQ topic subscription to a node became active.
///
/// Nodes do not replay notifications, so anything that happens before this
/// event may go unnoticed by the rest of the system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZmqSubscribedEvent {
    pub topic: String,
    pub endpoint: String,
}

/// A block announced by a node was noticed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockDiscoveredEvent {
    pub block_hash: BlockHash,
}

/// A block has been parsed and written to the database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockAvailableInDb {
    pub block_hash: BlockHash,
    pub height: u64,
}
