use bitcoin::address::ParseError;

use crate::bootstrap::BootstrapError;
use crate::event_bus::error::SyncError;
use crate::mine::MineError;
use crate::models::node::NodeRepositoryError;
use crate::process::error::ProcessError;
use crate::rpc::error::RpcError;

/// Any failure a fixture operation can surface.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HarnessError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Mine(#[from] MineError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    NodeRepository(#[from] NodeRepositoryError),

    #[error("invalid test address: {0}")]
    Address(#[from] ParseError),

    #[error("node {0} has not been started")]
    NodeNotStarted(usize),

    #[error("no coins left in the queue")]
    OutOfCoins,
}
