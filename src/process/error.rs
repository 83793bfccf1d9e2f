use std::path::PathBuf;
use std::time::Duration;

use crate::rpc::error::RpcError;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ProcessError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "data directory path is too long ({length} >= {ceiling} including the node's own \
         layout). Please run tests from a directory with a shorter path. Data directory: {}",
        path.display()
    )]
    PathTooLong {
        path: PathBuf,
        length: usize,
        ceiling: usize,
    },

    #[error("can not stop node {0}: it was not started by this orchestrator or is already stopped")]
    UntrackedResource(String),

    #[error("data directory {} is already used by a running node", .0.display())]
    DataDirectoryInUse(PathBuf),

    #[error("failed to launch {}: {source}", binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("node {node} exited during start-up ({status})")]
    ExitedEarly { node: String, status: String },

    #[error("node {node} had already exited ({status}) when asked to stop")]
    AlreadyExited { node: String, status: String },

    #[error("node {node} did not answer RPC within {timeout:?}")]
    StartTimeout { node: String, timeout: Duration },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}
