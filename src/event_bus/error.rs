use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SyncError {
    #[error("timed out after {timeout:?} waiting for {description}")]
    Timeout {
        description: String,
        timeout: Duration,
    },

    #[error("cancelled while waiting for {description}")]
    Cancelled { description: String },

    #[error("event bus closed while waiting for {description}")]
    BusClosed { description: String },
}
