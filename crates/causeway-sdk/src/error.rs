//! Error types for the Causeway SDK.

use causeway_broadcast::BroadcastError;
use causeway_core::CoreError;
use thiserror::Error;

/// Error type for SDK operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SdkError {
    /// A request with the same correlation id is still waiting for its reply.
    #[error("another request with correlation id {correlation_id} is already pending")]
    Correlation { correlation_id: u64 },
    /// The request was cancelled before a reply arrived.
    #[error("request {correlation_id} was cancelled")]
    Cancelled { correlation_id: u64 },
    /// The replicator for a topic is no longer running.
    #[error("replicator for topic {0} has stopped")]
    ReplicatorStopped(String),
    /// The receiving side of a channel is gone.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
    /// Storage failure.
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Persistence(err.to_string())
    }
}

/// Result type for SDK operations.
pub type Result<T> = std::result::Result<T, SdkError>;
