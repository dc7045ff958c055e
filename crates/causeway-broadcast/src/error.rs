//! Error types for the broadcast engine.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("invalid replicator settings: {0}")]
    InvalidSettings(String),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
