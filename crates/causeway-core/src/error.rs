//! Error types for logical-time operations.

use thiserror::Error;

/// Errors raised while reconciling versioned values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("concurrent update with identical system timestamps: {left} vs {right}")]
    ConcurrentUpdate { left: String, right: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
