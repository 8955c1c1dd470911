//! Error types for transmission parsing

use thiserror::Error;

/// Protocol error type
///
/// Only a broken outer batch container is fatal; individual entries that
/// fail the field format are dropped silently by the parser.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed batch: {0}")]
    MalformedBatch(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProtocolError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
