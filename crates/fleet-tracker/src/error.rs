//! Tracker error types

use thiserror::Error;

use fleet_protocol::ProtocolError;
use fleet_store::StoreError;

/// Errors surfaced by the ingestion engine
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
