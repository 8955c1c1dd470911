//! Error types for the fleet telemetry core

use thiserror::Error;

/// Core error type for the fleet telemetry system
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid position: latitude={lat}, longitude={lng}")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn invalid_position(lat: f64, lng: f64) -> Self {
        Self::InvalidPosition { lat, lng }
    }

    pub fn invalid_window(msg: impl Into<String>) -> Self {
        Self::InvalidWindow(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
