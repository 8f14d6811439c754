//! Error types for the ChamberView environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the simulation service.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Request could not be sent or the connection failed
    #[error("Network error: {0}")]
    NetworkError(String),
    
    /// The service answered with a non-success status
    #[error("Service returned status {0}")]
    Status(u16),
    
    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),
    
    /// The service is not reachable (simulated outage)
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    
    /// A value could not be turned into a request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }
    
    /// Creates a decode error.
    pub fn decode(msg: impl std::fmt::Display) -> Self {
        Self::DecodeError(msg.to_string())
    }
    
    /// Creates an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::decode(err)
    }
}
