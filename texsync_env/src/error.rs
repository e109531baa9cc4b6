//! Error types for the texsync environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The replication transport could not be established at startup.
    ///
    /// Nodes treat this as fatal: there is no retry or reconnection.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),
    
    /// Network I/O failed after startup
    #[error("Network error: {0}")]
    Network(String),
    
    /// The transport has shut down and no longer accepts snapshots
    #[error("Transport closed")]
    Closed,
    
    /// A received byte sequence does not have the configured snapshot length
    #[error("Wire size mismatch: expected {expected} bytes, got {actual}")]
    WireSize { expected: usize, actual: usize },
    
    /// Snapshot bytes had the right length but could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
    
    /// Creates a startup failure for the given endpoint.
    pub fn unavailable(endpoint: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        Self::TransportUnavailable(format!("{}: {}", endpoint, cause))
    }
    
    /// Returns true if this error should abort node startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }
}
