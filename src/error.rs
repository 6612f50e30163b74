//! Error types for dualwire
//!
//! Provides a unified error type for all operations.

use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias using WireError
pub type Result<T> = std::result::Result<T, WireError>;

/// Unified error type for dualwire operations
#[derive(Debug, Error)]
pub enum WireError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Frame Errors
    // -------------------------------------------------------------------------
    /// Caller-side: the payload cannot be framed. Never a server fault.
    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Fewer bytes than the frame declares are available.
    #[error("Truncated frame: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: Transport,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Client Errors
    // -------------------------------------------------------------------------
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl WireError {
    pub(crate) fn bind(transport: Transport, addr: SocketAddr, source: std::io::Error) -> Self {
        WireError::Bind {
            transport,
            addr: addr.to_string(),
            source,
        }
    }
}

/// The two transports the server listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Connection-oriented byte stream (TCP)
    Reliable,

    /// Connectionless datagrams (UDP)
    Unreliable,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Reliable => write!(f, "tcp"),
            Transport::Unreliable => write!(f, "udp"),
        }
    }
}
