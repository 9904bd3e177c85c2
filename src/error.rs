//! Error types for Sockroute
//!
//! Every session failure falls into one of three kinds: a protocol error
//! (before the success reply), a dial error (backend could not be reached) or
//! a relay error (I/O failure once bytes are flowing). All three are terminal
//! for the session they belong to and never for the process.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Sockroute operations
#[derive(Error, Debug)]
pub enum FrontError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Backend dial error
    #[error("Dial error: {0}")]
    Dial(#[from] DialError),

    /// Relay error
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Malformed or unsupported client input, detected before relaying starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unsupported SOCKS version
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Command not supported (BIND, UDP ASSOCIATE or unknown)
    #[error("Command not supported: {0}")]
    UnsupportedCommand(u8),

    /// Address type not supported
    #[error("Address type not supported: {0}")]
    UnsupportedAddressType(u8),

    /// Target failed validation
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Structurally invalid frame
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Client sent more than the pending buffer allows before the backend attached
    #[error("Pending buffer overflow: {0} bytes")]
    PendingOverflow(usize),
}

/// Backend could not be established
#[derive(Error, Debug)]
pub enum DialError {
    /// Target host could not be resolved
    #[error("Failed to resolve {0}")]
    Resolve(String),

    /// Connect did not complete in time
    #[error("Connection timeout to {0}")]
    Timeout(String),

    /// Connect failed
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        /// Target that was dialed
        target: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Tunnel handshake failed
    #[error("Tunnel handshake with {server} failed: {reason}")]
    Handshake {
        /// Tunnel server address
        server: String,
        /// Failure description
        reason: String,
    },

    /// No transport available for the selected route
    #[error("No transport for route: {0}")]
    NoTransport(String),
}

/// Failure after both sides are connected
#[derive(Error, Debug)]
pub enum RelayError {
    /// Read or write failed on the client side
    #[error("Client side I/O error: {0}")]
    Client(#[source] io::Error),

    /// Read or write failed on the backend side
    #[error("Backend side I/O error: {0}")]
    Backend(#[source] io::Error),

    /// No bytes moved in either direction for the configured idle period
    #[error("Relay idle for {0:?}")]
    IdleTimeout(Duration),
}

impl DialError {
    /// Build a connect error from an I/O failure
    pub fn connect(target: impl Into<String>, source: io::Error) -> Self {
        DialError::Connect {
            target: target.into(),
            source,
        }
    }
}
