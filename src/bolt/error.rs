//! Bolt protocol error types.

use std::fmt;
use std::io;

use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Wire-level errors. Every variant leaves the connection unusable.
#[derive(Debug)]
pub enum BoltError {
    /// I/O error
    Io(io::Error),

    /// Handshake error
    Handshake(HandshakeError),

    /// PackStream serialization error
    PackStream(PackStreamError),

    /// Protocol error (unexpected message, malformed framing, ...)
    Protocol(String),

    /// Message too large
    MessageTooLarge {
        /// Size of the offending message
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Read timed out
    Timeout,

    /// Connection closed by the peer
    ConnectionClosed,
}

impl fmt::Display for BoltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoltError::Io(e) => write!(f, "I/O error: {}", e),
            BoltError::Handshake(e) => write!(f, "Handshake error: {}", e),
            BoltError::PackStream(e) => write!(f, "PackStream error: {}", e),
            BoltError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BoltError::MessageTooLarge { size, max } => {
                write!(f, "Message too large: {} bytes (max: {})", size, max)
            }
            BoltError::Timeout => write!(f, "Operation timed out"),
            BoltError::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl BoltError {
    /// Whether the failure happened below the message layer
    /// (socket, handshake, timeout) rather than in message content.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            BoltError::Io(_) | BoltError::Handshake(_) | BoltError::Timeout | BoltError::ConnectionClosed
        )
    }
}

impl std::error::Error for BoltError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BoltError::Io(e) => Some(e),
            BoltError::Handshake(e) => Some(e),
            BoltError::PackStream(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BoltError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => BoltError::ConnectionClosed,
            _ => BoltError::Io(err),
        }
    }
}

impl From<HandshakeError> for BoltError {
    fn from(err: HandshakeError) -> Self {
        BoltError::Handshake(err)
    }
}

impl From<PackStreamError> for BoltError {
    fn from(err: PackStreamError) -> Self {
        BoltError::PackStream(err)
    }
}

/// Handshake-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Server agreed on none of the proposed versions
    NoCompatibleVersion,

    /// Server answered like an HTTP endpoint
    HttpEndpoint,

    /// Server picked a version that was never proposed
    UnexpectedVersion([u8; 4]),

    /// Connection closed during handshake
    ConnectionClosed,

    /// Handshake timeout
    Timeout,
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeError::NoCompatibleVersion => {
                write!(f, "No compatible protocol version found")
            }
            HandshakeError::HttpEndpoint => write!(
                f,
                "Server responded HTTP. Make sure you are not trying to connect to the http endpoint \
                 (HTTP defaults to port 7474 whereas BOLT defaults to port 7687)"
            ),
            HandshakeError::UnexpectedVersion(bytes) => {
                write!(f, "Server selected a version that was not proposed: {:02X?}", bytes)
            }
            HandshakeError::ConnectionClosed => {
                write!(f, "Connection closed during handshake")
            }
            HandshakeError::Timeout => {
                write!(f, "Handshake timed out")
            }
        }
    }
}

impl std::error::Error for HandshakeError {}
