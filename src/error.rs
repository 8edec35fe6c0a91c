//! Client error taxonomy.
//!
//! None of these are fatal: the client keeps reconnecting indefinitely and
//! reflects the latest transient condition in its status text.

use crate::transport::TransportError;

/// Errors surfaced by client operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// An inbound frame could not be decoded and was dropped
    Decode(String),
    /// A command was issued while the connection was not open
    NotConnected,
    /// The connection closed unexpectedly
    ConnectionLost(String),
    /// System notifications are denied or missing
    PermissionUnavailable,
    /// The transport rejected an operation
    Transport(String),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Decode(e) => write!(f, "Decode failure: {e}"),
            ClientError::NotConnected => write!(f, "Not connected to the telemetry stream"),
            ClientError::ConnectionLost(e) => write!(f, "Connection lost: {e}"),
            ClientError::PermissionUnavailable => {
                write!(f, "System notification permission unavailable")
            }
            ClientError::Transport(e) => write!(f, "Transport error: {e}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotOpen => ClientError::NotConnected,
            other => ClientError::Transport(other.to_string()),
        }
    }
}
