//! Connection transports for the streaming endpoint.
//!
//! The connection manager drives a [`Transport`] and never touches sockets
//! directly. Connection attempts complete asynchronously; their outcome is
//! reported back as [`TransportEvent`]s tagged with the attempt that
//! produced them, so events from a superseded socket can be recognised.

pub mod websocket;

pub use websocket::WebSocketTransport;

/// A bidirectional text-frame channel to the signal source.
pub trait Transport {
    /// Begin connection attempt `attempt`.
    ///
    /// An error means the attempt could not even be started.
    fn connect(&mut self, attempt: u64) -> Result<(), TransportError>;

    /// Queue a text frame on the open connection.
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Tear down the current connection, if any. Idempotent.
    fn close(&mut self);
}

/// Something that happened on a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub attempt: u64,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    /// The connection is established
    Opened,
    /// A text frame arrived
    Frame(String),
    /// The connection ended, locally or by the peer
    Closed { reason: Option<String> },
    /// Socket-level failure
    Error(String),
}

impl TransportEvent {
    pub fn opened(attempt: u64) -> Self {
        Self {
            attempt,
            kind: TransportEventKind::Opened,
        }
    }

    pub fn frame(attempt: u64, text: impl Into<String>) -> Self {
        Self {
            attempt,
            kind: TransportEventKind::Frame(text.into()),
        }
    }

    pub fn closed(attempt: u64) -> Self {
        Self {
            attempt,
            kind: TransportEventKind::Closed { reason: None },
        }
    }

    pub fn error(attempt: u64, message: impl Into<String>) -> Self {
        Self {
            attempt,
            kind: TransportEventKind::Error(message.into()),
        }
    }
}

/// Transport errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The endpoint could not be turned into a connection request
    InvalidEndpoint(String),
    /// No open connection to write to
    NotOpen,
    /// Writing to the connection failed
    Io(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::InvalidEndpoint(e) => write!(f, "Invalid endpoint: {e}"),
            TransportError::NotOpen => write!(f, "Connection is not open"),
            TransportError::Io(e) => write!(f, "Transport IO error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}
