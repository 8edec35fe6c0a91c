//! WebSocket transport built on tokio-tungstenite.
//!
//! Each connection attempt runs on its own task that forwards socket
//! activity to the event channel and writes queued outbound frames.
//! Closing the transport aborts that task. A handshake that does not
//! complete within the connect timeout is reported as an error followed by a
//! close, so a silent server cannot hold an attempt open.

use crate::transport::{Transport, TransportError, TransportEvent, TransportEventKind};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;

/// Default limit on the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// WebSocket connection to the streaming endpoint.
///
/// Must be used from within a tokio runtime.
pub struct WebSocketTransport {
    url: String,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a transport for `url` that reports on `events`.
    pub fn new(url: impl Into<String>, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            events,
            outbound: None,
            task: None,
        }
    }

    /// Abandon handshakes that take longer than `timeout`.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Transport for WebSocketTransport {
    fn connect(&mut self, attempt: u64) -> Result<(), TransportError> {
        self.close();

        let request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        self.task = Some(tokio::spawn(run_socket(
            request,
            attempt,
            self.connect_timeout,
            events,
            outbound_rx,
        )));
        self.outbound = Some(outbound_tx);
        Ok(())
    }

    fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::NotOpen)?;
        outbound
            .send(frame.to_string())
            .map_err(|_| TransportError::NotOpen)
    }

    fn close(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_socket(
    request: Request,
    attempt: u64,
    connect_timeout: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let emit = |kind: TransportEventKind| {
        let _ = events.send(TransportEvent { attempt, kind });
    };

    let stream = match tokio::time::timeout(connect_timeout, connect_async(request)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            emit(TransportEventKind::Error(e.to_string()));
            emit(TransportEventKind::Closed { reason: None });
            return;
        }
        Err(_) => {
            tracing::debug!(
                attempt,
                timeout_ms = connect_timeout.as_millis() as u64,
                "websocket handshake timed out"
            );
            emit(TransportEventKind::Error(format!(
                "handshake timed out after {}ms",
                connect_timeout.as_millis()
            )));
            emit(TransportEventKind::Closed { reason: None });
            return;
        }
    };
    tracing::debug!(attempt, "websocket handshake complete");
    emit(TransportEventKind::Opened);

    let (mut write, mut read) = stream.split();

    let reason = loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEventKind::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.as_str().to_owned());
                }
                // Pings are answered by tungstenite; binary frames are not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(TransportEventKind::Error(e.to_string()));
                    break None;
                }
                None => break None,
            },
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        emit(TransportEventKind::Error(e.to_string()));
                        break None;
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    break Some("closed locally".to_string());
                }
            },
        }
    };

    emit(TransportEventKind::Closed { reason });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_fails_synchronously() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::new("not a websocket url", tx);

        let result = transport.connect(1);
        assert!(matches!(result, Err(TransportError::InvalidEndpoint(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_connect_timeout_defaults_and_overrides() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let transport = WebSocketTransport::new("ws://127.0.0.1:1", tx);
        assert_eq!(transport.url(), "ws://127.0.0.1:1");
        assert_eq!(transport.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);

        let transport = transport.with_connect_timeout(Duration::from_millis(250));
        assert_eq!(transport.connect_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_send_without_connection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = WebSocketTransport::new("ws://127.0.0.1:1", tx);
        assert_eq!(transport.send("{}"), Err(TransportError::NotOpen));
    }
}
