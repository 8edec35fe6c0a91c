//! Calmwave - resilient real-time EEG telemetry client.
//!
//! This library keeps one streaming connection to a signal source alive,
//! decodes its event protocol into rolling sample buffers and runs a guided
//! breathing exercise whenever the subject becomes stressed.
//!
//! # Guarantees
//!
//! - **Self-healing**: a lost connection is retried every few seconds, forever
//! - **One attempt at a time**: reconnect timer and liveness check share one guard
//! - **Bounded memory**: each sample series keeps only the latest 60 entries
//! - **No stale timers**: every timer is cancelled with the state that owns it
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       TelemetryClient                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌──────────────────┐    │
//! │  │ Connection │──▶│   Message   │──▶│ TelemetryBuffers │    │
//! │  │  Manager   │   │   Router    │   │  (60 samples)    │    │
//! │  └────────────┘   └─────────────┘   └──────────────────┘    │
//! │        ▲                 │ stressed                          │
//! │        │                 ▼                                   │
//! │        │          ┌─────────────┐   ┌──────────────────┐    │
//! │        └──calm────│Intervention │◀──│   Notification   │    │
//! │                   │ Controller  │   │     Gateway      │    │
//! │                   └─────────────┘   └──────────────────┘    │
//! │                      Timers (one queue, virtual clock)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use calmwave_client::core::{ClientConfig, TelemetryClient};
//! use calmwave_client::notify::NoopNotifier;
//! use calmwave_client::transport::WebSocketTransport;
//! use rand::SeedableRng;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
//! let transport = WebSocketTransport::new("ws://localhost:8765", events_tx);
//! let rng = Box::new(rand::rngs::StdRng::from_entropy());
//! let mut client =
//!     TelemetryClient::new(transport, NoopNotifier::new(), ClientConfig::default(), rng);
//!
//! let epoch = tokio::time::Instant::now();
//! client.start(Duration::ZERO);
//! while let Some(event) = events_rx.recv().await {
//!     client.handle_transport(event, epoch.elapsed());
//!     println!("{}", client.dashboard().status());
//! }
//! # }
//! ```

pub mod activity;
pub mod config;
pub mod core;
pub mod error;
pub mod notify;
pub mod protocol;
pub mod runtime;
pub mod transport;

#[cfg(feature = "history")]
pub mod history;

// Re-export key types at crate root for convenience
pub use activity::{ActivityLog, ActivityStats, SharedActivityLog};
pub use config::{Config, ConfigError};
pub use crate::core::{
    ClientConfig, ClientEvent, ConnectionState, DashboardState, TelemetryBuffer, TelemetryClient,
};
pub use error::ClientError;
pub use notify::{ConsoleNotifier, NoopNotifier, NotificationCapability, PermissionState};
pub use protocol::{InboundMessage, MentalStateMode, OutboundCommand};
pub use transport::{Transport, TransportEvent, WebSocketTransport};

#[cfg(feature = "history")]
pub use history::{
    BlockingHistoryClient, EventQuery, HistoricalEvent, HistoryClient, HistoryConfig,
    HistoryError, UserStats,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
