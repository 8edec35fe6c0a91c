//! Core of the telemetry client.
//!
//! This module contains:
//! - A cancellable timer queue on a monotonic clock
//! - Connection lifecycle with unlimited reconnects and a liveness check
//! - Frame decoding and the rolling sample buffers it feeds
//! - The guided breathing state machine
//! - [`TelemetryClient`], which ties them together without doing IO

pub mod buffer;
pub mod client;
pub mod connection;
pub mod intervention;
pub mod router;
pub mod scheduler;

// Re-export commonly used types
pub use buffer::{TelemetryBuffer, DEFAULT_CAPACITY};
pub use client::{ClientConfig, ClientEvent, TelemetryClient};
pub use connection::{ConnectionManager, ConnectionState, ReconnectState};
pub use intervention::{
    BreathPhase, Encouragement, InterventionController, InterventionSession, SessionEnd,
    ENCOURAGING_MESSAGES,
};
pub use router::{DashboardState, DecodeError, MessageRouter, ModeChange};
pub use scheduler::{FiredTimer, TimerId, TimerKind, Timers};
