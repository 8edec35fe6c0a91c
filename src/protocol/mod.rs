//! Streaming endpoint protocol.
//!
//! Typed inbound messages and outbound commands exchanged with the signal
//! source over a bidirectional text-frame channel.

pub mod types;

pub use types::{
    InboundMessage, MentalStateMode, MentalStateSample, OutboundCommand, TelemetryFrame,
    TelemetrySample, CHANNEL_COUNT, INBOUND_KINDS,
};
