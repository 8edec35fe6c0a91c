//! Inbound frame decoding and dispatch.
//!
//! Frames are decoded into [`InboundMessage`]s and applied to the
//! [`DashboardState`] in arrival order. A frame that fails to decode is
//! dropped; it never affects the connection or the dashboard.

use crate::core::buffer::TelemetryBuffer;
use crate::protocol::types::{RawChannels, RawInbound, RawMentalState};
use crate::protocol::{
    InboundMessage, MentalStateMode, MentalStateSample, TelemetryFrame, TelemetrySample,
    INBOUND_KINDS,
};

/// Why a frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not valid JSON
    InvalidJson(String),
    /// Not an object with a string `type` tag
    MissingType,
    /// A tag this client does not understand
    UnknownType(String),
    /// A known tag with missing or invalid fields
    Malformed { kind: String, reason: String },
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            DecodeError::MissingType => write!(f, "missing message type"),
            DecodeError::UnknownType(kind) => write!(f, "unknown message type '{kind}'"),
            DecodeError::Malformed { kind, reason } => {
                write!(f, "malformed '{kind}' message: {reason}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// A change of the current mental-state mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub previous: Option<MentalStateMode>,
    pub current: MentalStateMode,
}

impl ModeChange {
    /// True when this change moves into `mode` from a different mode.
    pub fn entered(&self, mode: MentalStateMode) -> bool {
        self.current == mode && self.previous != Some(mode)
    }
}

/// Everything the display layer reads.
#[derive(Debug, Clone)]
pub struct DashboardState {
    voltages: TelemetryBuffer<TelemetrySample>,
    mental_states: TelemetryBuffer<MentalStateSample>,
    mode: Option<MentalStateMode>,
    is_recording: bool,
    status: String,
    error: Option<String>,
}

impl DashboardState {
    /// Create an empty dashboard with `capacity` samples per series.
    pub fn new(capacity: usize) -> Self {
        Self {
            voltages: TelemetryBuffer::new(capacity),
            mental_states: TelemetryBuffer::new(capacity),
            mode: None,
            is_recording: false,
            status: "Disconnected".to_string(),
            error: None,
        }
    }

    pub fn voltages(&self) -> &TelemetryBuffer<TelemetrySample> {
        &self.voltages
    }

    pub fn mental_states(&self) -> &TelemetryBuffer<MentalStateSample> {
        &self.mental_states
    }

    pub fn mode(&self) -> Option<MentalStateMode> {
        self.mode
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    /// Human-readable status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Most recent transient error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    pub(crate) fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    pub(crate) fn clear_error(&mut self) {
        self.error = None;
    }

    /// Record a new mode, returning the change it represents.
    pub(crate) fn set_mode(&mut self, mode: MentalStateMode) -> ModeChange {
        let previous = self.mode.replace(mode);
        ModeChange {
            previous,
            current: mode,
        }
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(crate::core::buffer::DEFAULT_CAPACITY)
    }
}

/// Decodes frames and applies them to a dashboard.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageRouter;

impl MessageRouter {
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw text frame.
    pub fn decode(&self, raw: &str) -> Result<InboundMessage, DecodeError> {
        let value: serde_json::Value =
            serde_json::from_str(raw).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .ok_or(DecodeError::MissingType)?
            .to_string();
        if !INBOUND_KINDS.contains(&kind.as_str()) {
            return Err(DecodeError::UnknownType(kind));
        }

        let raw: RawInbound = serde_json::from_value(value).map_err(|e| DecodeError::Malformed {
            kind: kind.clone(),
            reason: e.to_string(),
        })?;

        Ok(match raw {
            RawInbound::Telemetry {
                timestamp,
                raw_channels,
                mental_state,
            } => InboundMessage::Telemetry(TelemetryFrame {
                timestamp,
                voltages: raw_channels.and_then(|v| {
                    serde_json::from_value::<RawChannels>(v)
                        .map_err(|e| tracing::debug!(error = %e, "ignoring malformed raw_channels"))
                        .ok()
                        .map(|c| TelemetrySample {
                            timestamp,
                            channel_voltages: [c.channel_1, c.channel_2, c.channel_3, c.channel_4],
                        })
                }),
                mental_state: mental_state.and_then(|v| {
                    serde_json::from_value::<RawMentalState>(v)
                        .map_err(|e| tracing::debug!(error = %e, "ignoring malformed mental_state"))
                        .ok()
                        .map(|m| MentalStateSample {
                            timestamp,
                            calm_score: m.calm_score,
                            stressed_score: m.stressed_score,
                            normal_score: m.normal_score,
                            mode: m.mental_state_mode,
                        })
                }),
            }),
            RawInbound::MentalStateChanged { mode } => InboundMessage::MentalStateChanged { mode },
            RawInbound::RecordingStarted => InboundMessage::RecordingStarted,
            RawInbound::RecordingStopped => InboundMessage::RecordingStopped,
            RawInbound::Info { message } => InboundMessage::Info { message },
            RawInbound::Error { message } => InboundMessage::Error { message },
            RawInbound::StateSync { is_recording } => InboundMessage::StateSync { is_recording },
        })
    }

    /// Apply a decoded message, returning the mode change it carried.
    pub fn dispatch(
        &self,
        message: InboundMessage,
        dashboard: &mut DashboardState,
    ) -> Option<ModeChange> {
        match message {
            InboundMessage::Telemetry(frame) => {
                if let Some(sample) = frame.voltages {
                    dashboard.voltages.push(sample);
                }
                let mode = frame.mental_state.as_ref().and_then(|m| m.mode);
                if let Some(sample) = frame.mental_state {
                    dashboard.mental_states.push(sample);
                }
                mode.map(|mode| dashboard.set_mode(mode))
            }
            InboundMessage::MentalStateChanged { mode } => Some(dashboard.set_mode(mode)),
            InboundMessage::RecordingStarted => {
                dashboard.is_recording = true;
                dashboard.set_status("Recording...");
                dashboard.clear_error();
                None
            }
            InboundMessage::RecordingStopped => {
                dashboard.is_recording = false;
                dashboard.set_status("Connected (Stopped)");
                None
            }
            InboundMessage::Info { message } => {
                dashboard.set_status(message);
                None
            }
            InboundMessage::Error { message } => {
                tracing::warn!(%message, "signal source reported an error");
                dashboard.set_error(message);
                dashboard.set_status("Error");
                dashboard.is_recording = false;
                None
            }
            InboundMessage::StateSync { is_recording } => {
                if dashboard.is_recording != is_recording {
                    tracing::info!(is_recording, "recording state reconciled with source");
                }
                dashboard.is_recording = is_recording;
                dashboard.set_status(if is_recording {
                    "Recording..."
                } else {
                    "Connected"
                });
                None
            }
        }
    }

    /// Decode and dispatch in one step.
    pub fn route(
        &self,
        raw: &str,
        dashboard: &mut DashboardState,
    ) -> Result<Option<ModeChange>, DecodeError> {
        let message = self.decode(raw)?;
        tracing::trace!(kind = message.kind(), "routing frame");
        Ok(self.dispatch(message, dashboard))
    }
}
