//! Wire types for the telemetry streaming endpoint.
//!
//! Inbound frames are JSON objects tagged by `type`. Outbound commands are
//! serialized the same way, so a command is always a single text frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of EEG channels carried by each telemetry frame.
pub const CHANNEL_COUNT: usize = 4;

/// The classified mental state of the subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentalStateMode {
    Calm,
    Normal,
    Stressed,
}

impl MentalStateMode {
    /// Wire name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            MentalStateMode::Calm => "calm",
            MentalStateMode::Normal => "normal",
            MentalStateMode::Stressed => "stressed",
        }
    }

    /// Parse a mode name, ignoring case and surrounding whitespace.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "calm" => Some(MentalStateMode::Calm),
            "normal" => Some(MentalStateMode::Normal),
            "stressed" => Some(MentalStateMode::Stressed),
            _ => None,
        }
    }
}

impl std::fmt::Display for MentalStateMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw channel voltages from one telemetry frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Timestamp reported by the signal source
    pub timestamp: DateTime<Utc>,
    /// Voltage per channel, in channel order
    pub channel_voltages: [f64; CHANNEL_COUNT],
}

/// Mental-state scores from one telemetry frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MentalStateSample {
    pub timestamp: DateTime<Utc>,
    pub calm_score: f64,
    pub stressed_score: f64,
    pub normal_score: f64,
    /// Classified mode, when the source attached one
    pub mode: Option<MentalStateMode>,
}

/// A decoded `telemetry` frame.
///
/// Each sub-payload is independent: a frame may carry voltages, scores,
/// both, or neither.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub timestamp: DateTime<Utc>,
    pub voltages: Option<TelemetrySample>,
    pub mental_state: Option<MentalStateSample>,
}

/// A successfully decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Telemetry(TelemetryFrame),
    MentalStateChanged { mode: MentalStateMode },
    RecordingStarted,
    RecordingStopped,
    Info { message: String },
    Error { message: String },
    StateSync { is_recording: bool },
}

impl InboundMessage {
    /// The wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Telemetry(_) => "telemetry",
            InboundMessage::MentalStateChanged { .. } => "mental_state_changed",
            InboundMessage::RecordingStarted => "recording_started",
            InboundMessage::RecordingStopped => "recording_stopped",
            InboundMessage::Info { .. } => "info",
            InboundMessage::Error { .. } => "error",
            InboundMessage::StateSync { .. } => "state_sync",
        }
    }
}

/// Wire tags accepted on the inbound side.
pub const INBOUND_KINDS: [&str; 7] = [
    "telemetry",
    "mental_state_changed",
    "recording_started",
    "recording_stopped",
    "info",
    "error",
    "state_sync",
];

/// A command sent to the streaming endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundCommand {
    StartRecording,
    StopRecording,
    SetMode { mode: MentalStateMode },
    SetMentalState { mode: MentalStateMode },
}

impl OutboundCommand {
    /// Encode the command as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Envelope used while decoding; sub-payloads stay untyped so a malformed
/// one can be dropped without losing the rest of the frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum RawInbound {
    Telemetry {
        #[serde(with = "timestamp_serde")]
        timestamp: DateTime<Utc>,
        #[serde(default)]
        raw_channels: Option<serde_json::Value>,
        #[serde(default)]
        mental_state: Option<serde_json::Value>,
    },
    MentalStateChanged {
        mode: MentalStateMode,
    },
    RecordingStarted,
    RecordingStopped,
    Info {
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    StateSync {
        is_recording: bool,
    },
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawChannels {
    pub channel_1: f64,
    pub channel_2: f64,
    pub channel_3: f64,
    pub channel_4: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawMentalState {
    pub calm_score: f64,
    pub stressed_score: f64,
    pub normal_score: f64,
    #[serde(default)]
    pub mental_state_mode: Option<MentalStateMode>,
}

/// Lenient timestamp support.
///
/// Accepts RFC3339, a naive ISO-8601 date-time (taken as UTC), or a number
/// of milliseconds since the Unix epoch. Always serializes as RFC3339.
pub(crate) mod timestamp_serde {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(f64),
        Text(String),
    }

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => DateTime::from_timestamp_millis(ms as i64)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
            Repr::Text(s) => {
                parse_text(&s).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {s}")))
            }
        }
    }

    pub fn parse_text(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(MentalStateMode::parse("Stressed"), Some(MentalStateMode::Stressed));
        assert_eq!(MentalStateMode::parse(" calm "), Some(MentalStateMode::Calm));
        assert_eq!(MentalStateMode::parse("meeting"), None);
        assert_eq!(MentalStateMode::Normal.to_string(), "normal");
    }

    #[test]
    fn test_message_kinds_match_wire_tags() {
        let messages = [
            InboundMessage::MentalStateChanged {
                mode: MentalStateMode::Calm,
            },
            InboundMessage::RecordingStarted,
            InboundMessage::RecordingStopped,
            InboundMessage::Info {
                message: String::new(),
            },
            InboundMessage::Error {
                message: String::new(),
            },
            InboundMessage::StateSync { is_recording: true },
        ];
        for message in &messages {
            assert!(INBOUND_KINDS.contains(&message.kind()));
        }
        assert_eq!(InboundMessage::RecordingStarted.kind(), "recording_started");
    }

    #[test]
    fn test_command_wire_format() {
        let start = OutboundCommand::StartRecording.encode().unwrap();
        assert_eq!(start, r#"{"type":"start_recording"}"#);

        let calm = OutboundCommand::SetMentalState {
            mode: MentalStateMode::Calm,
        }
        .encode()
        .unwrap();
        assert_eq!(calm, r#"{"type":"set_mental_state","mode":"calm"}"#);

        let mode = OutboundCommand::SetMode {
            mode: MentalStateMode::Stressed,
        }
        .encode()
        .unwrap();
        assert_eq!(mode, r#"{"type":"set_mode","mode":"stressed"}"#);
    }

    #[test]
    fn test_timestamp_formats() {
        let rfc = timestamp_serde::parse_text("2024-01-22T10:00:01Z").unwrap();
        let naive = timestamp_serde::parse_text("2024-01-22T10:00:01.500000").unwrap();
        assert_eq!(rfc.timestamp(), naive.timestamp());
        assert_eq!(naive.timestamp_subsec_millis(), 500);
        assert!(timestamp_serde::parse_text("yesterday").is_none());
    }
}
