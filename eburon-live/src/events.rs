//! Event payloads broadcast to the embedding host.
//!
//! The host UI (interview room page) consumes three feeds:
//!
//! | Event | Subscribe via |
//! |-------|---------------|
//! | `AudioLevelEvent` | `LiveSession::subscribe_levels` |
//! | `SpeakingEvent` | `LiveSession::subscribe_speaking` |
//! | `SessionStatusEvent` | `LiveSession::subscribe_status` |
//!
//! Payloads serialize camelCase so the host can forward them to its
//! JavaScript layer unchanged.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Microphone level events
// ---------------------------------------------------------------------------

/// Emitted once per captured block (unthrottled) to drive the mic meter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioLevelEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Block RMS scaled for UI responsiveness, roughly [0.0, 5.0].
    pub level: f32,
}

// ---------------------------------------------------------------------------
// Speaking indicator events
// ---------------------------------------------------------------------------

/// Emitted when the "interviewer is speaking" indicator flips.
///
/// Edge-triggered: one `true` when playback starts from idle, one `false`
/// when the last scheduled chunk finishes or an interruption hard-stops it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeakingEvent {
    pub speaking: bool,
}

// ---------------------------------------------------------------------------
// Session status events
// ---------------------------------------------------------------------------

/// Emitted when the session lifecycle state changes.
///
/// `Disconnected` is sent exactly once per actual transition, whether the
/// teardown was locally requested, remotely initiated, or an error path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (e.g. the transport error).
    pub detail: Option<String>,
}

/// Lifecycle state of a live interview session.
///
/// There is no reconnecting state: any failure lands in `Disconnected` and a
/// new session must be built for a fresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Initial state, and terminal state after teardown.
    Disconnected,
    /// Device acquisition and remote handshake in progress.
    Connecting,
    /// Streaming both ways.
    Connected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_event_serializes_with_camel_case_fields() {
        let event = AudioLevelEvent { seq: 12, level: 1.7 };

        let json = serde_json::to_value(&event).expect("serialize level event");
        assert_eq!(json["seq"], 12);
        let level = json["level"].as_f64().expect("level should be a number");
        assert!((level - 1.7).abs() < 1e-5);

        let round_trip: AudioLevelEvent =
            serde_json::from_value(json).expect("deserialize level event");
        assert_eq!(round_trip.seq, 12);
    }

    #[test]
    fn speaking_event_round_trips() {
        let json = serde_json::to_value(SpeakingEvent { speaking: true })
            .expect("serialize speaking event");
        assert_eq!(json["speaking"], true);

        let round_trip: SpeakingEvent =
            serde_json::from_value(json).expect("deserialize speaking event");
        assert!(round_trip.speaking);
    }

    #[test]
    fn status_event_serializes_with_lowercase_status() {
        let event = SessionStatusEvent {
            status: SessionStatus::Connecting,
            detail: None,
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "connecting");
        assert_eq!(json["detail"], serde_json::Value::Null);

        let round_trip: SessionStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, SessionStatus::Connecting);
    }

    #[test]
    fn session_status_rejects_non_lowercase_values() {
        let invalid = r#""Connected""#;
        assert!(serde_json::from_str::<SessionStatus>(invalid).is_err());
    }
}
