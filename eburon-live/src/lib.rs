//! # eburon-live
//!
//! Reusable realtime interview streaming SDK.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → MicCapture → SPSC RingBuffer → pump task → pcm16 chunks
//!                                                              │
//!                                                    websocket transport
//!                                                              │
//!                                                       dispatch task
//!                                              ┌───────────────┼──────────────┐
//!                                    TranscriptRecorder  PlaybackScheduler  barge-in
//!                                                              │
//!                                                   AudioSink → speaker
//! ```
//!
//! The capture callback is zero-alloc. All heap work happens in the pump and
//! dispatch tasks. Events reach the embedding application over broadcast
//! channels; the transcript and final report are pulled, not pushed.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod events;
pub mod report;
pub mod session;
pub mod transcript;
pub mod transport;
pub mod video;

// Convenience re-exports for downstream crates
pub use error::{LiveError, Result};
pub use events::{AudioLevelEvent, SessionStatus, SessionStatusEvent, SpeakingEvent};
pub use report::{InterviewReport, Recommendation, ReportGenerator};
pub use session::persona::{ApplicantProfile, VoiceId, LIVE_MODEL};
pub use session::{LiveSession, SessionConfig, SessionParts};
pub use transcript::{TranscriptItem, TranscriptRole};
pub use video::{FrameSource, RgbFrame};

#[cfg(feature = "audio-cpal")]
pub use audio::sink::CpalSink;

#[cfg(feature = "audio-cpal")]
pub use audio::MicCapture;
