use thiserror::Error;

/// All errors produced by eburon-live.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection closed by remote")]
    ConnectionClosed,

    #[error("malformed server message: {0}")]
    Protocol(String),

    #[error("audio chunk decode error: {0}")]
    AudioDecode(String),

    #[error("video frame error: {0}")]
    Video(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("session is already connected")]
    AlreadyConnected,

    #[error("report generation failed: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LiveError>;
