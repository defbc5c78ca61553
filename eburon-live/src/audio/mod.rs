//! Microphone capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback therefore only mixes down to mono and writes into an SPSC
//! ring buffer producer whose `push_slice` is lock-free and allocation-free.
//! The consumer half is drained by the session's capture pump, which is the
//! terminal sink of the capture path: microphone samples are never routed to
//! an output stream, so the local speaker carries no echo of the microphone.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `MicCapture` must be created and dropped on the same thread; the
//! session does this by opening it inside `tokio::task::spawn_blocking`.

pub mod pcm;
pub mod playback;
pub mod resample;
#[cfg(feature = "audio-cpal")]
pub mod sink;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::{
    buffering::CaptureProducer,
    error::{LiveError, Result},
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// Sample rate of the outbound audio wire format (Hz).
pub const PIPELINE_RATE_HZ: u32 = 16_000;

/// Sample rate of inbound model speech (Hz).
pub const PLAYBACK_RATE_HZ: u32 = 24_000;

/// Samples per capture block: the unit of work handed to the encoder, the
/// transport, and the volume meter.
pub const BLOCK_SAMPLES: usize = 4096;

/// Gain applied to the per-block RMS before it is reported as a level event.
pub const VOLUME_GAIN: f32 = 5.0;

/// Root-mean-square of one capture block.
pub fn block_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Handle to an active microphone capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct MicCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — set to `false` to signal the callback to no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate reported by the device (Hz).
    pub sample_rate: u32,
}

/// Mix one interleaved callback buffer down to mono and push it into the ring.
///
/// `mix_buf` is reused across callbacks so the hot path stays allocation-free
/// after the first invocation.
#[cfg(feature = "audio-cpal")]
fn push_frames<T: Copy>(
    producer: &mut CaptureProducer,
    mix_buf: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    to_f32: impl Fn(T) -> f32,
) {
    let frames = data.len() / channels;
    mix_buf.resize(frames, 0.0);
    if channels == 1 {
        for (dst, s) in mix_buf.iter_mut().zip(data.iter()) {
            *dst = to_f32(*s);
        }
    } else {
        for (f, dst) in mix_buf.iter_mut().enumerate() {
            let base = f * channels;
            let mut sum = 0f32;
            for c in 0..channels {
                sum += to_f32(data[base + c]);
            }
            *dst = sum / channels as f32;
        }
    }
    let written = producer.push_slice(mix_buf);
    if written < mix_buf.len() {
        warn!(
            "capture ring full: dropped {} frames",
            mix_buf.len() - written
        );
    }
}

impl MicCapture {
    /// Open the system default microphone and push mono f32 frames into
    /// `producer` at the device's native rate.
    ///
    /// Must be called from the thread that will also drop this value. In
    /// practice this means calling it inside `tokio::task::spawn_blocking`.
    ///
    /// # Errors
    /// Returns `LiveError::NoDefaultInputDevice` when no microphone is
    /// available, `LiveError::AudioDevice` when the device rejects its own
    /// default config (the usual shape of a denied permission), or
    /// `LiveError::AudioStream` if cpal fails to build the stream.
    #[cfg(feature = "audio-cpal")]
    pub fn open_default(mut producer: CaptureProducer, running: Arc<AtomicBool>) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(LiveError::NoDefaultInputDevice)?;

        info!(
            device = device.name().unwrap_or_default().as_str(),
            "opening input device"
        );

        let supported = device
            .default_input_config()
            .map_err(|e| LiveError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        info!(sample_rate, channels, "capture config selected");

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let ch = channels as usize;

        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                let flag = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[f32], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        push_frames(&mut producer, &mut mix_buf, data, ch, |s| s);
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            SampleFormat::I16 => {
                let flag = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[i16], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        push_frames(&mut producer, &mut mix_buf, data, ch, |s| {
                            f32::from(s) / 32768.0
                        });
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            SampleFormat::U8 => {
                let flag = Arc::clone(&running);
                let mut mix_buf: Vec<f32> = Vec::new();
                device.build_input_stream(
                    &config,
                    move |data: &[u8], _info| {
                        if !flag.load(Ordering::Relaxed) {
                            return;
                        }
                        push_frames(&mut producer, &mut mix_buf, data, ch, |s| {
                            (f32::from(s) - 128.0) / 128.0
                        });
                    },
                    |err| error!("capture stream error: {err}"),
                    None,
                )
            }

            fmt => {
                return Err(LiveError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| LiveError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| LiveError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open_default(_producer: CaptureProducer, _running: Arc<AtomicBool>) -> Result<Self> {
        Err(LiveError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    /// Stop: signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}
