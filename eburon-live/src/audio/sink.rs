//! Speaker output via cpal.
//!
//! The device callback is the single consumer of a scheduled-chunk queue and
//! advances a rendered-frame counter. That counter doubles as the playback
//! clock: [`SinkClock`] reads it, so scheduler cursor arithmetic and the
//! callback agree on what "now" means without any cross-thread time math.
//!
//! `cpal::Stream` is not `Send`; the [`CpalSink`] owner stays on the thread
//! that opened it while [`SinkHandle`] and [`SinkClock`] travel freely.

use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::audio::playback::{AudioSink, HandleId, PlaybackClock};
use crate::audio::PLAYBACK_RATE_HZ;
use crate::buffering::chunk::AudioChunk;
use crate::error::{LiveError, Result};

struct Scheduled {
    handle: HandleId,
    samples: Vec<f32>,
    start_frame: u64,
}

struct Playing {
    handle: HandleId,
    samples: Vec<f32>,
    pos: usize,
}

/// Chunks waiting for their start frame, plus the one mid-render.
struct SinkQueue {
    pending: VecDeque<Scheduled>,
    current: Option<Playing>,
}

impl SinkQueue {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
        }
    }

    /// Produce the sample for absolute output frame `frame`. Silence while
    /// nothing is due. Reports the handle on the frame that drains a chunk;
    /// a chunk with no samples completes at promotion instead.
    fn render_frame(&mut self, frame: u64, completion_tx: &Sender<HandleId>) -> f32 {
        while self.current.is_none() {
            let due = self
                .pending
                .front()
                .is_some_and(|next| next.start_frame <= frame);
            if !due {
                break;
            }
            let Some(next) = self.pending.pop_front() else {
                break;
            };
            if next.samples.is_empty() {
                let _ = completion_tx.send(next.handle);
                continue;
            }
            self.current = Some(Playing {
                handle: next.handle,
                samples: next.samples,
                pos: 0,
            });
        }

        match self.current.as_mut() {
            Some(playing) => {
                let sample = playing.samples[playing.pos];
                playing.pos += 1;
                if playing.pos == playing.samples.len() {
                    let _ = completion_tx.send(playing.handle);
                    self.current = None;
                }
                sample
            }
            None => 0.0,
        }
    }
}

struct SinkShared {
    queue: Mutex<SinkQueue>,
    frames_rendered: AtomicU64,
    completion_tx: Sender<HandleId>,
}

impl SinkShared {
    /// Fill one interleaved output buffer, mono duplicated across channels.
    fn fill<T: Copy>(&self, data: &mut [T], channels: usize, from_f32: impl Fn(f32) -> T) {
        let frames = data.len() / channels;
        let base = self.frames_rendered.load(Ordering::Relaxed);
        {
            let mut queue = self.queue.lock();
            for i in 0..frames {
                let sample = queue.render_frame(base + i as u64, &self.completion_tx);
                let value = from_f32(sample);
                for ch in 0..channels {
                    data[i * channels + ch] = value;
                }
            }
        }
        self.frames_rendered
            .fetch_add(frames as u64, Ordering::Relaxed);
    }
}

/// Owner of the output stream. Not `Send`; park it on its opening thread.
pub struct CpalSink {
    _stream: Stream,
    shared: Arc<SinkShared>,
}

impl CpalSink {
    /// Open the default output device at exactly [`PLAYBACK_RATE_HZ`].
    ///
    /// The rate is fixed because start frames are computed from it; a device
    /// that cannot run at 24 kHz is an error rather than a resample job.
    pub fn open_default(completion_tx: Sender<HandleId>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(LiveError::NoDefaultOutputDevice)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let supported = device
            .supported_output_configs()
            .map_err(|e| LiveError::AudioDevice(format!("output config query failed: {e}")))?
            .find_map(|range| range.try_with_sample_rate(SampleRate(PLAYBACK_RATE_HZ)))
            .ok_or_else(|| {
                LiveError::AudioStream(format!(
                    "output device does not support {PLAYBACK_RATE_HZ} hz playback"
                ))
            })?;
        let channels = supported.channels() as usize;
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: SampleRate(PLAYBACK_RATE_HZ),
            buffer_size: cpal::BufferSize::Default,
        };

        let shared = Arc::new(SinkShared {
            queue: Mutex::new(SinkQueue::new()),
            frames_rendered: AtomicU64::new(0),
            completion_tx,
        });

        let err_fn = |e| warn!("output stream error: {e}");
        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                let state = Arc::clone(&shared);
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        state.fill(data, channels, |s| s);
                    },
                    err_fn,
                    None,
                )
            }
            cpal::SampleFormat::I16 => {
                let state = Arc::clone(&shared);
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        state.fill(data, channels, |s| (s.clamp(-1.0, 1.0) * 32767.0) as i16);
                    },
                    err_fn,
                    None,
                )
            }
            other => {
                return Err(LiveError::AudioStream(format!(
                    "unsupported output sample format: {other:?}"
                )))
            }
        }
        .map_err(|e| LiveError::AudioStream(format!("failed to build output stream: {e}")))?;

        stream
            .play()
            .map_err(|e| LiveError::AudioStream(format!("failed to start output stream: {e}")))?;
        info!(device = %name, rate = PLAYBACK_RATE_HZ, channels, "audio output opened");

        Ok(Self {
            _stream: stream,
            shared,
        })
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn clock(&self) -> SinkClock {
        SinkClock {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Scheduling half handed to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct SinkHandle {
    shared: Arc<SinkShared>,
}

impl AudioSink for SinkHandle {
    fn schedule(&self, handle: HandleId, chunk: AudioChunk, start_at: f64) {
        if chunk.sample_rate != PLAYBACK_RATE_HZ {
            warn!(
                rate = chunk.sample_rate,
                "chunk rate differs from output rate, playing as-is"
            );
        }
        let start_frame = (start_at * f64::from(PLAYBACK_RATE_HZ)).round() as u64;
        self.shared.queue.lock().pending.push_back(Scheduled {
            handle,
            samples: chunk.samples,
            start_frame,
        });
    }

    fn halt(&self) {
        let mut queue = self.shared.queue.lock();
        queue.pending.clear();
        queue.current = None;
    }
}

/// Playback time read straight off the rendered-frame counter.
pub struct SinkClock {
    shared: Arc<SinkShared>,
}

impl PlaybackClock for SinkClock {
    fn now(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Relaxed) as f64 / f64::from(PLAYBACK_RATE_HZ)
    }
}
