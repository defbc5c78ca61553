//! Live interview session controller.
//!
//! ```text
//!  microphone ──► ring ──► pump task ──► resample ──► 4096-sample blocks
//!                                                        │         │
//!                                                  level events   pcm16 + base64
//!                                                                    │
//!                                                                    ▼
//!  ┌──────────────────────────── websocket transport ────────────────────────┐
//!  │  realtimeInput (audio, video)          serverContent (audio, text)      │
//!  └──────────────────────────────────────────┬──────────────────────────────┘
//!                                             ▼
//!                                       dispatch task
//!                              ┌──────────┼─────────────┐
//!                              ▼          ▼             ▼
//!                        transcript   playback      interrupt
//!                         recorder    scheduler     (barge-in)
//! ```
//!
//! One connection is one epoch: microphone first (no microphone, no
//! interview), then speaker, then the websocket handshake, then the worker
//! tasks. Teardown runs exactly once per epoch no matter who triggers it,
//! emitting a single `disconnected` status event.

pub mod persona;
pub mod wire;

use std::future::Future;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::audio::pcm::{decode_pcm16, encode_pcm16};
use crate::audio::playback::{AudioSink, HandleId, PlaybackClock, PlaybackScheduler};
use crate::audio::resample::RateConverter;
use crate::audio::{block_rms, BLOCK_SAMPLES, PIPELINE_RATE_HZ, PLAYBACK_RATE_HZ, VOLUME_GAIN};
use crate::buffering::{CaptureConsumer, Consumer};
use crate::error::{LiveError, Result};
use crate::events::{AudioLevelEvent, SessionStatus, SessionStatusEvent, SpeakingEvent};
use crate::transcript::{TranscriptItem, TranscriptRecorder};
use crate::transport::Transport;
use crate::video::{FrameSource, VideoSampler};
use persona::{ApplicantProfile, VoiceId, LIVE_MODEL};
use wire::{ClientMessage, ServerMessage};

/// Default live service endpoint. The API key is appended as a query
/// parameter at connect time.
pub const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Environment variable consulted for the API key when the config leaves it
/// empty.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const EVENT_CAPACITY: usize = 256;
const PUMP_INTERVAL: Duration = Duration::from_millis(20);
const DISPATCH_TICK: Duration = Duration::from_millis(25);
const RESAMPLER_CHUNK: usize = 1024;

// ── 1. configuration ────────────────────────────────────────────────────────

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: VoiceId,
    /// Candidate briefing folded into the system instruction. Without it the
    /// interviewer runs a generic interview.
    pub applicant: Option<ApplicantProfile>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: std::env::var(API_KEY_ENV).unwrap_or_default(),
            model: LIVE_MODEL.to_string(),
            voice: VoiceId::default(),
            applicant: None,
        }
    }
}

impl SessionConfig {
    /// Checks only what the real connect path needs; injected transports
    /// carry their own credentials.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(LiveError::Config("endpoint is empty".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(LiveError::Config(format!(
                "api key is not set; fill SessionConfig.api_key or export {API_KEY_ENV}"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(LiveError::Config("model is empty".to_string()));
        }
        Ok(())
    }
}

// ── 2. diagnostics ──────────────────────────────────────────────────────────

/// Lifetime counters for one connection epoch.
#[derive(Default)]
pub struct SessionDiagnostics {
    pub blocks_captured: AtomicU64,
    pub chunks_sent: AtomicU64,
    pub chunks_played: AtomicU64,
    pub decode_errors: AtomicU64,
    pub turns_completed: AtomicU64,
    pub interruptions: AtomicU64,
}

/// Point-in-time copy of [`SessionDiagnostics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub blocks_captured: u64,
    pub chunks_sent: u64,
    pub chunks_played: u64,
    pub decode_errors: u64,
    pub turns_completed: u64,
    pub interruptions: u64,
}

impl SessionDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            blocks_captured: self.blocks_captured.load(Ordering::Relaxed),
            chunks_sent: self.chunks_sent.load(Ordering::Relaxed),
            chunks_played: self.chunks_played.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            turns_completed: self.turns_completed.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
        }
    }
}

// ── 3. session parts ────────────────────────────────────────────────────────

/// Building blocks of a connection epoch.
///
/// The default connect path assembles these from cpal devices and the
/// websocket transport. Embedders with their own audio stack, and the test
/// suite, construct them directly.
pub struct SessionParts {
    /// Read side of the capture ring. The capture callback owns the write
    /// side and is this crate's only microphone consumer; captured audio
    /// goes to the wire and nowhere else, so no local echo path exists.
    pub consumer: CaptureConsumer,
    /// Rate the capture side produces at.
    pub capture_rate: u32,
    /// Flag keeping capture and playback device threads alive. Teardown
    /// clears it.
    pub audio_running: Arc<AtomicBool>,
    /// Established transport, handshake already done.
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn AudioSink>,
    pub clock: Arc<dyn PlaybackClock>,
    /// Completion reports from the sink, drained by the scheduler.
    pub completions: crossbeam_channel::Receiver<HandleId>,
    /// Camera, if the interview has video. `None` runs audio-only.
    pub frame_source: Option<Box<dyn FrameSource>>,
}

// ── 4. the session ──────────────────────────────────────────────────────────

/// Handle to one interview conversation.
///
/// Cheap accessors are synchronous; anything touching devices or the
/// network is async. All methods take `&self`, so the session can be shared
/// behind an `Arc` with UI code.
pub struct LiveSession {
    config: SessionConfig,
    shared: Arc<SessionShared>,
    active: Mutex<Option<Arc<ActiveSession>>>,
    recorder: Mutex<Arc<TranscriptRecorder>>,
}

struct SessionShared {
    status: Mutex<SessionStatus>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    level_tx: broadcast::Sender<AudioLevelEvent>,
    speaking_tx: broadcast::Sender<SpeakingEvent>,
}

impl LiveSession {
    pub fn new(config: SessionConfig) -> Self {
        let (status_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (level_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (speaking_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            shared: Arc::new(SessionShared {
                status: Mutex::new(SessionStatus::Disconnected),
                status_tx,
                level_tx,
                speaking_tx,
            }),
            active: Mutex::new(None),
            recorder: Mutex::new(Arc::new(TranscriptRecorder::new())),
        }
    }

    /// Connection lifecycle events. One `disconnected` per completed epoch.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.shared.status_tx.subscribe()
    }

    /// Microphone level, one event per captured block.
    pub fn subscribe_levels(&self) -> broadcast::Receiver<AudioLevelEvent> {
        self.shared.level_tx.subscribe()
    }

    /// Edge-triggered interviewer speech indicator.
    pub fn subscribe_speaking(&self) -> broadcast::Receiver<SpeakingEvent> {
        self.shared.speaking_tx.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.shared.status.lock()
    }

    /// Whether interviewer audio is currently scheduled or playing.
    pub fn is_speaking(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.scheduler.is_speaking())
            .unwrap_or(false)
    }

    /// Completed transcript so far. Available in every state; empty before
    /// the first turn completes and frozen after disconnect.
    pub fn transcript(&self) -> Vec<TranscriptItem> {
        self.recorder.lock().snapshot()
    }

    /// Counters for the current or most recent epoch.
    pub fn diagnostics(&self) -> Option<DiagnosticsSnapshot> {
        self.active
            .lock()
            .as_ref()
            .map(|a| a.diagnostics.snapshot())
    }

    /// Open the session end to end: microphone, speaker, websocket, worker
    /// tasks. The microphone comes first; if it cannot be acquired nothing
    /// else is touched and the error is final (no retry).
    #[cfg(feature = "audio-cpal")]
    pub async fn connect(&self) -> Result<()> {
        self.config.validate()?;
        self.connect_with(|| self.assemble_default_parts()).await
    }

    /// Open the session from caller-supplied parts. This is the seam for
    /// custom audio stacks and for tests; the acquire step stands in for
    /// device and network acquisition and its error becomes the connect
    /// error.
    pub async fn connect_with<F, Fut>(&self, acquire: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SessionParts>>,
    {
        self.begin_connecting()?;
        match acquire().await {
            Ok(parts) => match self.install(parts) {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.fail_connect(&e);
                    Err(e)
                }
            },
            Err(e) => {
                self.fail_connect(&e);
                Err(e)
            }
        }
    }

    /// Submit one typed candidate turn. Typing is a barge-in: anything the
    /// interviewer is saying stops first. Silently does nothing when the
    /// session is not connected.
    pub async fn send_text(&self, text: &str) {
        if self.status() != SessionStatus::Connected {
            return;
        }
        let Some(active) = self.active.lock().clone() else {
            return;
        };
        active.scheduler.interrupt();
        if let Err(e) = active.transport.send(ClientMessage::user_turn(text)).await {
            warn!("typed turn send failed: {e}");
            active.teardown(Some(e.to_string())).await;
        }
    }

    /// Close the session. Idempotent; a session that never connected, or
    /// already tore down, does nothing and emits nothing.
    pub async fn disconnect(&self) {
        let active = self.active.lock().clone();
        if let Some(active) = active {
            active.teardown(None).await;
        }
    }

    fn begin_connecting(&self) -> Result<()> {
        {
            let mut status = self.shared.status.lock();
            if *status != SessionStatus::Disconnected {
                return Err(LiveError::AlreadyConnected);
            }
            *status = SessionStatus::Connecting;
        }
        self.shared.emit_status(SessionStatus::Connecting, None);
        Ok(())
    }

    fn fail_connect(&self, error: &LiveError) {
        warn!("connect failed: {error}");
        *self.shared.status.lock() = SessionStatus::Disconnected;
        self.shared
            .emit_status(SessionStatus::Disconnected, Some(error.to_string()));
    }

    /// Wire the parts together and start the worker tasks.
    fn install(&self, parts: SessionParts) -> Result<()> {
        let converter = RateConverter::new(parts.capture_rate, PIPELINE_RATE_HZ, RESAMPLER_CHUNK)?;

        let recorder = Arc::new(TranscriptRecorder::new());
        *self.recorder.lock() = Arc::clone(&recorder);

        let scheduler = Arc::new(PlaybackScheduler::new(
            parts.clock,
            parts.sink,
            parts.completions,
            self.shared.speaking_tx.clone(),
        ));
        let sampler = parts
            .frame_source
            .map(|source| VideoSampler::spawn(source, Arc::clone(&parts.transport)));

        let active = Arc::new(ActiveSession {
            transport: parts.transport,
            scheduler,
            recorder,
            audio_running: parts.audio_running,
            sampler,
            teardown_done: AtomicBool::new(false),
            diagnostics: SessionDiagnostics::default(),
            shared: Arc::clone(&self.shared),
        });

        // Flip to connected before the workers exist. A teardown can only be
        // reached through the `active` handle, so however fast the remote
        // closes, its `disconnected` status lands after this one.
        *self.shared.status.lock() = SessionStatus::Connected;
        self.shared.emit_status(SessionStatus::Connected, None);
        info!("session connected");

        *self.active.lock() = Some(Arc::clone(&active));
        tokio::spawn(run_pump(
            Arc::clone(&active),
            parts.consumer,
            converter,
        ));
        tokio::spawn(run_dispatch(active));

        Ok(())
    }
}

impl SessionShared {
    fn emit_status(&self, status: SessionStatus, detail: Option<String>) {
        let _ = self.status_tx.send(SessionStatusEvent { status, detail });
    }
}

// ── 5. connection epoch ─────────────────────────────────────────────────────

struct ActiveSession {
    transport: Arc<dyn Transport>,
    scheduler: Arc<PlaybackScheduler>,
    recorder: Arc<TranscriptRecorder>,
    audio_running: Arc<AtomicBool>,
    sampler: Option<VideoSampler>,
    teardown_done: AtomicBool,
    diagnostics: SessionDiagnostics,
    shared: Arc<SessionShared>,
}

impl ActiveSession {
    /// Tear the epoch down: stop the sampler, release the audio threads,
    /// hard-stop playback, close the transport, then flip the status and
    /// emit the single `disconnected` event. First caller wins.
    async fn teardown(&self, detail: Option<String>) {
        if self.teardown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(sampler) = &self.sampler {
            sampler.stop();
        }
        self.audio_running.store(false, Ordering::Release);
        self.scheduler.interrupt();
        self.transport.close().await;

        *self.shared.status.lock() = SessionStatus::Disconnected;
        self.shared.emit_status(SessionStatus::Disconnected, detail);

        let d = self.diagnostics.snapshot();
        info!(
            blocks_captured = d.blocks_captured,
            chunks_sent = d.chunks_sent,
            chunks_played = d.chunks_played,
            decode_errors = d.decode_errors,
            turns_completed = d.turns_completed,
            interruptions = d.interruptions,
            "session closed"
        );
    }

    /// Apply one server message, in the service's own field order:
    /// transcription fragments, turn boundary, audio, interruption.
    async fn handle_server_message(&self, message: ServerMessage) {
        let Some(content) = message.server_content else {
            return;
        };

        if let Some(t) = content.output_transcription {
            self.recorder.push_output_fragment(&t.text);
        }
        if let Some(t) = content.input_transcription {
            self.recorder.push_input_fragment(&t.text);
        }
        if content.turn_complete {
            self.recorder.complete_turn();
            self.diagnostics
                .turns_completed
                .fetch_add(1, Ordering::Relaxed);
        }

        if let Some(turn) = content.model_turn {
            if let Some(inline) = turn.parts.first().and_then(|p| p.inline_data.as_ref()) {
                // Decode rate is pinned by the playback path, whatever the
                // mime says. A bad chunk is dropped, never fatal.
                match decode_pcm16(&inline.data, PLAYBACK_RATE_HZ) {
                    Ok(chunk) => {
                        self.scheduler.enqueue(chunk);
                        self.diagnostics
                            .chunks_played
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!("audio chunk dropped: {e}");
                        self.diagnostics
                            .decode_errors
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }

        if content.interrupted {
            debug!("candidate barge-in, stopping playback");
            self.scheduler.interrupt();
            self.diagnostics
                .interruptions
                .fetch_add(1, Ordering::Relaxed);
        }

        self.scheduler.drain_completions();
    }
}

// ── 6. worker tasks ─────────────────────────────────────────────────────────

/// Drain the capture ring, convert to the pipeline rate, cut 4096-sample
/// blocks, publish a level per block and ship each block to the service.
async fn run_pump(
    active: Arc<ActiveSession>,
    mut consumer: CaptureConsumer,
    mut converter: RateConverter,
) {
    let mut ticker = tokio::time::interval(PUMP_INTERVAL);
    let mut scratch = vec![0f32; BLOCK_SAMPLES];
    let mut block: Vec<f32> = Vec::with_capacity(BLOCK_SAMPLES * 2);
    let mut seq: u64 = 0;

    'pump: while active.audio_running.load(Ordering::Relaxed) {
        ticker.tick().await;

        loop {
            let n = consumer.pop_slice(&mut scratch);
            if n == 0 {
                break;
            }
            block.extend_from_slice(&converter.process(&scratch[..n]));
        }

        while block.len() >= BLOCK_SAMPLES {
            let chunk: Vec<f32> = block.drain(..BLOCK_SAMPLES).collect();

            let level = block_rms(&chunk) * VOLUME_GAIN;
            let _ = active
                .shared
                .level_tx
                .send(AudioLevelEvent { seq, level });
            seq += 1;
            active
                .diagnostics
                .blocks_captured
                .fetch_add(1, Ordering::Relaxed);

            let encoded = encode_pcm16(&chunk, PIPELINE_RATE_HZ);
            if let Err(e) = active
                .transport
                .send(ClientMessage::media(encoded.into()))
                .await
            {
                warn!("audio chunk send failed: {e}");
                active.teardown(Some(e.to_string())).await;
                break 'pump;
            }
            active
                .diagnostics
                .chunks_sent
                .fetch_add(1, Ordering::Relaxed);
        }
    }
    debug!("capture pump stopped");
}

/// Receive server messages and route them; tick the scheduler so sink
/// completions are noticed even while the server is quiet.
async fn run_dispatch(active: Arc<ActiveSession>) {
    let mut ticker = tokio::time::interval(DISPATCH_TICK);
    loop {
        tokio::select! {
            incoming = active.transport.next_message() => match incoming {
                None => {
                    active
                        .teardown(Some("connection closed by remote".to_string()))
                        .await;
                    break;
                }
                Some(Err(e)) => {
                    warn!("transport fault: {e}");
                    active.teardown(Some(e.to_string())).await;
                    break;
                }
                Some(Ok(message)) => {
                    active.handle_server_message(message).await;
                    if active.teardown_done.load(Ordering::Relaxed) {
                        break;
                    }
                }
            },
            _ = ticker.tick() => active.scheduler.drain_completions(),
        }
    }
    debug!("dispatch stopped");
}

// ── 7. default parts (cpal + websocket) ─────────────────────────────────────

#[cfg(feature = "audio-cpal")]
impl LiveSession {
    async fn assemble_default_parts(&self) -> Result<SessionParts> {
        use crate::buffering::create_capture_ring;
        use persona::system_instruction;
        use wire::Setup;

        let audio_running = Arc::new(AtomicBool::new(true));

        // Microphone before anything else.
        let (producer, consumer) = create_capture_ring();
        let capture_rate = open_capture(producer, Arc::clone(&audio_running)).await?;

        let (completion_tx, completions) = crossbeam_channel::unbounded();
        let (sink, clock) = match open_playback(completion_tx, Arc::clone(&audio_running)).await {
            Ok(parts) => parts,
            Err(e) => {
                audio_running.store(false, Ordering::Release);
                return Err(e);
            }
        };

        let setup = Setup::new(
            &self.config.model,
            self.config.voice.as_str(),
            &system_instruction(self.config.applicant.as_ref()),
        );
        let transport = match crate::transport::ws::WsTransport::connect(
            &self.config.endpoint,
            &self.config.api_key,
            setup,
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                audio_running.store(false, Ordering::Release);
                return Err(e);
            }
        };

        Ok(SessionParts {
            consumer,
            capture_rate,
            audio_running,
            transport: Arc::new(transport),
            sink,
            clock,
            completions,
            frame_source: None,
        })
    }
}

/// Open the default microphone on a blocking thread and park there until
/// the running flag clears. `cpal::Stream` is not `Send`, so the stream
/// never leaves that thread; only the confirmed rate comes back.
#[cfg(feature = "audio-cpal")]
async fn open_capture(
    producer: crate::buffering::CaptureProducer,
    running: Arc<AtomicBool>,
) -> Result<u32> {
    use crate::audio::MicCapture;

    let (confirm_tx, confirm_rx) = std::sync::mpsc::channel();
    let flag = Arc::clone(&running);
    tokio::task::spawn_blocking(move || {
        let capture = match MicCapture::open_default(producer, Arc::clone(&flag)) {
            Ok(capture) => capture,
            Err(e) => {
                let _ = confirm_tx.send(Err(e));
                return;
            }
        };
        let _ = confirm_tx.send(Ok(capture.sample_rate));
        while flag.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }
        capture.stop();
    });

    tokio::task::spawn_blocking(move || confirm_rx.recv())
        .await
        .map_err(|e| LiveError::AudioStream(format!("capture open task failed: {e}")))?
        .map_err(|_| LiveError::AudioStream("capture thread exited before confirming".to_string()))?
}

/// Same parking arrangement for the speaker side.
#[cfg(feature = "audio-cpal")]
async fn open_playback(
    completion_tx: crossbeam_channel::Sender<HandleId>,
    running: Arc<AtomicBool>,
) -> Result<(Arc<dyn AudioSink>, Arc<dyn PlaybackClock>)> {
    use crate::audio::sink::CpalSink;

    let (confirm_tx, confirm_rx) = std::sync::mpsc::channel();
    let flag = Arc::clone(&running);
    tokio::task::spawn_blocking(move || {
        let sink = match CpalSink::open_default(completion_tx) {
            Ok(sink) => sink,
            Err(e) => {
                let _ = confirm_tx.send(Err(e));
                return;
            }
        };
        let _ = confirm_tx.send(Ok((sink.handle(), sink.clock())));
        while flag.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }
    });

    let (handle, clock) = tokio::task::spawn_blocking(move || confirm_rx.recv())
        .await
        .map_err(|e| LiveError::AudioStream(format!("playback open task failed: {e}")))?
        .map_err(|_| {
            LiveError::AudioStream("playback thread exited before confirming".to_string())
        })??;
    Ok((Arc::new(handle), Arc::new(clock)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_the_live_service() {
        let config = SessionConfig::default();
        assert!(config.endpoint.starts_with("wss://"));
        assert_eq!(config.model, LIVE_MODEL);
        assert_eq!(config.voice, VoiceId::Aoede);
        assert!(config.applicant.is_none());
    }

    #[test]
    fn validation_rejects_blank_fields() {
        let mut config = SessionConfig {
            api_key: "k".to_string(),
            ..SessionConfig::default()
        };
        assert!(config.validate().is_ok());

        config.api_key = "  ".to_string();
        assert!(matches!(config.validate(), Err(LiveError::Config(_))));

        config.api_key = "k".to_string();
        config.model.clear();
        assert!(matches!(config.validate(), Err(LiveError::Config(_))));
    }

    #[test]
    fn fresh_session_is_disconnected_and_silent() {
        let session = LiveSession::new(SessionConfig::default());
        assert_eq!(session.status(), SessionStatus::Disconnected);
        assert!(!session.is_speaking());
        assert!(session.transcript().is_empty());
        assert!(session.diagnostics().is_none());
    }

    #[test]
    fn diagnostics_snapshot_copies_counters() {
        let diagnostics = SessionDiagnostics::default();
        diagnostics.blocks_captured.store(3, Ordering::Relaxed);
        diagnostics.decode_errors.store(1, Ordering::Relaxed);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.blocks_captured, 3);
        assert_eq!(snap.decode_errors, 1);
        assert_eq!(snap.chunks_sent, 0);
    }
}
