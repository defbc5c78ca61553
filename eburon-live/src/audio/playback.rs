//! Gapless playback scheduling for inbound model speech.
//!
//! ## Per chunk
//!
//! ```text
//! 1. If the start cursor fell behind the clock (playback starved),
//!    snap the cursor to now instead of scheduling in the past
//! 2. Hand the chunk to the sink, to start exactly at the cursor
//! 3. Advance the cursor by the chunk's duration
//! 4. Track the handle until the sink reports completion
//! ```
//!
//! Back-to-back chunks are seamless while delivery keeps up; after a gap the
//! cursor resynchronizes to the clock rather than bursting a backlog. The
//! "speaking" indicator follows occupancy of the tracked handle set, emitted
//! edge-triggered on the broadcast channel.

use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

use crate::buffering::chunk::AudioChunk;
use crate::events::SpeakingEvent;

/// Identifier of one scheduled chunk, unique within a session.
pub type HandleId = u64;

/// Monotonic time source for the playback time domain, in seconds.
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock backed by `std::time::Instant`, origin at construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Output half of the playback path.
///
/// `schedule` must not block: the real sink queues the chunk for its output
/// callback, fakes record it. Completions travel back over the crossbeam
/// channel handed to [`PlaybackScheduler::new`], carrying the handle id once
/// the chunk's last sample has been rendered (or never, if halted first).
pub trait AudioSink: Send + Sync {
    /// Begin playback of `chunk` at `start_at` seconds on the shared clock.
    fn schedule(&self, handle: HandleId, chunk: AudioChunk, start_at: f64);

    /// Hard-stop: drop everything scheduled, without completion reports.
    fn halt(&self);
}

struct SchedulerState {
    /// Cursor in the playback clock's time domain.
    next_start: f64,
    /// Handles scheduled on the sink and not yet completed.
    active: HashSet<HandleId>,
    /// Last emitted value of the speaking indicator.
    speaking: bool,
}

/// Orders decoded chunks into a seamless stream on an [`AudioSink`].
pub struct PlaybackScheduler {
    clock: Arc<dyn PlaybackClock>,
    sink: Arc<dyn AudioSink>,
    completions: Receiver<HandleId>,
    state: Mutex<SchedulerState>,
    next_handle: AtomicU64,
    speaking_tx: broadcast::Sender<SpeakingEvent>,
}

impl PlaybackScheduler {
    pub fn new(
        clock: Arc<dyn PlaybackClock>,
        sink: Arc<dyn AudioSink>,
        completions: Receiver<HandleId>,
        speaking_tx: broadcast::Sender<SpeakingEvent>,
    ) -> Self {
        Self {
            clock,
            sink,
            completions,
            state: Mutex::new(SchedulerState {
                next_start: 0.0,
                active: HashSet::new(),
                speaking: false,
            }),
            next_handle: AtomicU64::new(0),
            speaking_tx,
        }
    }

    /// Schedule one decoded chunk. Returns the handle, or `None` for an
    /// empty chunk (nothing to play, nothing tracked).
    pub fn enqueue(&self, chunk: AudioChunk) -> Option<HandleId> {
        if chunk.is_empty() {
            return None;
        }

        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let duration = chunk.duration_secs();
        let (start_at, became_speaking) = {
            let mut st = self.state.lock();
            let now = self.clock.now();
            if st.next_start < now {
                st.next_start = now;
            }
            let start_at = st.next_start;
            st.next_start += duration;
            st.active.insert(id);
            let became_speaking = !st.speaking;
            st.speaking = true;
            (start_at, became_speaking)
        };

        debug!(handle = id, start_at, duration, "chunk scheduled");
        self.sink.schedule(id, chunk, start_at);
        if became_speaking {
            let _ = self.speaking_tx.send(SpeakingEvent { speaking: true });
        }
        Some(id)
    }

    /// Apply completion reports from the sink, dropping the speaking
    /// indicator once the last outstanding handle has finished.
    pub fn drain_completions(&self) {
        let went_quiet = {
            let mut st = self.state.lock();
            while let Ok(id) = self.completions.try_recv() {
                st.active.remove(&id);
            }
            if st.active.is_empty() && st.speaking {
                st.speaking = false;
                true
            } else {
                false
            }
        };
        if went_quiet {
            let _ = self.speaking_tx.send(SpeakingEvent { speaking: false });
        }
    }

    /// Hard-stop (barge-in): halt the sink, forget every scheduled handle,
    /// force the speaking indicator off and snap the cursor to now.
    pub fn interrupt(&self) {
        self.sink.halt();
        let was_speaking = {
            let mut st = self.state.lock();
            st.active.clear();
            st.next_start = self.clock.now();
            while self.completions.try_recv().is_ok() {}
            let was = st.speaking;
            st.speaking = false;
            was
        };
        if was_speaking {
            let _ = self.speaking_tx.send(SpeakingEvent { speaking: false });
        }
    }

    /// Current value of the speaking indicator.
    pub fn is_speaking(&self) -> bool {
        self.state.lock().speaking
    }

    /// Number of scheduled-but-unfinished handles.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PLAYBACK_RATE_HZ;
    use approx::assert_abs_diff_eq;
    use crossbeam_channel::{unbounded, Sender};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Clock the test advances by hand.
    struct ManualClock {
        t: Mutex<f64>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self { t: Mutex::new(0.0) }
        }

        fn set(&self, v: f64) {
            *self.t.lock() = v;
        }
    }

    impl PlaybackClock for ManualClock {
        fn now(&self) -> f64 {
            *self.t.lock()
        }
    }

    /// Sink that records schedules and lets the test report completions.
    struct RecordingSink {
        scheduled: Mutex<Vec<(HandleId, usize, f64)>>,
        halts: AtomicUsize,
        completion_tx: Sender<HandleId>,
    }

    impl RecordingSink {
        fn new(completion_tx: Sender<HandleId>) -> Self {
            Self {
                scheduled: Mutex::new(Vec::new()),
                halts: AtomicUsize::new(0),
                completion_tx,
            }
        }

        fn finish(&self, handle: HandleId) {
            self.completion_tx.send(handle).expect("completion channel");
        }

        fn starts(&self) -> Vec<f64> {
            self.scheduled.lock().iter().map(|(_, _, s)| *s).collect()
        }
    }

    impl AudioSink for RecordingSink {
        fn schedule(&self, handle: HandleId, chunk: AudioChunk, start_at: f64) {
            self.scheduled
                .lock()
                .push((handle, chunk.samples.len(), start_at));
        }

        fn halt(&self) {
            self.halts.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn chunk_of(duration_secs: f64) -> AudioChunk {
        let n = (duration_secs * PLAYBACK_RATE_HZ as f64).round() as usize;
        AudioChunk::new(vec![0.1; n], PLAYBACK_RATE_HZ)
    }

    fn harness() -> (
        Arc<ManualClock>,
        Arc<RecordingSink>,
        PlaybackScheduler,
        broadcast::Receiver<SpeakingEvent>,
    ) {
        let clock = Arc::new(ManualClock::new());
        let (tx, rx) = unbounded();
        let sink = Arc::new(RecordingSink::new(tx));
        let (speaking_tx, speaking_rx) = broadcast::channel(16);
        let scheduler = PlaybackScheduler::new(
            Arc::clone(&clock) as Arc<dyn PlaybackClock>,
            Arc::clone(&sink) as Arc<dyn AudioSink>,
            rx,
            speaking_tx,
        );
        (clock, sink, scheduler, speaking_rx)
    }

    fn expect_edge(rx: &mut broadcast::Receiver<SpeakingEvent>, speaking: bool) {
        let ev = rx.try_recv().expect("expected a speaking edge");
        assert_eq!(ev.speaking, speaking);
    }

    fn expect_no_edge(rx: &mut broadcast::Receiver<SpeakingEvent>) {
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn back_to_back_chunks_schedule_seamlessly() {
        let (_clock, sink, scheduler, _rx) = harness();

        scheduler.enqueue(chunk_of(0.25)).expect("first chunk");
        scheduler.enqueue(chunk_of(0.5)).expect("second chunk");

        let starts = sink.starts();
        assert_abs_diff_eq!(starts[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[1], 0.25, epsilon = 1e-9);
    }

    #[test]
    fn start_times_never_decrease_and_never_precede_the_clock() {
        let (clock, sink, scheduler, _rx) = harness();

        scheduler.enqueue(chunk_of(0.5));
        clock.set(0.2); // delivery keeping up: cursor (0.5) is ahead of now
        scheduler.enqueue(chunk_of(0.5));
        clock.set(2.0); // starved: cursor (1.0) fell behind
        scheduler.enqueue(chunk_of(0.5));

        let starts = sink.starts();
        assert!(starts.windows(2).all(|w| w[1] >= w[0]));
        assert_abs_diff_eq!(starts[1], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[2], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn starvation_resets_the_cursor_instead_of_bursting() {
        let (clock, sink, scheduler, _rx) = harness();

        scheduler.enqueue(chunk_of(0.1));
        clock.set(5.0);
        scheduler.enqueue(chunk_of(0.1));
        // Immediately after the gap the next chunk is again back-to-back.
        scheduler.enqueue(chunk_of(0.1));

        let starts = sink.starts();
        assert_abs_diff_eq!(starts[1], 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(starts[2], 5.1, epsilon = 1e-9);
    }

    #[test]
    fn speaking_follows_handle_set_occupancy() {
        let (_clock, sink, scheduler, mut rx) = harness();

        let a = scheduler.enqueue(chunk_of(0.2)).expect("chunk a");
        let b = scheduler.enqueue(chunk_of(0.2)).expect("chunk b");
        expect_edge(&mut rx, true);
        expect_no_edge(&mut rx); // second chunk does not re-announce

        sink.finish(a);
        scheduler.drain_completions();
        assert!(scheduler.is_speaking());
        expect_no_edge(&mut rx); // one handle still outstanding

        sink.finish(b);
        scheduler.drain_completions();
        assert!(!scheduler.is_speaking());
        expect_edge(&mut rx, false);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn interrupt_hard_stops_everything_scheduled() {
        let (clock, sink, scheduler, mut rx) = harness();

        scheduler.enqueue(chunk_of(1.0));
        scheduler.enqueue(chunk_of(1.0));
        expect_edge(&mut rx, true);

        clock.set(0.3);
        scheduler.interrupt();

        assert_eq!(sink.halts.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.active_count(), 0);
        assert!(!scheduler.is_speaking());
        expect_edge(&mut rx, false);

        // Cursor snapped to now: the next chunk starts immediately.
        scheduler.enqueue(chunk_of(0.5));
        assert_abs_diff_eq!(*sink.starts().last().expect("a start"), 0.3, epsilon = 1e-9);
    }

    #[test]
    fn interrupt_while_idle_emits_nothing() {
        let (_clock, sink, scheduler, mut rx) = harness();

        scheduler.interrupt();

        assert_eq!(sink.halts.load(Ordering::SeqCst), 1);
        expect_no_edge(&mut rx);
    }

    #[test]
    fn system_clock_never_runs_backwards() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }

    #[test]
    fn empty_chunk_is_not_scheduled() {
        let (_clock, sink, scheduler, mut rx) = harness();

        assert!(scheduler
            .enqueue(AudioChunk::new(Vec::new(), PLAYBACK_RATE_HZ))
            .is_none());
        assert!(sink.starts().is_empty());
        expect_no_edge(&mut rx);
    }

    #[test]
    fn stale_completions_after_interrupt_are_ignored() {
        let (_clock, sink, scheduler, mut rx) = harness();

        let a = scheduler.enqueue(chunk_of(0.2)).expect("chunk a");
        expect_edge(&mut rx, true);
        scheduler.interrupt();
        expect_edge(&mut rx, false);

        // A completion racing the halt must not resurrect any state.
        sink.finish(a);
        scheduler.drain_completions();
        assert_eq!(scheduler.active_count(), 0);
        assert!(!scheduler.is_speaking());
        expect_no_edge(&mut rx);
    }
}
