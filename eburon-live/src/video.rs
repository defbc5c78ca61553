//! Camera frame sampling for the visual side channel.
//!
//! One frame per second is plenty for presence and attire, and keeps the
//! uplink dominated by audio. Each sampled frame is downscaled to half
//! resolution, JPEG-compressed and shipped as a media chunk. A source that
//! is not ready yet simply skips the tick; dropped ticks are the design,
//! not a failure, so nothing is retried or logged for them.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{LiveError, Result};
use crate::session::wire::{ClientMessage, MediaChunk};
use crate::transport::Transport;

/// One frame per second.
pub const FRAME_INTERVAL: Duration = Duration::from_secs(1);

const JPEG_QUALITY: u8 = 60;
const FRAME_MIME_TYPE: &str = "image/jpeg";

/// One captured camera frame, tightly packed RGB8 rows.
#[derive(Debug, Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Supplier of camera frames, implemented by the embedding application.
///
/// `grab` runs on the sampling task once per second; keep it cheap. Return
/// `None` while the camera is warming up or has no new frame, and the tick
/// is skipped without comment.
pub trait FrameSource: Send {
    fn grab(&mut self) -> Option<RgbFrame>;
}

/// Downscale to half resolution and compress. The output rides the same
/// media-chunk envelope as audio.
pub(crate) fn encode_frame(frame: RgbFrame) -> Result<MediaChunk> {
    let RgbFrame {
        width,
        height,
        data,
    } = frame;
    let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
        LiveError::Video(format!("frame buffer does not match {width}x{height} rgb8"))
    })?;

    let half = image::imageops::resize(
        &image,
        (width / 2).max(1),
        (height / 2).max(1),
        FilterType::Triangle,
    );

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&half)
        .map_err(|e| LiveError::Video(format!("jpeg encode failed: {e}")))?;

    Ok(MediaChunk {
        mime_type: FRAME_MIME_TYPE.to_string(),
        data: BASE64.encode(&jpeg),
    })
}

/// Background task sampling a [`FrameSource`] at [`FRAME_INTERVAL`].
pub struct VideoSampler {
    task: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl VideoSampler {
    /// Start sampling. The first frame goes out one interval after start,
    /// matching the camera warm-up window.
    pub fn spawn(mut source: Box<dyn FrameSource>, transport: Arc<dyn Transport>) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + FRAME_INTERVAL, FRAME_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::Relaxed) {
                    break;
                }
                let Some(frame) = source.grab() else {
                    continue;
                };
                match encode_frame(frame) {
                    Ok(chunk) => {
                        if let Err(e) = transport.send(ClientMessage::media(chunk)).await {
                            warn!("video frame send failed: {e}");
                            break;
                        }
                    }
                    Err(e) => warn!("video frame dropped: {e}"),
                }
            }
            debug!("video sampler stopped");
        });
        Self { task, running }
    }

    /// Stop sampling. No frame is sent after this returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::wire::ServerMessage;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    fn gradient_frame(width: u32, height: u32) -> RgbFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 4) as u8);
                data.push((y * 4) as u8);
                data.push(128);
            }
        }
        RgbFrame {
            width,
            height,
            data,
        }
    }

    #[test]
    fn frames_become_half_size_jpeg_chunks() {
        let chunk = encode_frame(gradient_frame(64, 48)).expect("encode");
        assert_eq!(chunk.mime_type, "image/jpeg");

        let jpeg = BASE64.decode(&chunk.data).expect("valid base64");
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]); // JPEG SOI marker
        let decoded = image::load_from_memory(&jpeg).expect("decodable jpeg");
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 24);
    }

    #[test]
    fn tiny_frames_never_scale_to_zero() {
        let chunk = encode_frame(gradient_frame(1, 1)).expect("encode");
        let jpeg = BASE64.decode(&chunk.data).expect("valid base64");
        let decoded = image::load_from_memory(&jpeg).expect("decodable jpeg");
        assert_eq!((decoded.width(), decoded.height()), (1, 1));
    }

    #[test]
    fn mismatched_buffer_is_rejected() {
        let bad = RgbFrame {
            width: 10,
            height: 10,
            data: vec![0; 7],
        };
        assert!(matches!(encode_frame(bad), Err(LiveError::Video(_))));
    }

    /// Transport fake that records sends and never produces messages.
    struct RecordingTransport {
        sent: Mutex<Vec<ClientMessage>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, message: ClientMessage) -> crate::error::Result<()> {
            self.sent.lock().push(message);
            Ok(())
        }

        async fn next_message(&self) -> Option<crate::error::Result<ServerMessage>> {
            std::future::pending().await
        }

        async fn close(&self) {}
    }

    /// Source scripted to alternate between ready and not-ready ticks.
    struct AlternatingSource {
        tick: u32,
    }

    impl FrameSource for AlternatingSource {
        fn grab(&mut self) -> Option<RgbFrame> {
            self.tick += 1;
            if self.tick % 2 == 0 {
                None
            } else {
                Some(gradient_frame(8, 8))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn sampler_sends_at_one_hertz_and_skips_unready_ticks() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let sampler = VideoSampler::spawn(
            Box::new(AlternatingSource { tick: 0 }),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        // Four ticks: ready, skipped, ready, skipped.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(transport.sent.lock().len(), 2);

        sampler.stop();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.sent.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_frame_goes_out_before_the_first_interval() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
        });
        let sampler = VideoSampler::spawn(
            Box::new(AlternatingSource { tick: 0 }),
            Arc::clone(&transport) as Arc<dyn Transport>,
        );

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(transport.sent.lock().is_empty());
        sampler.stop();
    }
}
