//! Sample-rate conversion between the device rate and the wire rate.
//!
//! cpal captures at whatever the device runs natively (commonly 48 kHz); the
//! realtime endpoint only accepts 16 kHz mono. `RateConverter` bridges the
//! two on the capture pump task, where allocation is allowed.
//!
//! When the two rates already match, no rubato session is created and
//! `process` is a plain copy.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::warn;

use crate::error::{LiveError, Result};

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when device rate == wire rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input blocks between calls.
    input_buf: Vec<f32>,
    /// Input frames rubato expects per process call.
    chunk_size: usize,
    /// Pre-allocated rubato output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// Create a converter from `device_rate` to `wire_rate` processing
    /// `chunk_size` input frames per rubato call.
    ///
    /// # Errors
    /// Returns `LiveError::AudioDevice` if rubato rejects the ratio.
    pub fn new(device_rate: u32, wire_rate: u32, chunk_size: usize) -> Result<Self> {
        if device_rate == wire_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
            });
        }

        let ratio = wire_rate as f64 / device_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| LiveError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        let output_buf = vec![vec![0f32; max_out]; 1];

        tracing::info!(device_rate, wire_rate, chunk_size, "capture resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            chunk_size,
            output_buf,
        })
    }

    /// Feed device-rate samples, returning whatever full blocks convert to
    /// the wire rate (possibly nothing). The remainder is carried over to the
    /// next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(ref mut resampler) = self.resampler else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);

        let mut out = Vec::new();
        let mut consumed = 0;
        while self.input_buf.len() - consumed >= self.chunk_size {
            let block = &self.input_buf[consumed..consumed + self.chunk_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_used, produced)) => {
                    out.extend_from_slice(&self.output_buf[0][..produced]);
                }
                Err(e) => {
                    warn!("resampler error, block skipped: {e}");
                }
            }
            consumed += self.chunk_size;
        }
        self.input_buf.drain(..consumed);

        out
    }

    /// Returns `true` when no rate conversion occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_is_an_identity_copy() {
        let mut rc = RateConverter::new(16_000, 16_000, 1024).unwrap();
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..700).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
    }

    #[test]
    fn downsamples_48k_to_16k_at_one_third_length() {
        let mut rc = RateConverter::new(48_000, 16_000, 1024).unwrap();
        assert!(!rc.is_passthrough());
        let out = rc.process(&vec![0.1f32; 3072]);
        // 3072 input frames at 48 kHz ≈ 1024 at 16 kHz
        assert!(
            (out.len() as isize - 1024).unsigned_abs() <= 16,
            "output len={} expected≈1024",
            out.len()
        );
    }

    #[test]
    fn non_integer_ratio_produces_output() {
        let mut rc = RateConverter::new(44_100, 16_000, 1024).unwrap();
        let out = rc.process(&vec![0.0f32; 4096]);
        assert!(!out.is_empty());
    }

    #[test]
    fn partial_block_is_held_back_until_complete() {
        let mut rc = RateConverter::new(48_000, 16_000, 1024).unwrap();
        assert!(rc.process(&vec![0.0f32; 600]).is_empty());
        assert!(!rc.process(&vec![0.0f32; 600]).is_empty());
    }
}
