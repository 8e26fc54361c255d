//! Audio playback sink abstraction.
//!
//! The scheduler only needs a clock, a decoder and a way to start a buffer at
//! an absolute time on that clock. Platform output ([`super::CpalBackend`]) and
//! the deterministic test sink both implement [`AudioBackend`].

use std::sync::Arc;

use crate::error::AudioError;

use super::decode::decode_wav;

/// Immutable decoded mono PCM, cheap to clone
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample data, for handing to an audio thread
    pub(crate) fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> usize {
        self.samples.len()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Trait implemented by audio playback sinks.
///
/// All times are seconds on the backend's own monotonic audio clock.
pub trait AudioBackend: Send + Sync {
    /// Output sample rate in Hz; decoded buffers are converted to it
    fn sample_rate(&self) -> u32;

    /// Current audio-clock time in seconds
    fn current_time(&self) -> f64;

    /// Decode raw audio bytes into a buffer playable by this backend
    fn decode(&self, bytes: &[u8]) -> Result<SampleBuffer, AudioError> {
        decode_wav(bytes, self.sample_rate())
    }

    /// Start `buffer` at `at_secs` on the audio clock
    ///
    /// Times already in the past start as soon as possible.
    fn schedule_playback(&self, buffer: &SampleBuffer, at_secs: f64) -> Result<(), AudioError>;

    /// Release the output device. Idempotent.
    fn close(&self) -> Result<(), AudioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_buffer_duration() {
        let buffer = SampleBuffer::new(vec![0.0; 24_000], 48_000);
        assert_eq!(buffer.frames(), 24_000);
        assert!((buffer.duration_secs() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sample_buffer_clone_shares_samples() {
        let buffer = SampleBuffer::new(vec![0.25; 16], 44_100);
        let clone = buffer.clone();
        assert_eq!(buffer, clone);
        assert!(std::ptr::eq(buffer.samples(), clone.samples()));
    }

    #[test]
    fn test_zero_rate_duration() {
        let buffer = SampleBuffer::new(vec![1.0; 4], 0);
        assert_eq!(buffer.duration_secs(), 0.0);
    }
}
