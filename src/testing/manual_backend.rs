//! Manually driven audio clock that records playback commands.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::audio::backend::{AudioBackend, SampleBuffer};
use crate::audio::click::encode_wav;
use crate::error::AudioError;

/// One recorded `schedule_playback` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPlayback {
    pub at: f64,
    pub frames: usize,
}

/// Backend whose time only moves when the test says so
#[derive(Debug)]
pub struct ManualClockBackend {
    sample_rate: u32,
    now_bits: AtomicU64,
    playbacks: Mutex<Vec<ScheduledPlayback>>,
    close_calls: AtomicUsize,
    reject_playback: AtomicBool,
}

impl ManualClockBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            now_bits: AtomicU64::new(0.0_f64.to_bits()),
            playbacks: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
            reject_playback: AtomicBool::new(false),
        }
    }

    pub fn set_time(&self, secs: f64) {
        self.now_bits.store(secs.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set_time(self.current_time() + secs);
    }

    /// Every playback accepted so far, in call order
    pub fn playbacks(&self) -> Vec<ScheduledPlayback> {
        self.playbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear_playbacks(&self) {
        self.playbacks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Make `schedule_playback` fail with `PlaybackQueueFull`
    pub fn set_reject_playback(&self, reject: bool) {
        self.reject_playback.store(reject, Ordering::SeqCst);
    }
}

impl Default for ManualClockBackend {
    fn default() -> Self {
        Self::new(48_000)
    }
}

impl AudioBackend for ManualClockBackend {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::SeqCst))
    }

    fn schedule_playback(&self, buffer: &SampleBuffer, at_secs: f64) -> Result<(), AudioError> {
        if self.reject_playback.load(Ordering::SeqCst) {
            return Err(AudioError::PlaybackQueueFull);
        }
        self.playbacks
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "ManualClockBackend::playbacks".to_string(),
            })?
            .push(ScheduledPlayback {
                at: at_secs,
                frames: buffer.frames(),
            });
        Ok(())
    }

    fn close(&self) -> Result<(), AudioError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// WAV bytes holding `frames` frames of a constant low-level signal
///
/// Distinct frame counts make normal and accent buffers easy to tell apart
/// in [`ManualClockBackend::playbacks`].
pub fn silent_wav(frames: usize, sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    encode_wav(&vec![0.01; frames], sample_rate)
}
