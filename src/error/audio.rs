// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported by [`AudioError`].
///
/// Error code range: 1001-1011
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Audio bytes could not be decoded into a playable buffer
    pub const DECODE_FAILED: i32 = 1001;

    /// Playback requested before the normal beat sound was loaded
    pub const NOT_LOADED: i32 = 1002;

    /// BPM value is invalid (must be finite, > 0 and within the supported range)
    pub const BPM_INVALID: i32 = 1003;

    /// Beats per bar must be at least 1
    pub const BEATS_PER_BAR_INVALID: i32 = 1004;

    /// Failed to open audio stream
    pub const STREAM_OPEN_FAILED: i32 = 1005;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1006;

    /// The real-time playback queue is full
    pub const PLAYBACK_QUEUE_FULL: i32 = 1007;

    /// Operation attempted after the component was destroyed
    pub const DESTROYED: i32 = 1008;

    /// Tick worker thread could not be spawned or has exited
    pub const TICK_SOURCE_FAILED: i32 = 1009;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1010;

    /// Samples could not be written out as WAV
    pub const ENCODE_FAILED: i32 = 1011;
}

/// Log an audio error with structured context
///
/// Logs the numeric code, the component context and the human-readable
/// message. Never panics.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// These errors cover sound loading, scheduler lifecycle, tick delivery and
/// output device access.
///
/// Error code ranges: 1001-1011
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Bytes are not valid (or not supported) audio
    Decode { reason: String },

    /// `start()` called before the normal beat sound was loaded
    NotLoaded,

    /// BPM value is invalid
    BpmInvalid { bpm: f64 },

    /// Beats per bar is zero
    BeatsPerBarInvalid { beats: u32 },

    /// Failed to open audio stream
    StreamOpenFailed { reason: String },

    /// Hardware error occurred
    HardwareError { details: String },

    /// The voice queue towards the audio callback is full
    PlaybackQueueFull,

    /// The scheduler or tick source has been destroyed
    Destroyed,

    /// Tick worker thread failure
    TickSourceFailed { reason: String },

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// WAV encoding of synthesized samples failed
    Encode { reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::Decode { .. } => AudioErrorCodes::DECODE_FAILED,
            AudioError::NotLoaded => AudioErrorCodes::NOT_LOADED,
            AudioError::BpmInvalid { .. } => AudioErrorCodes::BPM_INVALID,
            AudioError::BeatsPerBarInvalid { .. } => AudioErrorCodes::BEATS_PER_BAR_INVALID,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::PlaybackQueueFull => AudioErrorCodes::PLAYBACK_QUEUE_FULL,
            AudioError::Destroyed => AudioErrorCodes::DESTROYED,
            AudioError::TickSourceFailed { .. } => AudioErrorCodes::TICK_SOURCE_FAILED,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::Encode { .. } => AudioErrorCodes::ENCODE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::Decode { reason } => {
                format!("Failed to decode audio: {}", reason)
            }
            AudioError::NotLoaded => {
                "Normal beat sound not loaded. Call load_normal_sound() first.".to_string()
            }
            AudioError::BpmInvalid { bpm } => {
                format!("BPM must be a finite value in (0, 2000] (got {})", bpm)
            }
            AudioError::BeatsPerBarInvalid { beats } => {
                format!("Beats per bar must be at least 1 (got {})", beats)
            }
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open audio stream: {}", reason)
            }
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::PlaybackQueueFull => {
                "Playback queue full, beat dropped".to_string()
            }
            AudioError::Destroyed => {
                "Metronome already destroyed. Create a new instance.".to_string()
            }
            AudioError::TickSourceFailed { reason } => {
                format!("Tick source failed: {}", reason)
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::Encode { reason } => {
                format!("Failed to encode WAV: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        AudioError::Decode {
            reason: err.to_string(),
        }
    }
}
