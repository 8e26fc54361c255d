// Error types for the metronome core
//
// This module defines the error taxonomy shared by the scheduler, the tick
// source and the audio backends, with numeric codes for callers that cross a
// process or language boundary.

mod audio;
mod meter;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use meter::{MeterError, MeterErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
