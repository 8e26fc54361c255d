//! Test harness utilities.
//!
//! A deterministic [`AudioBackend`](crate::audio::AudioBackend) whose clock is
//! set by hand, so scheduling behavior can be exercised without an output
//! device or wall-clock timing. Used by unit tests, integration tests and the
//! CLI's `--dry-run` mode.

pub mod manual_backend;

pub use manual_backend::{silent_wav, ManualClockBackend, ScheduledPlayback};
