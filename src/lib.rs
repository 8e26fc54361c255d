// Metronome Core - look-ahead beat scheduling and tap tempo
// Sample-accurate playback driven by a jittery tick thread

// Module declarations
pub mod analysis;
pub mod audio;
pub mod config;
pub mod error;
pub mod meter;
pub mod testing;
pub mod timing;

// Re-exports for convenience
pub use analysis::{TapSnapshot, TapTempoEstimator};
pub use audio::{AudioBackend, BeatScheduler, CpalBackend, PlaybackClock, SampleBuffer};
pub use config::{AppConfig, DriftReference, SchedulerConfig};
pub use error::{AudioError, ErrorCode, MeterError};
pub use meter::{MeterSetting, NoteValue, TimeSignature};
pub use timing::TickSource;

/// Install the `tracing` fmt subscriber (also receives `log` records)
///
/// Honors `RUST_LOG`; defaults to `info`. Safe to call more than once.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
