// Audio module - beat scheduling, sound loading and playback backends

pub mod backend;
pub mod click;
pub mod decode;
pub mod engine_cpal;
pub mod scheduler;

// Re-export commonly used types for convenience
pub use backend::{AudioBackend, SampleBuffer};
pub use click::{click_wav, generate_click_sample, ClickKind};
pub use engine_cpal::CpalBackend;
pub use scheduler::{BeatScheduler, PlaybackClock};
