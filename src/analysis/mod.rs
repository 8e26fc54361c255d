// Analysis module - tempo estimation from user input
//
// Independent of the audio path: the UI forwards taps here directly and
// reads back snapshots. Nothing in this module touches the scheduler.

pub mod tap_tempo;

pub use tap_tempo::{TapSnapshot, TapTempoEstimator, TAP_BEAT_CYCLE};
