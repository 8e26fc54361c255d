// Timing module - tick delivery decoupled from the caller's thread

pub mod tick_source;

pub use tick_source::{TickSource, DEFAULT_TICK_PERIOD};
