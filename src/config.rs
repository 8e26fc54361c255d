//! Configuration management for scheduler and tap-tempo tuning
//!
//! This module provides runtime configuration loading from JSON files so the
//! look-ahead window, drift policy and tick period can be adjusted without
//! recompilation. Every section falls back to its defaults field by field,
//! so a config file only needs to name what it overrides.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Upper tempo limit accepted by the scheduler (display tempo times subdivision)
pub const MAX_TEMPO_BPM: f64 = 2000.0;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub tap_tempo: TapTempoConfig,
    pub audio: AudioConfig,
}

/// Reference point the drift guard measures the next note against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftReference {
    /// `|next_note - (now + seconds_per_beat)|`
    #[default]
    NextBeat,
    /// Distance of the next note outside `[now, now + seconds_per_beat + look_ahead]`
    LookAheadWindow,
}

/// Beat scheduler parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Period of the tick worker in milliseconds
    pub tick_period_ms: u64,
    /// How far ahead of the audio clock beats are scheduled, in seconds
    pub look_ahead_secs: f64,
    /// Drift beyond which the beat grid is re-anchored, in seconds
    pub drift_threshold_secs: f64,
    /// What the drift guard compares against
    pub drift_reference: DriftReference,
    pub default_tempo_bpm: f64,
    pub default_beats_per_bar: u32,
    pub accent_enabled: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 25,
            look_ahead_secs: 0.1,
            drift_threshold_secs: 0.1,
            drift_reference: DriftReference::NextBeat,
            default_tempo_bpm: 120.0,
            default_beats_per_bar: 4,
            accent_enabled: true,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Drift threshold the scheduler actually applies
    ///
    /// With [`DriftReference::NextBeat`] a beat issued up to one look-ahead
    /// early reads as drift of the same size, so the threshold never drops
    /// below `look_ahead_secs`.
    pub fn effective_drift_threshold(&self) -> f64 {
        match self.drift_reference {
            DriftReference::NextBeat => self.drift_threshold_secs.max(self.look_ahead_secs),
            DriftReference::LookAheadWindow => self.drift_threshold_secs,
        }
    }
}

/// Tap tempo parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TapTempoConfig {
    /// Inactivity after which a new tap starts a fresh session (1-10 s, `None` disables)
    pub auto_reset_secs: Option<u64>,
}

impl Default for TapTempoConfig {
    fn default() -> Self {
        Self {
            auto_reset_secs: Some(3),
        }
    }
}

impl TapTempoConfig {
    pub fn auto_reset(&self) -> Option<Duration> {
        self.auto_reset_secs.map(Duration::from_secs)
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Capacity of the lock-free queue carrying playback commands to the callback
    pub voice_queue_capacity: usize,
    /// Maximum number of overlapping sounds mixed by the callback
    pub max_active_voices: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            voice_queue_capacity: 64,
            max_active_voices: 32,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults if the file is missing or the
    /// JSON is invalid. The result is always passed through [`AppConfig::validated`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config.validated()
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/metronome_config.json")
    }

    /// Clamp out-of-range values into their supported ranges
    pub fn validated(mut self) -> Self {
        let defaults = SchedulerConfig::default();
        let scheduler = &mut self.scheduler;

        scheduler.tick_period_ms = scheduler.tick_period_ms.max(1);
        if !(scheduler.look_ahead_secs.is_finite() && scheduler.look_ahead_secs > 0.0) {
            log::warn!(
                "[Config] look_ahead_secs {} out of range, using {}",
                scheduler.look_ahead_secs,
                defaults.look_ahead_secs
            );
            scheduler.look_ahead_secs = defaults.look_ahead_secs;
        }
        if !(scheduler.drift_threshold_secs.is_finite() && scheduler.drift_threshold_secs > 0.0) {
            log::warn!(
                "[Config] drift_threshold_secs {} out of range, using {}",
                scheduler.drift_threshold_secs,
                defaults.drift_threshold_secs
            );
            scheduler.drift_threshold_secs = defaults.drift_threshold_secs;
        }
        let threshold = scheduler.effective_drift_threshold();
        if threshold != scheduler.drift_threshold_secs {
            log::warn!(
                "[Config] drift_threshold_secs {} is below look_ahead_secs {}, using {}",
                scheduler.drift_threshold_secs,
                scheduler.look_ahead_secs,
                threshold
            );
            scheduler.drift_threshold_secs = threshold;
        }
        // Ticks further apart than the look-ahead would issue beats late
        let max_tick_period_ms = ((scheduler.look_ahead_secs * 1000.0) as u64).max(1);
        if scheduler.tick_period_ms > max_tick_period_ms {
            log::warn!(
                "[Config] tick_period_ms {} exceeds the look-ahead, using {}",
                scheduler.tick_period_ms,
                max_tick_period_ms
            );
            scheduler.tick_period_ms = max_tick_period_ms;
        }
        if !(scheduler.default_tempo_bpm.is_finite() && scheduler.default_tempo_bpm > 0.0) {
            scheduler.default_tempo_bpm = defaults.default_tempo_bpm;
        }
        scheduler.default_tempo_bpm = scheduler.default_tempo_bpm.min(MAX_TEMPO_BPM);
        scheduler.default_beats_per_bar = scheduler.default_beats_per_bar.max(1);

        self.tap_tempo.auto_reset_secs = self.tap_tempo.auto_reset_secs.map(|s| s.clamp(1, 10));

        self.audio.voice_queue_capacity = self.audio.voice_queue_capacity.max(1);
        self.audio.max_active_voices = self.audio.max_active_voices.max(1);

        self
    }
}
