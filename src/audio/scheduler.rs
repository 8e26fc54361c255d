//! BeatScheduler - look-ahead beat scheduling with drift correction
//!
//! The scheduler turns coarse, jittery ticks into sample-accurate playback
//! commands. On every tick it issues every beat whose target time falls inside
//! the look-ahead window, each at its exact timestamp on the audio clock, so
//! the audio backend (not the tick thread) is responsible for precision.
//!
//! # Timing model
//! - Beat `n` of the current anchor plays at `start_timestamp + n * 60 / bpm`.
//!   Timestamps are derived from the anchor, never accumulated, so rounding
//!   error does not grow over long sessions.
//! - A tempo change while running re-derives the anchor so the grid passes
//!   through "now" at the same fractional beat position (phase continuity).
//! - After each beat the next timestamp is checked against the audio clock;
//!   a deviation beyond the drift threshold (device sleep, clock jumps)
//!   re-anchors the grid at the current time.
//!
//! # Architecture
//! ```text
//! TickSource worker ──try_send──> sync_channel(1) ──> BeatScheduler::poll / wait_for_tick
//!                                                       └─> process_tick()
//!                                                            ├─> AudioBackend::schedule_playback(buffer, t)
//!                                                            └─> on_beat(beat_index)
//! ```
//! The channel holds at most one pending tick, so a slow consumer coalesces
//! ticks instead of blocking the worker.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{DriftReference, SchedulerConfig, MAX_TEMPO_BPM};
use crate::error::{log_audio_error, AudioError};
use crate::timing::TickSource;

use super::backend::{AudioBackend, SampleBuffer};

type BeatCallback = Box<dyn FnMut(u32) + Send + 'static>;

/// Authoritative playback position of a [`BeatScheduler`]
///
/// Returned by value from [`BeatScheduler::clock`]; it can only change
/// through the scheduler's operations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackClock {
    pub tempo_bpm: f64,
    pub beats_per_bar: u32,
    pub is_running: bool,
    /// Audio-clock time of beat 0 of the current anchor
    pub start_timestamp: f64,
    /// Audio-clock time of the next beat to be issued
    pub next_note_timestamp: f64,
    /// Index within the bar of the next beat to be issued
    pub current_beat_index: u32,
    /// Beats issued since the current anchor
    pub beats_elapsed: u64,
}

impl PlaybackClock {
    fn new(tempo_bpm: f64, beats_per_bar: u32) -> Self {
        Self {
            tempo_bpm,
            beats_per_bar,
            is_running: false,
            start_timestamp: 0.0,
            next_note_timestamp: 0.0,
            current_beat_index: 0,
            beats_elapsed: 0,
        }
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.tempo_bpm
    }

    fn anchor(&mut self, now: f64) {
        self.start_timestamp = now;
        self.next_note_timestamp = now;
        self.beats_elapsed = 0;
    }

    fn advance(&mut self) {
        self.current_beat_index = (self.current_beat_index + 1) % self.beats_per_bar;
        self.beats_elapsed += 1;
        self.next_note_timestamp =
            self.start_timestamp + self.beats_elapsed as f64 * self.seconds_per_beat();
    }
}

#[derive(Debug, Clone, Default)]
struct SoundBank {
    normal: Option<SampleBuffer>,
    accent: Option<SampleBuffer>,
}

#[derive(Debug, Clone, Copy)]
enum SoundSlot {
    Normal,
    Accent,
}

impl SoundSlot {
    fn context(self) -> &'static str {
        match self {
            SoundSlot::Normal => "BeatScheduler::load_normal_sound",
            SoundSlot::Accent => "BeatScheduler::load_accent_sound",
        }
    }
}

/// Look-ahead metronome scheduler
///
/// Single owner, sequential access: every operation takes `&mut self` and
/// ticks are processed on the caller's thread through [`poll`](Self::poll),
/// [`wait_for_tick`](Self::wait_for_tick) or [`process_tick`](Self::process_tick).
///
/// # Example
/// ```ignore
/// let mut scheduler = BeatScheduler::with_defaults(backend)?;
/// scheduler.load_normal_sound(click_bytes).await?;
/// scheduler.set_on_beat_callback(|beat| println!("beat {beat}"));
/// scheduler.start()?;
/// loop {
///     scheduler.wait_for_tick(Duration::from_millis(100));
/// }
/// ```
pub struct BeatScheduler<B: AudioBackend + 'static> {
    backend: Arc<B>,
    clock: PlaybackClock,
    sounds: SoundBank,
    accent_enabled: bool,
    on_beat: Option<BeatCallback>,
    look_ahead_secs: f64,
    drift_threshold_secs: f64,
    drift_reference: DriftReference,
    tick_source: TickSource,
    ticks: Receiver<()>,
    destroyed: bool,
}

impl<B: AudioBackend + 'static> BeatScheduler<B> {
    /// Create a stopped scheduler and spawn its tick worker
    ///
    /// # Errors
    /// - `BpmInvalid` / `BeatsPerBarInvalid` for invalid defaults in `config`
    /// - `TickSourceFailed` if the worker thread cannot be spawned
    pub fn new(backend: Arc<B>, config: &SchedulerConfig) -> Result<Self, AudioError> {
        validate_tempo(config.default_tempo_bpm)?;
        validate_beats_per_bar(config.default_beats_per_bar)?;

        let tick_source = TickSource::new(config.tick_period())?;
        let (tick_tx, ticks) = mpsc::sync_channel::<()>(1);
        tick_source.on_tick(move || {
            // Full means a tick is already pending; disconnected means we are shutting down.
            let _ = tick_tx.try_send(());
        });

        Ok(Self {
            backend,
            clock: PlaybackClock::new(config.default_tempo_bpm, config.default_beats_per_bar),
            sounds: SoundBank::default(),
            accent_enabled: config.accent_enabled,
            on_beat: None,
            look_ahead_secs: config.look_ahead_secs,
            drift_threshold_secs: config.effective_drift_threshold(),
            drift_reference: config.drift_reference,
            tick_source,
            ticks,
            destroyed: false,
        })
    }

    /// Create a scheduler with [`SchedulerConfig::default`]
    pub fn with_defaults(backend: Arc<B>) -> Result<Self, AudioError> {
        Self::new(backend, &SchedulerConfig::default())
    }

    /// Decode and install the sound played on regular beats
    ///
    /// Decoding runs on the blocking thread pool of the current tokio runtime.
    /// On failure the previously loaded normal sound, if any, is kept.
    pub async fn load_normal_sound(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), AudioError> {
        let buffer = self.decode_off_thread(bytes.into(), SoundSlot::Normal).await?;
        self.sounds.normal = Some(buffer);
        Ok(())
    }

    /// Decode and install the sound played on the first beat of each bar
    ///
    /// On failure the previously loaded accent sound, if any, is kept.
    pub async fn load_accent_sound(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), AudioError> {
        let buffer = self.decode_off_thread(bytes.into(), SoundSlot::Accent).await?;
        self.sounds.accent = Some(buffer);
        Ok(())
    }

    async fn decode_off_thread(
        &self,
        bytes: Vec<u8>,
        slot: SoundSlot,
    ) -> Result<SampleBuffer, AudioError> {
        if self.destroyed {
            return Err(AudioError::Destroyed);
        }

        let backend = Arc::clone(&self.backend);
        let result = tokio::task::spawn_blocking(move || backend.decode(&bytes))
            .await
            .map_err(|e| AudioError::Decode {
                reason: format!("decode task failed: {}", e),
            })
            .and_then(|decoded| decoded);

        match result {
            Ok(buffer) => {
                log::info!(
                    "[BeatScheduler] Loaded {:?} sound: {} frames at {} Hz",
                    slot,
                    buffer.frames(),
                    buffer.sample_rate()
                );
                Ok(buffer)
            }
            Err(err) => {
                log_audio_error(&err, slot.context());
                Err(err)
            }
        }
    }

    /// Change the bar length for future beats
    ///
    /// The beat position is kept; an index past the new bar end wraps.
    pub fn set_beats_per_bar(&mut self, beats: u32) -> Result<(), AudioError> {
        validate_beats_per_bar(beats)?;
        self.clock.beats_per_bar = beats;
        self.clock.current_beat_index %= beats;
        log::debug!("[BeatScheduler] Beats per bar set to {}", beats);
        Ok(())
    }

    /// Change the tempo, preserving phase when running
    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), AudioError> {
        validate_tempo(bpm)?;

        if !self.clock.is_running {
            self.clock.tempo_bpm = bpm;
            return Ok(());
        }

        let now = self.backend.current_time();
        let position = (now - self.clock.start_timestamp) / self.clock.seconds_per_beat();
        self.clock.tempo_bpm = bpm;

        let seconds_per_beat = self.clock.seconds_per_beat();
        self.clock.start_timestamp = now - position * seconds_per_beat;
        self.clock.next_note_timestamp =
            self.clock.start_timestamp + self.clock.beats_elapsed as f64 * seconds_per_beat;

        tracing::debug!(
            "[BeatScheduler] Tempo changed to {:.2} BPM at beat position {:.3}, next beat at {:.4}s",
            bpm,
            position,
            self.clock.next_note_timestamp
        );
        Ok(())
    }

    /// Toggle the accent sound on beat 0; applies from the next scheduled beat
    pub fn set_accent_enabled(&mut self, enabled: bool) {
        self.accent_enabled = enabled;
    }

    pub fn is_accent_enabled(&self) -> bool {
        self.accent_enabled
    }

    /// Register the single beat subscriber, replacing any previous one
    ///
    /// Invoked synchronously on the thread that processes ticks, once per
    /// issued beat, with the 0-based index of the beat within the bar.
    pub fn set_on_beat_callback<F>(&mut self, callback: F)
    where
        F: FnMut(u32) + Send + 'static,
    {
        self.on_beat = Some(Box::new(callback));
    }

    pub fn clear_on_beat_callback(&mut self) {
        self.on_beat = None;
    }

    /// Anchor the beat grid at the current audio time and start ticking
    ///
    /// No-op if already running.
    ///
    /// # Errors
    /// - `NotLoaded` if no normal sound has been loaded (no state change)
    /// - `Destroyed` after [`destroy`](Self::destroy)
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.destroyed {
            return Err(AudioError::Destroyed);
        }
        if self.clock.is_running {
            return Ok(());
        }
        if self.sounds.normal.is_none() {
            let err = AudioError::NotLoaded;
            log_audio_error(&err, "BeatScheduler::start");
            return Err(err);
        }

        self.clock.current_beat_index = 0;
        self.clock.anchor(self.backend.current_time());
        self.drain_ticks();
        self.tick_source.start()?;
        self.clock.is_running = true;

        log::info!(
            "[BeatScheduler] Started at {:.2} BPM, {} beats per bar",
            self.clock.tempo_bpm,
            self.clock.beats_per_bar
        );
        Ok(())
    }

    /// Halt scheduling. Beats already handed to the backend still play.
    ///
    /// No-op if already stopped. The beat position is kept until the next `start()`.
    pub fn stop(&mut self) {
        if !self.clock.is_running {
            return;
        }
        self.clock.is_running = false;
        self.tick_source.stop();
        self.drain_ticks();
        log::info!(
            "[BeatScheduler] Stopped after {} beats since last anchor",
            self.clock.beats_elapsed
        );
    }

    pub fn is_running(&self) -> bool {
        self.clock.is_running
    }

    pub fn tempo(&self) -> f64 {
        self.clock.tempo_bpm
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.clock.beats_per_bar
    }

    /// Copy of the current playback clock
    pub fn clock(&self) -> PlaybackClock {
        self.clock
    }

    pub fn has_normal_sound(&self) -> bool {
        self.sounds.normal.is_some()
    }

    pub fn has_accent_sound(&self) -> bool {
        self.sounds.accent.is_some()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Handle any pending tick without blocking
    ///
    /// Returns `None` if no tick was pending, otherwise the number of beats issued.
    pub fn poll(&mut self) -> Option<usize> {
        let mut pending = false;
        while self.ticks.try_recv().is_ok() {
            pending = true;
        }
        pending.then(|| self.process_tick())
    }

    /// Block until the next tick (or `timeout`) and handle it
    ///
    /// Returns `None` on timeout, otherwise the number of beats issued.
    /// Once destroyed no tick can arrive: the call sleeps for `timeout` and
    /// returns `None`.
    pub fn wait_for_tick(&mut self, timeout: Duration) -> Option<usize> {
        if self.destroyed {
            std::thread::sleep(timeout);
            return None;
        }
        match self.ticks.recv_timeout(timeout) {
            Ok(()) => {
                self.drain_ticks();
                Some(self.process_tick())
            }
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                None
            }
        }
    }

    /// Run one look-ahead scheduling pass
    ///
    /// Issues every beat due before `now + look_ahead`, each at its exact
    /// grid timestamp, and returns how many were issued. Does nothing while
    /// stopped.
    pub fn process_tick(&mut self) -> usize {
        if !self.clock.is_running {
            return 0;
        }

        let mut issued = 0;
        while self.clock.next_note_timestamp < self.backend.current_time() + self.look_ahead_secs {
            let beat_index = self.clock.current_beat_index;
            self.play_note(self.clock.next_note_timestamp, beat_index == 0);

            if let Some(callback) = self.on_beat.as_mut() {
                callback(beat_index);
            }

            self.clock.advance();
            issued += 1;

            let now = self.backend.current_time();
            let drift = self.measure_drift(now);
            if drift > self.drift_threshold_secs {
                tracing::warn!(
                    "[BeatScheduler] Drift of {:.1} ms detected, resyncing at {:.4}s",
                    drift * 1000.0,
                    now
                );
                self.clock.anchor(now);
            }
        }

        issued
    }

    /// Stop, release the tick worker and close the backend. Irrevocable.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.stop();
        self.tick_source.destroy();
        if let Err(err) = self.backend.close() {
            log_audio_error(&err, "BeatScheduler::destroy");
        }
        self.on_beat = None;
        self.destroyed = true;
        log::info!("[BeatScheduler] Destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn play_note(&self, at: f64, is_first_beat: bool) {
        let use_accent = self.accent_enabled && is_first_beat;
        let buffer = if use_accent {
            self.sounds.accent.as_ref().or(self.sounds.normal.as_ref())
        } else {
            self.sounds.normal.as_ref()
        };
        let Some(buffer) = buffer else {
            return;
        };

        if let Err(err) = self.backend.schedule_playback(buffer, at) {
            log_audio_error(&err, "BeatScheduler::play_note");
        }
    }

    fn measure_drift(&self, now: f64) -> f64 {
        let seconds_per_beat = self.clock.seconds_per_beat();
        let next = self.clock.next_note_timestamp;
        match self.drift_reference {
            DriftReference::NextBeat => (next - (now + seconds_per_beat)).abs(),
            DriftReference::LookAheadWindow => {
                let window_end = now + seconds_per_beat + self.look_ahead_secs;
                if next < now {
                    now - next
                } else if next > window_end {
                    next - window_end
                } else {
                    0.0
                }
            }
        }
    }

    fn drain_ticks(&self) {
        while self.ticks.try_recv().is_ok() {}
    }
}

impl<B: AudioBackend + 'static> Drop for BeatScheduler<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn validate_tempo(bpm: f64) -> Result<(), AudioError> {
    if !bpm.is_finite() || bpm <= 0.0 || bpm > MAX_TEMPO_BPM {
        return Err(AudioError::BpmInvalid { bpm });
    }
    Ok(())
}

fn validate_beats_per_bar(beats: u32) -> Result<(), AudioError> {
    if beats == 0 {
        return Err(AudioError::BeatsPerBarInvalid { beats });
    }
    Ok(())
}
