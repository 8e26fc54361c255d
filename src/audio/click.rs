//! Click - synthesized metronome sounds
//!
//! This module provides deterministic default click sounds for when no sample
//! files are supplied. Key features:
//! - 20ms noise burst blended with a short tone, exponentially decayed
//! - Distinct accent click (higher tone, louder) for the first beat of a bar
//! - Fixed-seed noise, so the output is identical across calls
//! - WAV encoding so synthesized clicks go through the same decode path as files

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AudioError;

/// Duration of metronome click in milliseconds
const CLICK_DURATION_MS: f32 = 20.0;

/// Which click to synthesize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    Normal,
    Accent,
}

impl ClickKind {
    fn tone_hz(self) -> f32 {
        match self {
            ClickKind::Normal => 1000.0,
            ClickKind::Accent => 1500.0,
        }
    }

    fn gain(self) -> f32 {
        match self {
            ClickKind::Normal => 0.6,
            ClickKind::Accent => 0.9,
        }
    }
}

/// Generates a metronome click sample (20ms decaying noise + tone burst).
///
/// # Arguments
/// * `sample_rate` - Sample rate in Hz (typically 48000)
/// * `kind` - Normal or accent click
///
/// # Returns
/// A `Vec<f32>` containing exactly 20ms worth of samples in range [-1.0, 1.0]
///
/// # Examples
/// ```
/// use metronome_core::audio::click::{generate_click_sample, ClickKind};
///
/// let click = generate_click_sample(48000, ClickKind::Normal);
/// assert_eq!(click.len(), 960);
/// ```
pub fn generate_click_sample(sample_rate: u32, kind: ClickKind) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * CLICK_DURATION_MS / 1000.0) as usize;

    // Use fixed seed for deterministic noise generation
    let mut rng = StdRng::seed_from_u64(42);
    let omega = std::f32::consts::TAU * kind.tone_hz() / sample_rate.max(1) as f32;
    let decay = 5.0 / num_samples.max(1) as f32;

    (0..num_samples)
        .map(|i| {
            let noise: f32 = rng.gen_range(-1.0..1.0);
            let tone = (omega * i as f32).sin();
            let envelope = (-decay * i as f32).exp();
            ((0.3 * noise + 0.7 * tone) * envelope * kind.gain()).clamp(-1.0, 1.0)
        })
        .collect()
}

/// Encode mono samples as a 32-bit float WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, spec).map_err(encode_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(encode_error)?;
    }
    writer.finalize().map_err(encode_error)?;

    Ok(cursor.into_inner())
}

/// Synthesize a click and return it as WAV bytes ready for loading
pub fn click_wav(sample_rate: u32, kind: ClickKind) -> Result<Vec<u8>, AudioError> {
    encode_wav(&generate_click_sample(sample_rate, kind), sample_rate)
}

fn encode_error(err: hound::Error) -> AudioError {
    AudioError::Encode {
        reason: err.to_string(),
    }
}
