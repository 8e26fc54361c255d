//! WAV decoding into mono PCM at the output sample rate.
//!
//! Integer and float WAV files of any channel count are accepted. Channels are
//! averaged to mono and the result is linearly resampled to the backend rate,
//! so the audio callback can index decoded frames directly.

use std::io::Cursor;

use hound::{SampleFormat, WavReader};

use crate::error::AudioError;

use super::backend::SampleBuffer;

/// Decode WAV bytes into a mono buffer at `target_sample_rate`
///
/// A `target_sample_rate` of 0 keeps the file's own rate.
///
/// # Errors
/// Returns `AudioError::Decode` for empty input, malformed headers, unsupported
/// sample formats and files without any audio frames.
pub fn decode_wav(bytes: &[u8], target_sample_rate: u32) -> Result<SampleBuffer, AudioError> {
    if bytes.is_empty() {
        return Err(AudioError::Decode {
            reason: "empty input".to_string(),
        });
    }

    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(AudioError::Decode {
            reason: format!(
                "invalid format: {} channels at {} Hz",
                spec.channels, spec.sample_rate
            ),
        });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioError::Decode {
                    reason: format!("unsupported bit depth {}", spec.bits_per_sample),
                });
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = mixdown(&interleaved, spec.channels as usize);
    if mono.is_empty() {
        return Err(AudioError::Decode {
            reason: "no audio frames".to_string(),
        });
    }

    if target_sample_rate == 0 || target_sample_rate == spec.sample_rate {
        return Ok(SampleBuffer::new(mono, spec.sample_rate));
    }

    log::debug!(
        "[Decode] Resampling {} frames from {} Hz to {} Hz",
        mono.len(),
        spec.sample_rate,
        target_sample_rate
    );
    Ok(SampleBuffer::new(
        resample_linear(&mono, spec.sample_rate, target_sample_rate),
        target_sample_rate,
    ))
}

/// Average interleaved channels into one; trailing partial frames are dropped
fn mixdown(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let out_len = ((input.len() as u64 * to_rate as u64) / from_rate as u64).max(1) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let position = i as f64 * step;
            let index = (position.floor() as usize).min(last);
            let next = (index + 1).min(last);
            let frac = (position - index as f64) as f32;
            input[index] + (input[next] - input[index]) * frac
        })
        .collect()
}
