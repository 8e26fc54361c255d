//! CpalBackend - desktop audio output via cpal
//!
//! The audio clock is a frame counter advanced by the output callback, so
//! `current_time()` is exactly the position of the next rendered block.
//! Playback commands travel to the callback through a lock-free rtrb queue and
//! are mixed sample-accurately at their absolute start frame.
//!
//! `cpal::Stream` is not `Send`, so the stream lives on its own thread that
//! parks until [`CpalBackend::close`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::AudioConfig;
use crate::error::AudioError;

use super::backend::{AudioBackend, SampleBuffer};

/// A buffer waiting to be (or being) mixed, positioned on the frame clock
#[derive(Debug)]
struct Voice {
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Real-time mixer owned by the output callback
struct Mixer {
    incoming: Consumer<Voice>,
    active: Vec<Voice>,
    max_active: usize,
}

impl Mixer {
    fn new(incoming: Consumer<Voice>, max_active: usize) -> Self {
        let max_active = max_active.max(1);
        Self {
            incoming,
            active: Vec::with_capacity(max_active),
            max_active,
        }
    }

    /// Render one interleaved block starting at `block_start`; returns frames rendered
    fn render(&mut self, data: &mut [f32], channels: usize, block_start: u64) -> usize {
        let channels = channels.max(1);
        let frames = data.len() / channels;
        let block_end = block_start + frames as u64;

        while let Ok(mut voice) = self.incoming.pop() {
            if self.active.len() >= self.max_active {
                continue;
            }
            // Missed its slot; play as soon as possible
            voice.start_frame = voice.start_frame.max(block_start);
            self.active.push(voice);
        }

        data.fill(0.0);
        for voice in &self.active {
            if voice.start_frame >= block_end {
                continue;
            }
            let first = (voice.start_frame - block_start.min(voice.start_frame)) as usize;
            let offset = (block_start + first as u64 - voice.start_frame) as usize;
            let count = voice
                .samples
                .len()
                .saturating_sub(offset)
                .min(frames - first);

            for k in 0..count {
                let sample = voice.samples[offset + k];
                let frame = &mut data[(first + k) * channels..(first + k + 1) * channels];
                for out in frame {
                    *out += sample;
                }
            }
        }

        self.active.retain(|voice| voice.end_frame() > block_end);
        for out in data.iter_mut() {
            *out = out.clamp(-1.0, 1.0);
        }
        frames
    }
}

#[derive(Debug, Clone, Copy)]
struct OutputFormat {
    sample_rate: u32,
    channels: u16,
}

/// Audio backend on the default cpal output device (F32 only)
pub struct CpalBackend {
    format: OutputFormat,
    frame_counter: Arc<AtomicU64>,
    voices: Mutex<Producer<Voice>>,
    shutdown: Mutex<Option<Sender<()>>>,
    stream_thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalBackend {
    /// Open and start the default output device
    ///
    /// # Errors
    /// - `StreamOpenFailed` if no device/config is available or the format is not F32
    /// - `HardwareError` if the stream cannot be started
    pub fn open(config: &AudioConfig) -> Result<Self, AudioError> {
        let (producer, consumer) = RingBuffer::new(config.voice_queue_capacity.max(1));
        let mixer = Mixer::new(consumer, config.max_active_voices);
        let frame_counter = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&frame_counter);

        let (init_tx, init_rx) = mpsc::sync_channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let stream_thread = thread::Builder::new()
            .name("metronome-audio-out".to_string())
            .spawn(move || {
                let stream = match build_output_stream(mixer, counter) {
                    Ok((stream, format)) => {
                        let _ = init_tx.send(Ok(format));
                        stream
                    }
                    Err(err) => {
                        let _ = init_tx.send(Err(err));
                        return;
                    }
                };

                // Parked until close() or drop
                let _ = shutdown_rx.recv();
                if let Err(e) = stream.pause() {
                    log::warn!("[CpalBackend] Failed to pause output stream: {}", e);
                }
                drop(stream);
                log::debug!("[CpalBackend] Output stream released");
            })
            .map_err(|e| AudioError::StreamOpenFailed {
                reason: format!("failed to spawn audio thread: {}", e),
            })?;

        let format = init_rx.recv().map_err(|_| AudioError::StreamOpenFailed {
            reason: "audio thread exited during setup".to_string(),
        })??;

        log::info!(
            "[CpalBackend] Output running at {} Hz, {} channels",
            format.sample_rate,
            format.channels
        );

        Ok(Self {
            format,
            frame_counter,
            voices: Mutex::new(producer),
            shutdown: Mutex::new(Some(shutdown_tx)),
            stream_thread: Mutex::new(Some(stream_thread)),
        })
    }

    pub fn channels(&self) -> u16 {
        self.format.channels
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame_counter.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }
}

impl AudioBackend for CpalBackend {
    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frames_rendered() as f64 / self.format.sample_rate as f64
    }

    fn schedule_playback(&self, buffer: &SampleBuffer, at_secs: f64) -> Result<(), AudioError> {
        if self.is_closed() {
            return Err(AudioError::Destroyed);
        }
        let voice = Voice {
            start_frame: (at_secs.max(0.0) * self.format.sample_rate as f64).round() as u64,
            samples: buffer.shared_samples(),
        };

        let mut producer = self.voices.lock().map_err(|_| AudioError::LockPoisoned {
            component: "CpalBackend::voices".to_string(),
        })?;
        producer
            .push(voice)
            .map_err(|_| AudioError::PlaybackQueueFull)
    }

    fn close(&self) -> Result<(), AudioError> {
        let shutdown = self
            .shutdown
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "CpalBackend::shutdown".to_string(),
            })?
            .take();
        let Some(shutdown) = shutdown else {
            return Ok(());
        };
        let _ = shutdown.send(());

        let handle = self
            .stream_thread
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "CpalBackend::stream_thread".to_string(),
            })?
            .take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| AudioError::HardwareError {
                details: "audio thread panicked".to_string(),
            })?;
        }
        log::info!("[CpalBackend] Closed");
        Ok(())
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("[CpalBackend] Close on drop failed: {}", err);
        }
    }
}

fn build_output_stream(
    mut mixer: Mixer,
    frame_counter: Arc<AtomicU64>,
) -> Result<(cpal::Stream, OutputFormat), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| AudioError::StreamOpenFailed {
            reason: "No default output device found".to_string(),
        })?;

    let config = device
        .default_output_config()
        .map_err(|e| AudioError::StreamOpenFailed {
            reason: format!("Failed to get default output config: {:?}", e),
        })?;

    let stream_config: cpal::StreamConfig = config.clone().into();
    let format = OutputFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };
    let channels = format.channels as usize;

    let err_fn = |err| log::error!("[CpalBackend] Output stream error: {}", err);

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let block_start = frame_counter.load(Ordering::Acquire);
                let frames = mixer.render(data, channels, block_start);
                frame_counter.fetch_add(frames as u64, Ordering::Release);
            },
            err_fn,
            None,
        ),
        _ => {
            return Err(AudioError::StreamOpenFailed {
                reason: "Only F32 sample format is currently supported for output".to_string(),
            })
        }
    }
    .map_err(|e| AudioError::StreamOpenFailed {
        reason: format!("{:?}", e),
    })?;

    stream.play().map_err(|e| AudioError::HardwareError {
        details: format!("Output start failed: {}", e),
    })?;

    Ok((stream, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer_with_queue(capacity: usize, max_active: usize) -> (Producer<Voice>, Mixer) {
        let (producer, consumer) = RingBuffer::new(capacity);
        (producer, Mixer::new(consumer, max_active))
    }

    fn voice(start_frame: u64, samples: &[f32]) -> Voice {
        Voice {
            start_frame,
            samples: samples.to_vec().into(),
        }
    }

    #[test]
    fn test_voice_starts_at_its_frame() {
        let (mut producer, mut mixer) = mixer_with_queue(4, 4);
        producer.push(voice(3, &[0.5, 0.25])).unwrap();

        let mut block = vec![1.0; 8];
        assert_eq!(mixer.render(&mut block, 1, 0), 8);
        assert_eq!(block, vec![0.0, 0.0, 0.0, 0.5, 0.25, 0.0, 0.0, 0.0]);
        assert!(mixer.active.is_empty());
    }

    #[test]
    fn test_voice_spans_blocks() {
        let (mut producer, mut mixer) = mixer_with_queue(4, 4);
        producer.push(voice(2, &[0.1, 0.2, 0.3, 0.4])).unwrap();

        let mut first = vec![0.0; 4];
        mixer.render(&mut first, 1, 0);
        assert_eq!(first, vec![0.0, 0.0, 0.1, 0.2]);
        assert_eq!(mixer.active.len(), 1);

        let mut second = vec![0.0; 4];
        mixer.render(&mut second, 1, 4);
        assert_eq!(second, vec![0.3, 0.4, 0.0, 0.0]);
        assert!(mixer.active.is_empty());
    }

    #[test]
    fn test_late_voice_starts_at_block_head() {
        let (mut producer, mut mixer) = mixer_with_queue(4, 4);
        producer.push(voice(10, &[0.5, 0.5])).unwrap();

        let mut block = vec![0.0; 4];
        mixer.render(&mut block, 1, 100);
        assert_eq!(block, vec![0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_overlapping_voices_are_summed_and_clamped() {
        let (mut producer, mut mixer) = mixer_with_queue(4, 4);
        producer.push(voice(0, &[0.4, 0.8])).unwrap();
        producer.push(voice(0, &[0.4, 0.8])).unwrap();

        let mut block = vec![0.0; 2];
        mixer.render(&mut block, 1, 0);
        assert!((block[0] - 0.8).abs() < 1e-6);
        assert_eq!(block[1], 1.0);
    }

    #[test]
    fn test_interleaved_channels_get_same_sample() {
        let (mut producer, mut mixer) = mixer_with_queue(4, 4);
        producer.push(voice(1, &[0.5])).unwrap();

        let mut block = vec![0.0; 6];
        assert_eq!(mixer.render(&mut block, 2, 0), 3);
        assert_eq!(block, vec![0.0, 0.0, 0.5, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn test_voices_beyond_limit_are_dropped() {
        let (mut producer, mut mixer) = mixer_with_queue(4, 1);
        producer.push(voice(0, &[0.25, 0.25])).unwrap();
        producer.push(voice(0, &[0.25, 0.25])).unwrap();

        let mut block = vec![0.0; 1];
        mixer.render(&mut block, 1, 0);
        assert_eq!(block, vec![0.25]);
        assert_eq!(mixer.active.len(), 1);
    }
}
