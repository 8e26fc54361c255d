//! TickSource - periodic pulse generator on a dedicated worker thread
//!
//! The worker owns all timing: the caller only sends commands over a channel
//! and receives ticks through a registered callback, so a busy caller cannot
//! delay tick emission. Delivery is approximately periodic; consumers that
//! need precision (the beat scheduler) measure time against their own clock.
//!
//! # Architecture
//! ```text
//! TickSource (caller thread)
//!   └─> mpsc::Sender<TickCommand>  ──>  worker "metronome-tick"
//!                                          ├─> recv_timeout(deadline - now)
//!                                          └─> callback() on every deadline
//! ```

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::AudioError;

/// Default tick period (25ms)
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_millis(25);

const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

type TickCallback = Box<dyn FnMut() + Send + 'static>;
type SharedCallback = Arc<Mutex<Option<TickCallback>>>;

enum TickCommand {
    Start,
    Stop,
    Configure(Duration),
    Shutdown,
}

/// Periodic tick emitter running on its own thread
///
/// # Example
/// ```ignore
/// let mut ticks = TickSource::new(Duration::from_millis(25))?;
/// ticks.on_tick(|| println!("tick"));
/// ticks.start()?;
/// // ...
/// ticks.destroy();
/// ```
pub struct TickSource {
    commands: Option<Sender<TickCommand>>,
    worker: Option<JoinHandle<()>>,
    callback: SharedCallback,
    period: Duration,
    running: bool,
}

impl TickSource {
    /// Spawn the worker thread, initially stopped
    ///
    /// Periods below 1ms are raised to 1ms.
    ///
    /// # Errors
    /// Returns `TickSourceFailed` if the worker thread cannot be spawned
    pub fn new(period: Duration) -> Result<Self, AudioError> {
        let period = period.max(MIN_TICK_PERIOD);
        let (tx, rx) = mpsc::channel();
        let callback: SharedCallback = Arc::new(Mutex::new(None));
        let worker_callback = Arc::clone(&callback);

        let worker = thread::Builder::new()
            .name("metronome-tick".to_string())
            .spawn(move || run_worker(rx, period, worker_callback))
            .map_err(|e| AudioError::TickSourceFailed {
                reason: format!("failed to spawn worker: {}", e),
            })?;

        Ok(Self {
            commands: Some(tx),
            worker: Some(worker),
            callback,
            period,
            running: false,
        })
    }

    /// Register the tick callback, replacing any previous one
    ///
    /// The callback runs on the worker thread and should return quickly.
    pub fn on_tick<F>(&self, callback: F)
    where
        F: FnMut() + Send + 'static,
    {
        let mut guard = match self.callback.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Box::new(callback));
    }

    /// Begin emitting ticks; the first tick fires immediately
    ///
    /// No-op if already running.
    pub fn start(&mut self) -> Result<(), AudioError> {
        if self.running {
            return Ok(());
        }
        self.send(TickCommand::Start)?;
        self.running = true;
        Ok(())
    }

    /// Halt emission. No-op if already stopped or destroyed.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.running = false;
        if let Err(err) = self.send(TickCommand::Stop) {
            log::warn!("[TickSource] Stop not delivered: {}", err);
        }
    }

    /// Change the tick period
    ///
    /// While running, the worker restarts its period from now.
    pub fn configure(&mut self, period: Duration) -> Result<(), AudioError> {
        let period = period.max(MIN_TICK_PERIOD);
        self.send(TickCommand::Configure(period))?;
        self.period = period;
        Ok(())
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_destroyed(&self) -> bool {
        self.commands.is_none()
    }

    /// Shut the worker down and join it. Irrevocable and idempotent.
    pub fn destroy(&mut self) {
        self.running = false;
        if let Some(tx) = self.commands.take() {
            let _ = tx.send(TickCommand::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("[TickSource] Worker thread panicked before shutdown");
            }
            log::debug!("[TickSource] Worker joined");
        }
        if let Ok(mut guard) = self.callback.lock() {
            guard.take();
        }
    }

    fn send(&self, command: TickCommand) -> Result<(), AudioError> {
        let tx = self.commands.as_ref().ok_or(AudioError::Destroyed)?;
        tx.send(command).map_err(|_| AudioError::TickSourceFailed {
            reason: "worker thread exited".to_string(),
        })
    }
}

impl Drop for TickSource {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn run_worker(commands: Receiver<TickCommand>, mut period: Duration, callback: SharedCallback) {
    log::debug!("[TickSource] Worker started ({:?} period)", period);
    let mut next_tick: Option<Instant> = None;

    loop {
        let command = match next_tick {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    emit(&callback);
                    let mut following = deadline + period;
                    let after_emit = Instant::now();
                    if following <= after_emit {
                        // Fell behind by a whole period; re-base instead of bursting.
                        following = after_emit + period;
                    }
                    next_tick = Some(following);
                    continue;
                }
                match commands.recv_timeout(deadline - now) {
                    Ok(command) => command,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match commands.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        match command {
            TickCommand::Start => {
                if next_tick.is_none() {
                    next_tick = Some(Instant::now());
                }
            }
            TickCommand::Stop => next_tick = None,
            TickCommand::Configure(new_period) => {
                period = new_period;
                if next_tick.is_some() {
                    next_tick = Some(Instant::now() + period);
                }
            }
            TickCommand::Shutdown => break,
        }
    }

    log::debug!("[TickSource] Worker exiting");
}

fn emit(callback: &SharedCallback) {
    let mut guard = match callback.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(callback) = guard.as_mut() {
        callback();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_source(period_ms: u64) -> (TickSource, Arc<AtomicUsize>) {
        let source = TickSource::new(Duration::from_millis(period_ms)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        source.on_tick(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (source, count)
    }

    #[test]
    fn test_no_ticks_before_start() {
        let (_source, count) = counting_source(5);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ticks_while_running() {
        let (mut source, count) = counting_source(10);
        source.start().unwrap();
        thread::sleep(Duration::from_millis(200));
        source.stop();

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 5, "expected at least 5 ticks in 200ms, got {}", ticks);
        assert!(ticks <= 30, "expected at most 30 ticks in 200ms, got {}", ticks);
    }

    #[test]
    fn test_first_tick_is_immediate() {
        let (mut source, count) = counting_source(1000);
        source.start().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(
            count.load(Ordering::SeqCst),
            1,
            "start() should emit one tick right away"
        );
    }

    #[test]
    fn test_stop_halts_emission() {
        let (mut source, count) = counting_source(5);
        source.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        source.stop();
        thread::sleep(Duration::from_millis(20));

        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
        assert!(!source.is_running());
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let (mut source, _count) = counting_source(5);
        source.stop();
        assert!(!source.is_running());

        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_running());

        source.stop();
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn test_configure_while_running_changes_rate() {
        let (mut source, count) = counting_source(1000);
        source.start().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        source.configure(Duration::from_millis(10)).unwrap();
        assert_eq!(source.period(), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(200));

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 5, "reconfigured source should tick faster, got {}", ticks);
        assert!(source.is_running());
    }

    #[test]
    fn test_destroy_is_irrevocable() {
        let (mut source, count) = counting_source(5);
        source.start().unwrap();
        source.destroy();
        let after_destroy = count.load(Ordering::SeqCst);

        assert!(source.is_destroyed());
        assert_eq!(source.start(), Err(AudioError::Destroyed));
        assert_eq!(
            source.configure(Duration::from_millis(5)),
            Err(AudioError::Destroyed)
        );

        thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), after_destroy);

        // second destroy is a no-op
        source.destroy();
    }

    #[test]
    fn test_slow_callback_does_not_cause_burst() {
        const SLOW_TICKS: usize = 8;
        let mut source = TickSource::new(Duration::from_millis(10)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        source.on_tick(move || {
            // Each of the first ticks overruns the period by 30ms
            if counter.fetch_add(1, Ordering::SeqCst) < SLOW_TICKS {
                thread::sleep(Duration::from_millis(40));
            }
        });

        source.start().unwrap();
        thread::sleep(Duration::from_millis(500));
        source.stop();

        // ~320ms of slow ticks leaves ~180ms at 10ms, so about 26 in total.
        // Catching up on the missed deadlines would push this towards 50.
        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= SLOW_TICKS, "expected the slow ticks to finish, got {}", ticks);
        assert!(ticks <= 36, "worker burst to catch up: {} ticks in 500ms", ticks);
    }

    #[test]
    fn test_period_is_clamped() {
        let source = TickSource::new(Duration::ZERO).unwrap();
        assert_eq!(source.period(), MIN_TICK_PERIOD);
    }

    #[test]
    fn test_callback_can_be_replaced() {
        let (mut source, first) = counting_source(5);
        let second = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&second);
        source.on_tick(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        source.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        source.stop();

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert!(second.load(Ordering::SeqCst) >= 1);
    }
}
