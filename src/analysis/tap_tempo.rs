//! TapTempoEstimator - BPM estimation from manual taps
//!
//! Every tap after the first contributes one inter-tap interval. Statistics are
//! recomputed over all intervals of the session (no sliding window):
//! - `bpm`: 60000 / mean interval (smoothed reading)
//! - `raw_tempo_bpm`: 60000 / latest interval, two decimals (instantaneous reading)
//! - `avg_deviation_ms`: mean absolute deviation from the mean interval
//!
//! The beat index cycles through a fixed four-dot display, independent of any
//! metronome time signature.

use std::time::{Duration, Instant};

use serde::Serialize;

/// Size of the visual tap cycle
pub const TAP_BEAT_CYCLE: i32 = 4;

/// State of the estimator after a tap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TapSnapshot {
    pub bpm: f64,
    /// Position in the four-beat cycle; -1 before the first tap
    pub beat_index: i32,
    pub tap_count: usize,
    pub last_interval_ms: Option<f64>,
    pub avg_interval_ms: Option<f64>,
    pub avg_deviation_ms: Option<f64>,
    pub raw_tempo_bpm: Option<String>,
    pub first_tap_ms: Option<f64>,
    pub last_tap_ms: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TapStats {
    bpm: f64,
    last_interval_ms: Option<f64>,
    avg_interval_ms: Option<f64>,
    avg_deviation_ms: Option<f64>,
    raw_tempo_bpm: Option<String>,
}

impl TapStats {
    fn from_intervals(intervals: &[f64]) -> Option<Self> {
        let &latest = intervals.last()?;
        let avg = intervals.iter().sum::<f64>() / intervals.len() as f64;
        let deviation =
            intervals.iter().map(|interval| (interval - avg).abs()).sum::<f64>() / intervals.len() as f64;

        Some(Self {
            bpm: 60_000.0 / avg,
            last_interval_ms: Some(latest),
            avg_interval_ms: Some(avg),
            avg_deviation_ms: Some(deviation),
            raw_tempo_bpm: Some(format!("{:.2}", 60_000.0 / latest)),
        })
    }
}

/// Running tap-tempo statistics for one tapping session
#[derive(Debug, Clone)]
pub struct TapTempoEstimator {
    origin: Instant,
    auto_reset: Option<Duration>,
    taps: Vec<f64>,
    intervals: Vec<f64>,
    last_tap_ms: Option<f64>,
    beat_index: i32,
    stats: TapStats,
    discarded_intervals: usize,
}

impl TapTempoEstimator {
    /// Estimator without automatic session reset
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            auto_reset: None,
            taps: Vec::new(),
            intervals: Vec::new(),
            last_tap_ms: None,
            beat_index: -1,
            stats: TapStats::default(),
            discarded_intervals: 0,
        }
    }

    /// Estimator that starts a new session when taps are further apart than `timeout`
    pub fn with_auto_reset(timeout: Duration) -> Self {
        Self {
            auto_reset: Some(timeout),
            ..Self::new()
        }
    }

    pub fn auto_reset(&self) -> Option<Duration> {
        self.auto_reset
    }

    pub fn set_auto_reset(&mut self, timeout: Option<Duration>) {
        self.auto_reset = timeout;
    }

    /// Record a tap at the current monotonic time
    pub fn tap(&mut self) -> TapSnapshot {
        let now_ms = self.origin.elapsed().as_secs_f64() * 1000.0;
        self.tap_at(now_ms)
    }

    /// Record a tap at `timestamp_ms` on the caller's millisecond clock
    ///
    /// A timestamp not after the previous tap yields no interval: the tap is
    /// still counted and the beat index still advances. A non-finite
    /// timestamp is ignored.
    pub fn tap_at(&mut self, timestamp_ms: f64) -> TapSnapshot {
        if !timestamp_ms.is_finite() {
            log::warn!("[TapTempo] Ignoring tap at non-finite timestamp {}", timestamp_ms);
            return self.snapshot();
        }

        if let (Some(timeout), Some(last)) = (self.auto_reset, self.last_tap_ms) {
            let gap_ms = timestamp_ms - last;
            if gap_ms > timeout.as_secs_f64() * 1000.0 {
                log::debug!(
                    "[TapTempo] {:.0} ms since last tap exceeds {:?}, starting new session",
                    gap_ms,
                    timeout
                );
                self.reset();
            }
        }

        if let Some(last) = self.last_tap_ms {
            let interval = timestamp_ms - last;
            if interval > 0.0 && interval.is_finite() {
                self.intervals.push(interval);
                if let Some(stats) = TapStats::from_intervals(&self.intervals) {
                    self.stats = stats;
                }
            } else {
                self.discarded_intervals += 1;
                log::warn!(
                    "[TapTempo] Discarding non-positive interval {:.3} ms (tap at {:.3} ms after {:.3} ms)",
                    interval,
                    timestamp_ms,
                    last
                );
            }
        }

        self.last_tap_ms = Some(timestamp_ms);
        self.taps.push(timestamp_ms);
        self.beat_index = (self.beat_index + 1) % TAP_BEAT_CYCLE;

        self.snapshot()
    }

    /// Clear the session back to the empty baseline
    pub fn reset(&mut self) {
        self.taps.clear();
        self.intervals.clear();
        self.last_tap_ms = None;
        self.beat_index = -1;
        self.stats = TapStats::default();
        self.discarded_intervals = 0;
    }

    pub fn snapshot(&self) -> TapSnapshot {
        TapSnapshot {
            bpm: self.stats.bpm,
            beat_index: self.beat_index,
            tap_count: self.taps.len(),
            last_interval_ms: self.stats.last_interval_ms,
            avg_interval_ms: self.stats.avg_interval_ms,
            avg_deviation_ms: self.stats.avg_deviation_ms,
            raw_tempo_bpm: self.stats.raw_tempo_bpm.clone(),
            first_tap_ms: self.taps.first().copied(),
            last_tap_ms: self.taps.last().copied(),
        }
    }

    pub fn tap_count(&self) -> usize {
        self.taps.len()
    }

    pub fn intervals(&self) -> &[f64] {
        &self.intervals
    }

    /// Intervals dropped because the clock did not move forward
    pub fn discarded_intervals(&self) -> usize {
        self.discarded_intervals
    }

    /// Time between the first and last tap of the session
    ///
    /// `None` before the first tap, or if the span does not fit a `Duration`.
    pub fn session_duration(&self) -> Option<Duration> {
        let (first, last) = (self.taps.first()?, self.taps.last()?);
        Duration::try_from_secs_f64(((last - first) / 1000.0).max(0.0)).ok()
    }
}

impl Default for TapTempoEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_baseline() -> TapSnapshot {
        TapSnapshot {
            bpm: 0.0,
            beat_index: -1,
            tap_count: 0,
            last_interval_ms: None,
            avg_interval_ms: None,
            avg_deviation_ms: None,
            raw_tempo_bpm: None,
            first_tap_ms: None,
            last_tap_ms: None,
        }
    }

    #[test]
    fn test_first_tap_has_no_interval() {
        let mut estimator = TapTempoEstimator::new();
        let snapshot = estimator.tap_at(1_000.0);

        assert_eq!(snapshot.bpm, 0.0);
        assert_eq!(snapshot.tap_count, 1);
        assert_eq!(snapshot.beat_index, 0);
        assert_eq!(snapshot.last_interval_ms, None);
        assert_eq!(snapshot.raw_tempo_bpm, None);
        assert_eq!(snapshot.first_tap_ms, Some(1_000.0));
        assert_eq!(snapshot.last_tap_ms, Some(1_000.0));
    }

    #[test]
    fn test_two_taps_give_120_bpm() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(0.0);
        let snapshot = estimator.tap_at(500.0);

        assert_eq!(snapshot.bpm, 120.0);
        assert_eq!(snapshot.raw_tempo_bpm.as_deref(), Some("120.00"));
        assert_eq!(snapshot.avg_interval_ms, Some(500.0));
        assert_eq!(snapshot.avg_deviation_ms, Some(0.0));
        assert_eq!(snapshot.last_interval_ms, Some(500.0));
        assert_eq!(snapshot.beat_index, 1);
    }

    #[test]
    fn test_three_tap_dispersion() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(0.0);
        estimator.tap_at(500.0);
        let snapshot = estimator.tap_at(1_100.0);

        assert_eq!(snapshot.avg_interval_ms, Some(550.0));
        assert_eq!(snapshot.avg_deviation_ms, Some(50.0));
        assert!((snapshot.bpm - 109.0909).abs() < 1e-3);
        assert_eq!(snapshot.raw_tempo_bpm.as_deref(), Some("100.00"));
        assert_eq!(snapshot.first_tap_ms, Some(0.0));
        assert_eq!(snapshot.last_tap_ms, Some(1_100.0));
    }

    #[test]
    fn test_beat_index_cycles_through_four() {
        let mut estimator = TapTempoEstimator::new();
        let indices: Vec<i32> = (0..9)
            .map(|i| estimator.tap_at(i as f64 * 400.0).beat_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut estimator = TapTempoEstimator::new();
        estimator.reset();
        assert_eq!(estimator.snapshot(), empty_baseline());

        estimator.tap_at(0.0);
        estimator.tap_at(450.0);
        estimator.reset();
        let first = estimator.snapshot();
        estimator.reset();
        assert_eq!(first, empty_baseline());
        assert_eq!(estimator.snapshot(), first);
        assert!(estimator.intervals().is_empty());
    }

    #[test]
    fn test_non_positive_interval_is_discarded() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(1_000.0);
        estimator.tap_at(1_500.0);

        // Clock stepped backwards
        let snapshot = estimator.tap_at(1_200.0);
        assert_eq!(snapshot.tap_count, 3);
        assert_eq!(snapshot.beat_index, 2);
        assert_eq!(snapshot.bpm, 120.0);
        assert_eq!(estimator.discarded_intervals(), 1);
        assert_eq!(estimator.intervals(), &[500.0]);

        // Duplicate timestamp
        estimator.tap_at(1_200.0);
        assert_eq!(estimator.discarded_intervals(), 2);

        // Measuring resumes from the latest tap
        let snapshot = estimator.tap_at(1_800.0);
        assert_eq!(snapshot.last_interval_ms, Some(600.0));
        assert_eq!(snapshot.avg_interval_ms, Some(550.0));
    }

    #[test]
    fn test_auto_reset_after_long_gap() {
        let mut estimator = TapTempoEstimator::with_auto_reset(Duration::from_secs(3));
        estimator.tap_at(0.0);
        estimator.tap_at(500.0);

        let snapshot = estimator.tap_at(4_000.0);
        assert_eq!(snapshot.tap_count, 1);
        assert_eq!(snapshot.beat_index, 0);
        assert_eq!(snapshot.bpm, 0.0);
        assert_eq!(snapshot.first_tap_ms, Some(4_000.0));

        // A gap just inside the timeout keeps the session
        let snapshot = estimator.tap_at(6_900.0);
        assert_eq!(snapshot.tap_count, 2);
        assert_eq!(snapshot.last_interval_ms, Some(2_900.0));
    }

    #[test]
    fn test_without_auto_reset_long_gaps_count() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(0.0);
        let snapshot = estimator.tap_at(10_000.0);
        assert_eq!(snapshot.tap_count, 2);
        assert_eq!(snapshot.bpm, 6.0);
    }

    #[test]
    fn test_session_duration() {
        let mut estimator = TapTempoEstimator::new();
        assert_eq!(estimator.session_duration(), None);

        estimator.tap_at(250.0);
        estimator.tap_at(1_250.0);
        assert_eq!(estimator.session_duration(), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_non_finite_timestamps_are_ignored() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(0.0);
        estimator.tap_at(500.0);

        for timestamp in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let snapshot = estimator.tap_at(timestamp);
            assert_eq!(snapshot.tap_count, 2);
            assert_eq!(snapshot.beat_index, 1);
            assert_eq!(snapshot.last_tap_ms, Some(500.0));
        }
        assert_eq!(
            estimator.session_duration(),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_session_duration_out_of_range_is_none() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(-f64::MAX);
        estimator.tap_at(f64::MAX);

        assert_eq!(estimator.tap_count(), 2);
        assert_eq!(estimator.session_duration(), None);
    }

    #[test]
    fn test_tap_uses_monotonic_clock() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap();
        std::thread::sleep(Duration::from_millis(20));
        let snapshot = estimator.tap();

        assert_eq!(snapshot.tap_count, 2);
        let interval = snapshot.last_interval_ms.unwrap();
        assert!(interval >= 20.0, "interval {} shorter than the sleep", interval);
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let mut estimator = TapTempoEstimator::new();
        estimator.tap_at(0.0);
        estimator.tap_at(500.0);

        let json = serde_json::to_value(estimator.snapshot()).unwrap();
        assert_eq!(json["raw_tempo_bpm"], "120.00");
        assert_eq!(json["tap_count"], 2);
        assert_eq!(json["beat_index"], 1);
    }
}
