//! Windowed statistics over the filtered signal
//!
//! Windows are counted in samples, not wall-clock time, so a window always
//! holds the same amount of signal regardless of network jitter.

use chrono::{DateTime, Utc};
use emg_core::{DeviceStats, Orientation, ProcessedSample, StatsSource, StatsWindow};
use serde::{Deserialize, Serialize};

/// Basic statistics for one channel of a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub mean: f64,
    pub rms: f64,
}

impl ChannelStats {
    pub fn calculate(data: &[f64]) -> Self {
        if data.is_empty() {
            return Self { mean: 0.0, rms: 0.0 };
        }

        let n = data.len() as f64;
        let mean = data.iter().sum::<f64>() / n;
        let sum_sq: f64 = data.iter().map(|x| x * x).sum();
        let rms = (sum_sq / n).sqrt();

        Self { mean, rms }
    }
}

/// Signed energy ratio between the channels, in [-1, 1]
///
/// Positive when channel 1 carries more energy. Zero when both are silent.
pub fn imbalance(rms1: f64, rms2: f64) -> f64 {
    let total = rms1 + rms2;
    if total == 0.0 {
        return 0.0;
    }
    (rms1 - rms2) / total
}

/// Accumulates processed samples into fixed-size windows
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    window_size: usize,
    channel1: Vec<f64>,
    channel2: Vec<f64>,
    // Latest orientation in the current window and its score
    orientation: Option<Orientation>,
    posture_score: Option<f64>,
}

impl StatsAggregator {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            channel1: Vec::with_capacity(window_size),
            channel2: Vec::with_capacity(window_size),
            orientation: None,
            posture_score: None,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Samples in the partially filled window
    pub fn pending(&self) -> usize {
        self.channel1.len()
    }

    /// Add one processed sample; returns a window when it fills up
    pub fn push(&mut self, sample: &ProcessedSample) -> Option<StatsWindow> {
        self.channel1.push(sample.filtered1);
        self.channel2.push(sample.filtered2);

        if let Some(orientation) = sample.orientation {
            self.orientation = Some(orientation);
            self.posture_score = sample.posture_score;
        }

        if self.channel1.len() < self.window_size {
            return None;
        }

        let window = self.summarize(sample.received_at);
        self.reset();
        Some(window)
    }

    /// Discard the partially filled window
    pub fn reset(&mut self) {
        self.channel1.clear();
        self.channel2.clear();
        self.orientation = None;
        self.posture_score = None;
    }

    fn summarize(&self, window_end: DateTime<Utc>) -> StatsWindow {
        let ch1 = ChannelStats::calculate(&self.channel1);
        let ch2 = ChannelStats::calculate(&self.channel2);

        StatsWindow {
            rms1: ch1.rms,
            rms2: ch2.rms,
            mean1: ch1.mean,
            mean2: ch2.mean,
            imbalance: imbalance(ch1.rms, ch2.rms),
            posture_score: self.posture_score,
            pitch: self.orientation.map(|o| o.pitch),
            roll: self.orientation.map(|o| o.roll),
            window_end,
            sample_count: self.channel1.len(),
            source: StatsSource::Aggregator,
        }
    }
}

/// Wrap device-computed statistics as a window record
pub fn from_device(stats: &DeviceStats, posture_score: Option<f64>) -> StatsWindow {
    StatsWindow {
        rms1: stats.rms1,
        rms2: stats.rms2,
        mean1: stats.mean1,
        mean2: stats.mean2,
        imbalance: stats.imbalance,
        posture_score,
        pitch: stats.orientation.map(|o| o.pitch),
        roll: stats.orientation.map(|o| o.roll),
        window_end: stats.received_at,
        sample_count: 0,
        source: StatsSource::Device,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(f1: f64, f2: f64, orientation: Option<Orientation>, score: Option<f64>) -> ProcessedSample {
        ProcessedSample {
            received_at: Utc::now(),
            raw1: f1,
            raw2: f2,
            filtered1: f1,
            filtered2: f2,
            orientation,
            posture_score: score,
        }
    }

    #[test]
    fn test_channel_stats_known_sequence() {
        let stats = ChannelStats::calculate(&[3.0, -3.0, 3.0, -3.0]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.rms, 3.0);

        let stats = ChannelStats::calculate(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.rms - 7.5f64.sqrt()).abs() < 1e-12);

        assert_eq!(ChannelStats::calculate(&[]), ChannelStats { mean: 0.0, rms: 0.0 });
    }

    #[test]
    fn test_imbalance_properties() {
        assert_eq!(imbalance(0.0, 0.0), 0.0);
        assert_eq!(imbalance(5.0, 5.0), 0.0);
        assert_eq!(imbalance(1.0, 0.0), 1.0);
        assert_eq!(imbalance(0.0, 1.0), -1.0);

        for (a, b) in [(3.0, 1.0), (0.25, 7.5), (120.0, 119.0)] {
            assert_eq!(imbalance(a, b), -imbalance(b, a));
            assert!(imbalance(a, b).abs() <= 1.0);
        }
    }

    #[test]
    fn test_window_emitted_every_w_samples() {
        let mut aggregator = StatsAggregator::new(4);
        let mut windows = Vec::new();
        for i in 0..10 {
            let value = if i % 2 == 0 { 2.0 } else { -2.0 };
            if let Some(w) = aggregator.push(&sample(value, 0.0, None, None)) {
                windows.push(w);
            }
        }

        assert_eq!(windows.len(), 2);
        assert_eq!(aggregator.window_size(), 4);
        assert_eq!(aggregator.pending(), 2);
        for w in &windows {
            assert_eq!(w.sample_count, 4);
            assert_eq!(w.rms1, 2.0);
            assert_eq!(w.mean1, 0.0);
            assert_eq!(w.rms2, 0.0);
            assert_eq!(w.imbalance, 1.0);
            assert_eq!(w.source, StatsSource::Aggregator);
            assert!(w.pitch.is_none() && w.roll.is_none() && w.posture_score.is_none());
        }
    }

    #[test]
    fn test_window_uses_latest_orientation() {
        let mut aggregator = StatsAggregator::new(3);
        aggregator.push(&sample(1.0, 1.0, Some(Orientation::new(1.0, 1.0)), Some(96.0)));
        aggregator.push(&sample(1.0, 1.0, Some(Orientation::new(5.0, -2.0)), Some(80.0)));
        let window = aggregator.push(&sample(1.0, 1.0, None, None)).unwrap();

        assert_eq!(window.pitch, Some(5.0));
        assert_eq!(window.roll, Some(-2.0));
        assert_eq!(window.posture_score, Some(80.0));
        assert_eq!(window.imbalance, 0.0);
    }

    #[test]
    fn test_uncalibrated_window_keeps_orientation_without_score() {
        let mut aggregator = StatsAggregator::new(1);
        let window = aggregator
            .push(&sample(0.0, 0.0, Some(Orientation::new(4.0, 2.0)), None))
            .unwrap();
        assert_eq!(window.pitch, Some(4.0));
        assert!(window.posture_score.is_none());
        assert_eq!(window.imbalance, 0.0);
    }

    #[test]
    fn test_reset_discards_partial_window() {
        let mut aggregator = StatsAggregator::new(3);
        aggregator.push(&sample(100.0, 100.0, Some(Orientation::new(1.0, 1.0)), Some(50.0)));
        aggregator.push(&sample(100.0, 100.0, None, None));
        aggregator.reset();
        assert_eq!(aggregator.pending(), 0);

        aggregator.push(&sample(1.0, 1.0, None, None));
        aggregator.push(&sample(1.0, 1.0, None, None));
        let window = aggregator.push(&sample(1.0, 1.0, None, None)).unwrap();
        assert_eq!(window.rms1, 1.0);
        assert!(window.pitch.is_none());
    }

    #[test]
    fn test_from_device() {
        let stats = DeviceStats {
            rms1: 12.0,
            rms2: 8.0,
            mean1: 0.5,
            mean2: -0.5,
            imbalance: 0.2,
            orientation: Some(Orientation::new(7.0, 1.0)),
            received_at: Utc::now(),
        };
        let window = from_device(&stats, Some(64.0));
        assert_eq!(window.source, StatsSource::Device);
        assert_eq!(window.rms1, 12.0);
        assert_eq!(window.imbalance, 0.2);
        assert_eq!(window.pitch, Some(7.0));
        assert_eq!(window.posture_score, Some(64.0));
        assert_eq!(window.window_end, stats.received_at);
    }
}
