//! Signal chain: parse -> filter -> posture fuse -> aggregate
//!
//! The chain is synchronous and does no I/O. One instance exists per hub and
//! is owned by whichever task drives the device session, so every mutation
//! (samples, filter updates, calibration) is serialized by construction.

use crate::config::ProcessingConfig;
use crate::filters::{FilterConfig, FilterPipeline, FilterUpdate};
use crate::posture::{PostureBaseline, PostureEstimator};
use crate::stats::{self, StatsAggregator};
use chrono::{DateTime, Utc};
use emg_core::{
    parse_line, DeviceStats, EmgResult, ParsedFrame, ProcessedSample, RecordKind, SampleFrame,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Malformed frames logged at `warn` before switching to `debug`
const MALFORMED_WARN_LIMIT: u64 = 10;

/// Per-session processing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCounters {
    pub samples_processed: u64,
    pub windows_emitted: u64,
    pub device_stats: u64,
    pub malformed_frames: u64,
}

/// Stateful processing path for one device session
pub struct SignalChain {
    filters: FilterPipeline,
    posture: PostureEstimator,
    aggregator: StatsAggregator,
    counters: ChainCounters,
    orientation_available: bool,
}

impl SignalChain {
    /// Create a chain from a validated configuration
    pub fn new(config: &ProcessingConfig) -> EmgResult<Self> {
        config.validate()?;

        let filters = FilterPipeline::new(config)?;
        let posture = PostureEstimator::new(config.posture_sensitivity);
        let aggregator = StatsAggregator::new(config.stats_window_samples);
        info!(
            window = aggregator.window_size(),
            sensitivity = posture.sensitivity(),
            latency_samples = filters.latency_estimate(),
            "Signal chain ready"
        );

        Ok(Self {
            filters,
            posture,
            aggregator,
            counters: ChainCounters::default(),
            orientation_available: false,
        })
    }

    /// Decode and process one device line
    ///
    /// Returns the records the line produced, in emission order. A malformed
    /// line is counted and returned as an error; chain state is untouched.
    pub fn process_line(&mut self, line: &str, received_at: DateTime<Utc>) -> EmgResult<Vec<RecordKind>> {
        match parse_line(line, received_at) {
            Ok(frame) => Ok(self.process_frame(frame)),
            Err(e) => {
                self.counters.malformed_frames += 1;
                let count = self.counters.malformed_frames;
                if count <= MALFORMED_WARN_LIMIT {
                    warn!(count, "Dropping malformed frame: {}", e);
                } else {
                    debug!(count, "Dropping malformed frame: {}", e);
                }
                Err(e)
            }
        }
    }

    /// Process an already decoded frame
    pub fn process_frame(&mut self, frame: ParsedFrame) -> Vec<RecordKind> {
        self.orientation_available = frame.orientation().is_some();

        match frame {
            ParsedFrame::Sample(sample) => self.process_sample(&sample),
            ParsedFrame::Stats(device) => vec![self.process_device_stats(&device)],
        }
    }

    fn process_sample(&mut self, frame: &SampleFrame) -> Vec<RecordKind> {
        let (filtered1, filtered2) = self.filters.process(frame.channel1, frame.channel2);
        let posture_score = frame.orientation.and_then(|o| self.posture.fuse(o));

        let processed = ProcessedSample {
            received_at: frame.received_at,
            raw1: frame.channel1,
            raw2: frame.channel2,
            filtered1,
            filtered2,
            orientation: frame.orientation,
            posture_score,
        };
        self.counters.samples_processed += 1;

        let mut records = vec![RecordKind::Sample(processed)];
        if let Some(window) = self.aggregator.push(&processed) {
            self.counters.windows_emitted += 1;
            records.push(RecordKind::Stats(window));
        }
        records
    }

    fn process_device_stats(&mut self, device: &DeviceStats) -> RecordKind {
        let posture_score = device.orientation.and_then(|o| self.posture.fuse(o));
        self.counters.device_stats += 1;
        RecordKind::Stats(stats::from_device(device, posture_score))
    }

    /// Apply new filter settings; rejected settings leave the chain unchanged
    pub fn update_filter(&mut self, config: FilterConfig) -> EmgResult<FilterUpdate> {
        self.filters.apply_config(config).map_err(|e| {
            warn!("Rejected filter settings: {}", e);
            e
        })
    }

    /// Capture the latest orientation as the posture baseline
    pub fn calibrate(&mut self, now: DateTime<Utc>) -> EmgResult<PostureBaseline> {
        self.posture.calibrate(now).map_err(|e| {
            warn!("Calibration refused: {}", e);
            e
        })
    }

    /// Start a fresh session, keeping the filter settings
    pub fn reset_session(&mut self) {
        let pending = self.aggregator.pending();
        if pending > 0 {
            debug!(pending, "Discarding partial statistics window");
        }
        self.filters.reset();
        self.aggregator.reset();
        self.posture.reset();
        self.counters = ChainCounters::default();
        self.orientation_available = false;
        info!(filter = ?self.filters.config(), "Signal chain reset for new session");
    }

    pub fn filter_config(&self) -> FilterConfig {
        self.filters.config()
    }

    pub fn baseline(&self) -> PostureBaseline {
        self.posture.baseline()
    }

    pub fn counters(&self) -> ChainCounters {
        self.counters
    }

    /// Whether the most recent frame carried orientation
    pub fn orientation_available(&self) -> bool {
        self.orientation_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emg_core::{EmgError, StatsSource};

    fn chain() -> SignalChain {
        SignalChain::new(&ProcessingConfig::default()).unwrap()
    }

    fn small_window_chain(window: usize) -> SignalChain {
        let config = ProcessingConfig {
            stats_window_samples: window,
            ..ProcessingConfig::default()
        };
        SignalChain::new(&config).unwrap()
    }

    #[test]
    fn test_sample_line_produces_sample_record() {
        let mut chain = chain();
        let records = chain.process_line("2048,2100", Utc::now()).unwrap();
        assert_eq!(records.len(), 1);
        match records[0] {
            RecordKind::Sample(s) => {
                assert_eq!(s.raw1, 2048.0);
                assert_eq!(s.raw2, 2100.0);
                assert!(s.filtered1.is_finite());
                assert!(s.orientation.is_none());
                assert!(s.posture_score.is_none());
            }
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(chain.counters().samples_processed, 1);
        assert!(!chain.orientation_available());
    }

    #[test]
    fn test_window_follows_its_last_sample() {
        let mut chain = small_window_chain(3);
        let mut kinds = Vec::new();
        for _ in 0..6 {
            for record in chain.process_line("2048,2048,1.0,2.0", Utc::now()).unwrap() {
                kinds.push(matches!(record, RecordKind::Stats(_)));
            }
        }
        assert_eq!(kinds, vec![false, false, false, true, false, false, false, true]);
        assert_eq!(chain.counters().windows_emitted, 2);
        assert!(chain.orientation_available());
    }

    #[test]
    fn test_malformed_line_counted_and_chain_continues() {
        let mut chain = chain();
        assert!(matches!(
            chain.process_line("garbage", Utc::now()),
            Err(EmgError::MalformedFrame { .. })
        ));
        assert!(chain.process_line("1,2,3", Utc::now()).is_err());
        assert!(chain.process_line("1,2", Utc::now()).is_ok());

        let counters = chain.counters();
        assert_eq!(counters.malformed_frames, 2);
        assert_eq!(counters.samples_processed, 1);
    }

    #[test]
    fn test_calibration_flow() {
        let mut chain = chain();
        chain.process_line("2048,2048", Utc::now()).unwrap();
        assert_eq!(chain.calibrate(Utc::now()), Err(EmgError::CalibrationUnavailable));

        chain.process_line("2048,2048,3.2,-1.1", Utc::now()).unwrap();
        assert!(chain.calibrate(Utc::now()).unwrap().is_calibrated());

        let records = chain.process_line("2048,2048,3.2,-1.1", Utc::now()).unwrap();
        match records[0] {
            RecordKind::Sample(s) => assert_eq!(s.posture_score, Some(100.0)),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_device_stats_forwarded_and_scored() {
        let mut chain = chain();
        let records = chain.process_line("STATS,10,5,0.1,0.2,0.333,2.0,0.0", Utc::now()).unwrap();
        match records[0] {
            RecordKind::Stats(w) => {
                assert_eq!(w.source, StatsSource::Device);
                assert_eq!(w.rms1, 10.0);
                assert_eq!(w.pitch, Some(2.0));
                assert!(w.posture_score.is_none());
            }
            other => panic!("unexpected record {other:?}"),
        }

        // Device orientation counts as an observation for calibration
        chain.calibrate(Utc::now()).unwrap();
        let records = chain.process_line("STATS,10,5,0.1,0.2,0.333,2.0,0.0", Utc::now()).unwrap();
        match records[0] {
            RecordKind::Stats(w) => assert_eq!(w.posture_score, Some(100.0)),
            other => panic!("unexpected record {other:?}"),
        }
        assert_eq!(chain.counters().device_stats, 2);
        assert_eq!(chain.counters().samples_processed, 0);
    }

    #[test]
    fn test_rejected_filter_update_keeps_settings() {
        let mut chain = chain();
        let before = chain.filter_config();
        let bad = FilterConfig {
            notch_enabled: false,
            low_pass_cutoff: 10.0,
            high_pass_cutoff: 20.0,
        };
        assert!(chain.update_filter(bad).is_err());
        assert_eq!(chain.filter_config(), before);
    }

    #[test]
    fn test_reset_session_keeps_filter_config() {
        let mut chain = small_window_chain(10);
        let custom = FilterConfig {
            notch_enabled: false,
            low_pass_cutoff: 400.0,
            high_pass_cutoff: 30.0,
        };
        chain.update_filter(custom).unwrap();
        for _ in 0..5 {
            chain.process_line("2048,2048,1.0,1.0", Utc::now()).unwrap();
        }
        chain.calibrate(Utc::now()).unwrap();

        chain.reset_session();
        assert_eq!(chain.filter_config(), custom);
        assert!(!chain.baseline().is_calibrated());
        assert_eq!(chain.counters(), ChainCounters::default());
        assert!(chain.calibrate(Utc::now()).is_err());

        // Partial window from before the reset is gone
        let mut windows = 0;
        for _ in 0..10 {
            windows += chain
                .process_line("0,0", Utc::now())
                .unwrap()
                .iter()
                .filter(|r| matches!(r, RecordKind::Stats(_)))
                .count();
        }
        assert_eq!(windows, 1);
    }
}
