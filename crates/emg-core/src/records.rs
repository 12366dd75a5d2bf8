//! Processed records: what gets recorded and broadcast

use crate::emg_types::Orientation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample after the filter chain and posture fusion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSample {
    pub received_at: DateTime<Utc>,
    pub raw1: f64,
    pub raw2: f64,
    pub filtered1: f64,
    pub filtered2: f64,
    pub orientation: Option<Orientation>,
    /// Absent when the sample had no orientation or posture is uncalibrated
    pub posture_score: Option<f64>,
}

/// Where a statistics window was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsSource {
    /// Computed by the hub's aggregator over filtered samples
    Aggregator,
    /// Forwarded from a device `STATS` line
    Device,
}

/// Periodic summary of one window of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatsWindow {
    pub rms1: f64,
    pub rms2: f64,
    pub mean1: f64,
    pub mean2: f64,
    /// Signed energy ratio in [-1, 1]
    pub imbalance: f64,
    pub posture_score: Option<f64>,
    pub pitch: Option<f64>,
    pub roll: Option<f64>,
    pub window_end: DateTime<Utc>,
    pub sample_count: usize,
    pub source: StatsSource,
}

/// Payload of a session record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKind {
    Sample(ProcessedSample),
    Stats(StatsWindow),
}

/// Entry of the session log, stamped when it was captured
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub captured_at: DateTime<Utc>,
    pub kind: RecordKind,
}

