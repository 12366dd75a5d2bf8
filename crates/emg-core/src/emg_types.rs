//! EMG frame types decoded from the sensing device

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device orientation reported alongside the EMG channels (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    /// Forward-backward tilt
    pub pitch: f64,
    /// Side-to-side tilt
    pub roll: f64,
}

impl Orientation {
    pub fn new(pitch: f64, roll: f64) -> Self {
        Self { pitch, roll }
    }
}

/// One raw two-channel sample, immutable once parsed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleFrame {
    /// Raw amplitude of channel 1 (ADC counts)
    pub channel1: f64,
    /// Raw amplitude of channel 2 (ADC counts)
    pub channel2: f64,
    /// Present only for the 4-field variant
    pub orientation: Option<Orientation>,
    /// Arrival time at the ingest endpoint
    pub received_at: DateTime<Utc>,
}

impl SampleFrame {
    pub fn new(channel1: f64, channel2: f64, orientation: Option<Orientation>, received_at: DateTime<Utc>) -> Self {
        Self {
            channel1,
            channel2,
            orientation,
            received_at,
        }
    }

    /// Pitch, if the device reported orientation
    pub fn pitch(&self) -> Option<f64> {
        self.orientation.map(|o| o.pitch)
    }

    /// Roll, if the device reported orientation
    pub fn roll(&self) -> Option<f64> {
        self.orientation.map(|o| o.roll)
    }
}

/// Statistics computed on the device itself (`STATS,...` lines)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub rms1: f64,
    pub rms2: f64,
    pub mean1: f64,
    pub mean2: f64,
    pub imbalance: f64,
    pub orientation: Option<Orientation>,
    pub received_at: DateTime<Utc>,
}

/// Result of decoding one device line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedFrame {
    Sample(SampleFrame),
    Stats(DeviceStats),
}

impl ParsedFrame {
    /// Orientation carried by the frame, whichever variant it is
    pub fn orientation(&self) -> Option<Orientation> {
        match self {
            ParsedFrame::Sample(frame) => frame.orientation,
            ParsedFrame::Stats(stats) => stats.orientation,
        }
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        match self {
            ParsedFrame::Sample(frame) => frame.received_at,
            ParsedFrame::Stats(stats) => stats.received_at,
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pitch {:.1}°, roll {:.1}°", self.pitch, self.roll)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_frame_accessors() {
        let now = Utc::now();
        let frame = SampleFrame::new(2048.0, 2100.0, Some(Orientation::new(3.2, -1.1)), now);
        assert_eq!(frame.pitch(), Some(3.2));
        assert_eq!(frame.roll(), Some(-1.1));

        let bare = SampleFrame::new(2048.0, 2100.0, None, now);
        assert_eq!(bare.pitch(), None);
        assert_eq!(bare.roll(), None);
    }

    #[test]
    fn test_parsed_frame_orientation() {
        let now = Utc::now();
        let stats = DeviceStats {
            rms1: 1.0,
            rms2: 1.0,
            mean1: 0.0,
            mean2: 0.0,
            imbalance: 0.0,
            orientation: Some(Orientation::new(1.0, 2.0)),
            received_at: now,
        };
        let parsed = ParsedFrame::Stats(stats);
        assert_eq!(parsed.orientation(), Some(Orientation::new(1.0, 2.0)));
        assert_eq!(parsed.received_at(), now);
    }
}
