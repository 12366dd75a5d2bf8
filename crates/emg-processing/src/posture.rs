//! Posture estimation from device orientation
//!
//! The score measures how far the current pitch/roll have drifted from a
//! user-captured baseline. Without a baseline there is no score at all; an
//! uncalibrated session never reports 0.

use chrono::{DateTime, Utc};
use emg_core::{EmgError, EmgResult, Orientation};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Best possible posture score
pub const MAX_SCORE: f64 = 100.0;

/// Zero reference for posture scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PostureBaseline {
    Uncalibrated,
    Calibrated {
        pitch0: f64,
        roll0: f64,
        calibrated_at: DateTime<Utc>,
    },
}

impl Default for PostureBaseline {
    fn default() -> Self {
        PostureBaseline::Uncalibrated
    }
}

impl PostureBaseline {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, PostureBaseline::Calibrated { .. })
    }
}

/// Tracks the latest orientation and scores it against the baseline
#[derive(Debug, Clone)]
pub struct PostureEstimator {
    baseline: PostureBaseline,
    last_observed: Option<Orientation>,
    sensitivity: f64,
}

impl PostureEstimator {
    /// `sensitivity` is the number of points lost per degree of deviation
    pub fn new(sensitivity: f64) -> Self {
        Self {
            baseline: PostureBaseline::Uncalibrated,
            last_observed: None,
            sensitivity,
        }
    }

    /// Remember the most recent orientation seen on the wire
    pub fn observe(&mut self, orientation: Orientation) {
        self.last_observed = Some(orientation);
    }

    /// Capture the last observed orientation as the new baseline
    pub fn calibrate(&mut self, now: DateTime<Utc>) -> EmgResult<PostureBaseline> {
        let orientation = self.last_observed.ok_or(EmgError::CalibrationUnavailable)?;

        self.baseline = PostureBaseline::Calibrated {
            pitch0: orientation.pitch,
            roll0: orientation.roll,
            calibrated_at: now,
        };
        info!(pitch0 = orientation.pitch, roll0 = orientation.roll, "Posture calibrated");

        Ok(self.baseline)
    }

    /// Score in [0, 100], or `None` while uncalibrated
    pub fn score(&self, pitch: f64, roll: f64) -> Option<f64> {
        match self.baseline {
            PostureBaseline::Uncalibrated => None,
            PostureBaseline::Calibrated { pitch0, roll0, .. } => {
                let deviation = (pitch - pitch0).hypot(roll - roll0);
                if deviation >= MAX_SCORE / self.sensitivity {
                    return Some(0.0);
                }
                Some((MAX_SCORE - self.sensitivity * deviation).clamp(0.0, MAX_SCORE))
            }
        }
    }

    /// Observe then score in one step
    pub fn fuse(&mut self, orientation: Orientation) -> Option<f64> {
        self.observe(orientation);
        self.score(orientation.pitch, orientation.roll)
    }

    /// Back to uncalibrated with no observation
    pub fn reset(&mut self) {
        self.baseline = PostureBaseline::Uncalibrated;
        self.last_observed = None;
    }

    pub fn baseline(&self) -> PostureBaseline {
        self.baseline
    }

    pub fn sensitivity(&self) -> f64 {
        self.sensitivity
    }
}

impl Default for PostureEstimator {
    fn default() -> Self {
        Self::new(2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncalibrated_has_no_score() {
        let mut estimator = PostureEstimator::default();
        assert_eq!(estimator.sensitivity(), 2.0);
        assert_eq!(estimator.score(10.0, 10.0), None);
        assert_eq!(estimator.fuse(Orientation::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_calibrate_without_orientation_fails() {
        let mut estimator = PostureEstimator::default();
        assert_eq!(estimator.calibrate(Utc::now()), Err(EmgError::CalibrationUnavailable));
        assert_eq!(estimator.baseline(), PostureBaseline::Uncalibrated);
    }

    #[test]
    fn test_score_at_baseline_is_exactly_max() {
        let mut estimator = PostureEstimator::default();
        estimator.observe(Orientation::new(3.2, -1.1));
        estimator.calibrate(Utc::now()).unwrap();

        assert_eq!(estimator.score(3.2, -1.1), Some(100.0));
    }

    #[test]
    fn test_score_reaches_exactly_zero() {
        let mut estimator = PostureEstimator::new(2.0);
        estimator.observe(Orientation::new(2.0, -4.0));
        estimator.calibrate(Utc::now()).unwrap();

        assert_eq!(estimator.score(52.0, -4.0), Some(0.0));
        assert_eq!(estimator.score(90.0, -4.0), Some(0.0));
        assert_eq!(estimator.score(2.0, 80.0), Some(0.0));
    }

    #[test]
    fn test_score_decreases_with_deviation() {
        let mut estimator = PostureEstimator::new(2.0);
        estimator.observe(Orientation::new(0.0, 0.0));
        estimator.calibrate(Utc::now()).unwrap();

        // 3-4-5 triangle: deviation 5 degrees
        assert_eq!(estimator.score(3.0, 4.0), Some(90.0));
        assert_eq!(estimator.score(-3.0, -4.0), Some(90.0));
        let near = estimator.score(1.0, 0.0).unwrap();
        let far = estimator.score(10.0, 0.0).unwrap();
        assert!(near > far);
    }

    #[test]
    fn test_recalibration_replaces_baseline() {
        let mut estimator = PostureEstimator::default();
        estimator.observe(Orientation::new(1.0, 1.0));
        estimator.calibrate(Utc::now()).unwrap();

        estimator.observe(Orientation::new(20.0, -5.0));
        let baseline = estimator.calibrate(Utc::now()).unwrap();
        match baseline {
            PostureBaseline::Calibrated { pitch0, roll0, .. } => {
                assert_eq!(pitch0, 20.0);
                assert_eq!(roll0, -5.0);
            }
            other => panic!("unexpected baseline {other:?}"),
        }
        assert_eq!(estimator.score(20.0, -5.0), Some(100.0));
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut estimator = PostureEstimator::default();
        estimator.observe(Orientation::new(1.0, 1.0));
        estimator.calibrate(Utc::now()).unwrap();

        estimator.reset();
        assert!(!estimator.baseline().is_calibrated());
        assert!(estimator.calibrate(Utc::now()).is_err());
    }
}
