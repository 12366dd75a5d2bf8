//! Configuration for the signal chain

use crate::filters::{CutoffBounds, FilterConfig};
use emg_core::{EmgError, EmgResult};
use serde::{Deserialize, Serialize};

/// Process-wide processing parameters, fixed for the lifetime of the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Nominal device sample rate (Hz)
    pub sample_rate: f64,
    /// Powerline frequency removed by the notch (Hz)
    pub mains_frequency: f64,
    /// Notch quality factor
    pub notch_q: f64,
    /// Butterworth order of each bandpass edge (even)
    pub filter_order: usize,
    /// Filter settings a fresh process starts with
    pub default_filter: FilterConfig,
    /// Admissible cutoff range for dashboard updates
    pub cutoff_bounds: CutoffBounds,
    /// Samples per statistics window
    pub stats_window_samples: usize,
    /// Posture score points lost per degree of deviation
    pub posture_sensitivity: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let sample_rate = 1650.0;
        Self {
            sample_rate,
            mains_frequency: 60.0,
            notch_q: 30.0,
            filter_order: 4,
            default_filter: FilterConfig::default(),
            cutoff_bounds: CutoffBounds::for_sample_rate(sample_rate),
            stats_window_samples: 165,
            posture_sensitivity: 2.0,
        }
    }
}

impl ProcessingConfig {
    pub fn nyquist(&self) -> f64 {
        self.sample_rate / 2.0
    }

    /// Statistics window length in seconds
    pub fn stats_window_secs(&self) -> f64 {
        self.stats_window_samples as f64 / self.sample_rate
    }

    /// Validate configuration
    pub fn validate(&self) -> EmgResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(EmgError::invalid_config("Sample rate must be positive"));
        }

        if !(self.mains_frequency > 0.0 && self.mains_frequency < self.nyquist()) {
            return Err(EmgError::invalid_config(format!(
                "Mains frequency {} Hz must lie below Nyquist {} Hz",
                self.mains_frequency,
                self.nyquist()
            )));
        }

        if !(self.notch_q.is_finite() && self.notch_q > 0.0) {
            return Err(EmgError::invalid_config("Notch Q must be positive"));
        }

        if self.filter_order < 2 || self.filter_order > 8 || self.filter_order % 2 != 0 {
            return Err(EmgError::invalid_config(format!(
                "Filter order must be even and between 2 and 8, got {}",
                self.filter_order
            )));
        }

        let bounds = &self.cutoff_bounds;
        if !(bounds.min_hz > 0.0 && bounds.min_hz < bounds.max_hz && bounds.max_hz < self.nyquist()) {
            return Err(EmgError::invalid_config(format!(
                "Cutoff bounds {}-{} Hz must satisfy 0 < min < max < Nyquist",
                bounds.min_hz, bounds.max_hz
            )));
        }

        self.default_filter
            .validate(bounds, self.sample_rate)
            .map_err(|e| EmgError::invalid_config(format!("Default filter invalid: {}", e)))?;

        if self.stats_window_samples == 0 {
            return Err(EmgError::invalid_config("Statistics window must hold at least one sample"));
        }

        if !(self.posture_sensitivity.is_finite() && self.posture_sensitivity > 0.0) {
            return Err(EmgError::invalid_config("Posture sensitivity must be finite and positive"));
        }

        Ok(())
    }

    /// Serialize configuration to JSON
    pub fn to_json(&self) -> EmgResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EmgError::invalid_config(format!("JSON serialization failed: {}", e)))
    }

    /// Deserialize and validate configuration from JSON
    pub fn from_json(json: &str) -> EmgResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EmgError::invalid_config(format!("JSON deserialization failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProcessingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.nyquist(), 825.0);
        assert!((config.stats_window_secs() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_config_serialization() {
        let config = ProcessingConfig::default();
        let json = config.to_json().unwrap();
        let restored = ProcessingConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ProcessingConfig::from_json(r#"{"posture_sensitivity": 4.0}"#).unwrap();
        assert_eq!(config.posture_sensitivity, 4.0);
        assert_eq!(config.sample_rate, 1650.0);
        assert_eq!(config.stats_window_samples, 165);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ProcessingConfig::default();
        config.filter_order = 3;
        assert!(matches!(config.validate(), Err(EmgError::InvalidConfig { .. })));

        let mut config = ProcessingConfig::default();
        config.posture_sensitivity = 0.0;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::default();
        config.stats_window_samples = 0;
        assert!(config.validate().is_err());

        let mut config = ProcessingConfig::default();
        config.default_filter.high_pass_cutoff = 500.0;
        assert!(config.validate().is_err());

        assert!(ProcessingConfig::from_json("not json").is_err());
    }
}
