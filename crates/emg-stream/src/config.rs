//! Configuration for ingest and distribution

use emg_core::{EmgError, EmgResult};
use emg_processing::ProcessingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime parameters of the coordinator and broadcast hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Outbound queue length per dashboard subscriber
    pub subscriber_capacity: usize,
    /// Minimum spacing between raw sample broadcasts (ms)
    pub raw_broadcast_interval_ms: u64,
    /// Reconnects within this window resume the previous session (s)
    pub resume_grace_secs: u64,
    /// Buffered device events between socket task and coordinator
    pub device_channel_capacity: usize,
    /// Buffered dashboard commands
    pub command_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 256,
            raw_broadcast_interval_ms: 20, // ~50 fps
            resume_grace_secs: 5,
            device_channel_capacity: 4096,
            command_channel_capacity: 32,
        }
    }
}

impl StreamConfig {
    pub fn raw_broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.raw_broadcast_interval_ms)
    }

    pub fn resume_grace(&self) -> Duration {
        Duration::from_secs(self.resume_grace_secs)
    }

    pub fn validate(&self) -> EmgResult<()> {
        if self.subscriber_capacity == 0 {
            return Err(EmgError::invalid_config("Subscriber capacity must be greater than 0"));
        }
        if self.device_channel_capacity == 0 || self.command_channel_capacity == 0 {
            return Err(EmgError::invalid_config("Channel capacities must be greater than 0"));
        }
        Ok(())
    }

    pub fn to_json(&self) -> EmgResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EmgError::invalid_config(format!("JSON serialization failed: {}", e)))
    }

    pub fn from_json(json: &str) -> EmgResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EmgError::invalid_config(format!("JSON deserialization failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Complete hub configuration, as loaded from a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub processing: ProcessingConfig,
    pub stream: StreamConfig,
}

impl HubConfig {
    pub fn validate(&self) -> EmgResult<()> {
        self.processing.validate()?;
        self.stream.validate()
    }

    pub fn to_json(&self) -> EmgResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EmgError::invalid_config(format!("JSON serialization failed: {}", e)))
    }

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
    fn test_stream_config_defaults() {
        let config = StreamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.raw_broadcast_interval(), Duration::from_millis(20));
        assert_eq!(config.resume_grace(), Duration::from_secs(5));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = StreamConfig {
            subscriber_capacity: 0,
            ..StreamConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmgError::InvalidConfig { .. })));
    }

    #[test]
    fn test_hub_config_json() {
        let config = HubConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(HubConfig::from_json(&json).unwrap(), config);

        let partial = HubConfig::from_json(r#"{"stream": {"subscriber_capacity": 16}}"#).unwrap();
        assert_eq!(partial.stream.subscriber_capacity, 16);
        assert_eq!(partial.processing, ProcessingConfig::default());

        assert!(HubConfig::from_json(r#"{"processing": {"filter_order": 5}}"#).is_err());
        assert!(StreamConfig::from_json(r#"{"raw_broadcast_interval_ms": 5}"#).is_ok());
    }
}
