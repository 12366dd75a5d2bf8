//! Synthetic sensing device
//!
//! Produces `E1,E2,pitch,roll` (or `E1,E2`) lines the way the real device
//! does: 12-bit ADC counts around mid-scale, on/off muscle bursts, 60 Hz
//! pickup and a slow posture drift.

use crate::ingest::IngestHandle;
use emg_core::{EmgError, EmgResult};
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;
use tracing::info;

/// Full-scale value of the device ADC
const ADC_MAX: f64 = 4095.0;

/// Configuration for the simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Samples per second per channel
    pub sample_rate: f64,
    /// Lines sent per transport message
    pub batch_size: usize,
    /// ADC resting level (counts)
    pub baseline: f64,
    /// Peak EMG amplitude during a burst (counts)
    pub burst_amplitude: f64,
    /// Burst on/off durations (s)
    pub burst_on_secs: f64,
    pub burst_off_secs: f64,
    /// Gaussian noise standard deviation (counts)
    pub noise_std: f64,
    /// Powerline interference
    pub mains_frequency: f64,
    pub mains_amplitude: f64,
    /// Include pitch/roll fields
    pub with_orientation: bool,
    /// Peak posture drift (degrees) and its period (s)
    pub posture_drift_deg: f64,
    pub posture_period_secs: f64,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 1650.0,
            batch_size: 33, // 20 ms per message
            baseline: 2048.0,
            burst_amplitude: 600.0,
            burst_on_secs: 1.5,
            burst_off_secs: 2.5,
            noise_std: 15.0,
            mains_frequency: 60.0,
            mains_amplitude: 40.0,
            with_orientation: true,
            posture_drift_deg: 12.0,
            posture_period_secs: 30.0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> EmgResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(EmgError::invalid_config("Simulator sample rate must be positive"));
        }
        if self.batch_size == 0 {
            return Err(EmgError::invalid_config("Simulator batch size must be greater than 0"));
        }
        if !(self.noise_std.is_finite() && self.noise_std >= 0.0) {
            return Err(EmgError::invalid_config("Simulator noise deviation must be finite and non-negative"));
        }
        if self.burst_on_secs <= 0.0 || self.burst_off_secs < 0.0 || self.posture_period_secs <= 0.0 {
            return Err(EmgError::invalid_config("Simulator periods must be positive"));
        }
        Ok(())
    }

    /// Wall-clock spacing of transport messages
    pub fn batch_interval(&self) -> Duration {
        Duration::from_secs_f64(self.batch_size as f64 / self.sample_rate)
    }
}

/// Line generator for the simulated device
pub struct DeviceSimulator {
    config: SimulatorConfig,
    rng: rand::rngs::StdRng,
    noise: Normal<f64>,
    sample_index: u64,
}

impl DeviceSimulator {
    pub fn new(config: SimulatorConfig) -> EmgResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
            None => rand::rngs::StdRng::from_entropy(),
        };
        let noise = Normal::new(0.0, config.noise_std)
            .map_err(|e| EmgError::invalid_config(format!("Invalid noise level: {}", e)))?;

        Ok(Self {
            config,
            rng,
            noise,
            sample_index: 0,
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Burst envelope in [0, 1]; channel 2 lags channel 1 by half a cycle
    fn activation(&self, time: f64, channel: usize) -> f64 {
        let cycle = self.config.burst_on_secs + self.config.burst_off_secs;
        let offset = if channel == 0 { 0.0 } else { cycle / 2.0 };
        let phase = (time + offset) % cycle;
        if phase < self.config.burst_on_secs {
            // Smooth rise and fall within the burst
            (PI * phase / self.config.burst_on_secs).sin()
        } else {
            0.0
        }
    }

    fn channel_sample(&mut self, time: f64, channel: usize) -> f64 {
        let activation = self.activation(time, channel);
        // Motor unit firing approximated as broadband noise scaled by activation
        let emg = activation * self.config.burst_amplitude * self.rng.gen_range(-1.0..1.0);
        let mains = self.config.mains_amplitude * (2.0 * PI * self.config.mains_frequency * time).sin();
        let noise = self.noise.sample(&mut self.rng);

        (self.config.baseline + emg + mains + noise).round().clamp(0.0, ADC_MAX)
    }

    fn orientation(&self, time: f64) -> (f64, f64) {
        let phase = 2.0 * PI * time / self.config.posture_period_secs;
        let pitch = self.config.posture_drift_deg * phase.sin();
        let roll = 0.5 * self.config.posture_drift_deg * (0.5 * phase).sin();
        (pitch, roll)
    }

    /// Next device line
    pub fn next_line(&mut self) -> String {
        let time = self.sample_index as f64 / self.config.sample_rate;
        self.sample_index += 1;

        let e1 = self.channel_sample(time, 0);
        let e2 = self.channel_sample(time, 1);

        if self.config.with_orientation {
            let (pitch, roll) = self.orientation(time);
            format!("{},{},{:.2},{:.2}", e1, e2, pitch, roll)
        } else {
            format!("{},{}", e1, e2)
        }
    }

    /// Next transport message: `batch_size` newline-separated lines
    pub fn next_batch(&mut self) -> String {
        let mut batch = String::with_capacity(self.config.batch_size * 24);
        for i in 0..self.config.batch_size {
            if i > 0 {
                batch.push('\n');
            }
            let line = self.next_line();
            batch.push_str(&line);
        }
        batch
    }
}

/// Drive a coordinator from the simulator until it stops accepting data
pub async fn run_simulated_device(handle: IngestHandle, config: SimulatorConfig) -> EmgResult<()> {
    let mut simulator = DeviceSimulator::new(config)?;
    let mut device = handle.try_claim_device().ok_or(EmgError::DeviceDisconnected)?;
    device.connect("simulator").await?;

    info!(
        sample_rate = simulator.config().sample_rate,
        batch = simulator.config().batch_size,
        "Simulated device streaming"
    );

    let mut ticker = tokio::time::interval(simulator.config().batch_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if device.send_message(simulator.next_batch()).await.is_err() {
            break;
        }
    }

    device.close().await;
    info!("Simulated device stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use emg_core::{parse_line, ParsedFrame};

    fn seeded() -> SimulatorConfig {
        SimulatorConfig {
            seed: Some(7),
            ..SimulatorConfig::default()
        }
    }

    #[test]
    fn test_lines_parse_as_device_frames() {
        let mut simulator = DeviceSimulator::new(seeded()).unwrap();
        for _ in 0..2000 {
            let line = simulator.next_line();
            match parse_line(&line, Utc::now()).unwrap() {
                ParsedFrame::Sample(frame) => {
                    assert!((0.0..=ADC_MAX).contains(&frame.channel1));
                    assert!((0.0..=ADC_MAX).contains(&frame.channel2));
                    let o = frame.orientation.unwrap();
                    assert!(o.pitch.abs() <= 12.0 && o.roll.abs() <= 6.0);
                }
                other => panic!("unexpected frame {other:?}"),
            }
        }
    }

    #[test]
    fn test_two_field_mode() {
        let config = SimulatorConfig {
            with_orientation: false,
            ..seeded()
        };
        let mut simulator = DeviceSimulator::new(config).unwrap();
        assert_eq!(simulator.next_line().split(',').count(), 2);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let mut a = DeviceSimulator::new(seeded()).unwrap();
        let mut b = DeviceSimulator::new(seeded()).unwrap();
        for _ in 0..100 {
            assert_eq!(a.next_line(), b.next_line());
        }
    }

    #[test]
    fn test_batch_holds_batch_size_lines() {
        let mut simulator = DeviceSimulator::new(seeded()).unwrap();
        let batch = simulator.next_batch();
        assert_eq!(batch.lines().count(), 33);
        assert!(!batch.ends_with('\n'));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SimulatorConfig {
            batch_size: 0,
            ..SimulatorConfig::default()
        };
        assert!(DeviceSimulator::new(config).is_err());

        let config = SimulatorConfig {
            noise_std: -1.0,
            ..SimulatorConfig::default()
        };
        assert!(matches!(config.validate(), Err(EmgError::InvalidConfig { .. })));
        assert!(DeviceSimulator::new(config).is_err());

        let nan_noise = SimulatorConfig {
            noise_std: f64::NAN,
            ..SimulatorConfig::default()
        };
        assert!(nan_noise.validate().is_err());

        let silent = SimulatorConfig {
            noise_std: 0.0,
            ..SimulatorConfig::default()
        };
        assert!(DeviceSimulator::new(silent).is_ok());
    }

    #[tokio::test]
    async fn test_simulated_device_feeds_coordinator() {
        let stream = crate::config::StreamConfig::default();
        let handle = crate::ingest::start_ingest(&emg_processing::ProcessingConfig::default(), stream).unwrap();

        let task = tokio::spawn(run_simulated_device(handle.clone(), seeded()));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = handle.status().await.unwrap();
        assert!(status.counters.samples_processed > 0);
        assert_eq!(status.counters.malformed_frames, 0);
        assert!(handle.try_claim_device().is_none());
        task.abort();
    }
}
