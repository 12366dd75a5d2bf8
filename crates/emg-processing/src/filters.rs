//! Digital filters for the EMG channels
//!
//! Everything here runs one sample at a time with fixed-size state, so the
//! cost per sample does not depend on how long the session has been running.

use crate::config::ProcessingConfig;
use crate::processor::{process_pair, SampleProcessor, CHANNEL_COUNT};
use emg_core::{EmgError, EmgResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};

/// Live filter settings, changeable from a dashboard
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Apply the mains notch
    pub notch_enabled: bool,
    /// Upper edge of the passband (Hz)
    pub low_pass_cutoff: f64,
    /// Lower edge of the passband (Hz)
    pub high_pass_cutoff: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            notch_enabled: true,
            low_pass_cutoff: 330.0,
            high_pass_cutoff: 20.0,
        }
    }
}

/// Admissible range for both cutoff frequencies (Hz)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CutoffBounds {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl CutoffBounds {
    /// Default band for a sample rate: 1 Hz up to 99% of Nyquist
    pub fn for_sample_rate(sample_rate: f64) -> Self {
        Self {
            min_hz: 1.0,
            max_hz: 0.99 * sample_rate / 2.0,
        }
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.min_hz && freq <= self.max_hz
    }
}

impl FilterConfig {
    /// Check `0 < high_pass < low_pass < nyquist`, both inside `bounds`
    pub fn validate(&self, bounds: &CutoffBounds, sample_rate: f64) -> EmgResult<()> {
        let nyquist = sample_rate / 2.0;

        if !self.low_pass_cutoff.is_finite() || !self.high_pass_cutoff.is_finite() {
            return Err(EmgError::invalid_filter("cutoff frequencies must be finite"));
        }
        if self.high_pass_cutoff <= 0.0 {
            return Err(EmgError::invalid_filter(format!(
                "high-pass cutoff {} Hz must be positive",
                self.high_pass_cutoff
            )));
        }
        if self.high_pass_cutoff >= self.low_pass_cutoff {
            return Err(EmgError::invalid_filter(format!(
                "high-pass cutoff {} Hz must be below low-pass cutoff {} Hz",
                self.high_pass_cutoff, self.low_pass_cutoff
            )));
        }
        if self.low_pass_cutoff >= nyquist {
            return Err(EmgError::invalid_filter(format!(
                "low-pass cutoff {} Hz must be below Nyquist {} Hz",
                self.low_pass_cutoff, nyquist
            )));
        }
        for (label, freq) in [("high-pass", self.high_pass_cutoff), ("low-pass", self.low_pass_cutoff)] {
            if !bounds.contains(freq) {
                return Err(EmgError::invalid_filter(format!(
                    "{} cutoff {} Hz outside admissible range {}-{} Hz",
                    label, freq, bounds.min_hz, bounds.max_hz
                )));
            }
        }

        Ok(())
    }

    fn same_cutoffs(&self, other: &FilterConfig) -> bool {
        self.low_pass_cutoff == other.low_pass_cutoff && self.high_pass_cutoff == other.high_pass_cutoff
    }
}

/// Single biquad section (2nd order)
#[derive(Debug, Clone)]
struct BiquadSection {
    // Coefficients: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
    b0: f64, b1: f64, b2: f64,
    a1: f64, a2: f64,
    // State per channel
    x1: [f64; CHANNEL_COUNT], x2: [f64; CHANNEL_COUNT], // Input history
    y1: [f64; CHANNEL_COUNT], y2: [f64; CHANNEL_COUNT], // Output history
}

impl BiquadSection {
    fn passthrough() -> Self {
        Self {
            b0: 1.0, b1: 0.0, b2: 0.0,
            a1: 0.0, a2: 0.0,
            x1: [0.0; CHANNEL_COUNT],
            x2: [0.0; CHANNEL_COUNT],
            y1: [0.0; CHANNEL_COUNT],
            y2: [0.0; CHANNEL_COUNT],
        }
    }

    /// Butterworth lowpass section via bilinear transform with pre-warping
    fn lowpass(cutoff: f64, fs: f64, q: f64) -> Self {
        let k = (PI * cutoff / fs).tan();
        let k2 = k * k;
        let norm = k2 + k / q + 1.0;

        let mut biquad = Self::passthrough();
        biquad.b0 = k2 / norm;
        biquad.b1 = 2.0 * biquad.b0;
        biquad.b2 = biquad.b0;
        biquad.a1 = 2.0 * (k2 - 1.0) / norm;
        biquad.a2 = (k2 - k / q + 1.0) / norm;
        biquad
    }

    /// Butterworth highpass section, same poles as the lowpass
    fn highpass(cutoff: f64, fs: f64, q: f64) -> Self {
        let k = (PI * cutoff / fs).tan();
        let k2 = k * k;
        let norm = k2 + k / q + 1.0;

        let mut biquad = Self::passthrough();
        biquad.b0 = 1.0 / norm;
        biquad.b1 = -2.0 * biquad.b0;
        biquad.b2 = biquad.b0;
        biquad.a1 = 2.0 * (k2 - 1.0) / norm;
        biquad.a2 = (k2 - k / q + 1.0) / norm;
        biquad
    }

    fn notch(freq: f64, fs: f64, q: f64) -> Self {
        let omega = 2.0 * PI * freq / fs;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();
        let a0 = 1.0 + alpha;

        let mut biquad = Self::passthrough();
        biquad.b0 = 1.0 / a0;
        biquad.b1 = -2.0 * cos_omega / a0;
        biquad.b2 = 1.0 / a0;
        biquad.a1 = -2.0 * cos_omega / a0;
        biquad.a2 = (1.0 - alpha) / a0;
        biquad
    }

    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        let output = self.b0 * input + self.b1 * self.x1[channel] + self.b2 * self.x2[channel]
            - self.a1 * self.y1[channel] - self.a2 * self.y2[channel];

        self.x2[channel] = self.x1[channel];
        self.x1[channel] = input;
        self.y2[channel] = self.y1[channel];
        self.y1[channel] = output;

        output
    }

    fn reset(&mut self) {
        self.x1 = [0.0; CHANNEL_COUNT];
        self.x2 = [0.0; CHANNEL_COUNT];
        self.y1 = [0.0; CHANNEL_COUNT];
        self.y2 = [0.0; CHANNEL_COUNT];
    }
}

/// Quality factors of the biquads making up an even-order Butterworth filter
fn butterworth_q_factors(order: usize) -> Vec<f64> {
    (0..order / 2)
        .map(|k| {
            let theta = PI * (2 * k + 1) as f64 / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

/// Response shape of a Butterworth stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButterworthKind {
    Lowpass,
    Highpass,
}

/// Even-order Butterworth filter built from cascaded biquad sections
#[derive(Debug, Clone)]
pub struct ButterworthFilter {
    order: usize,
    biquads: Vec<BiquadSection>,
}

impl ButterworthFilter {
    pub fn new(kind: ButterworthKind, cutoff: f64, order: usize, sample_rate: f64) -> EmgResult<Self> {
        if order == 0 || order % 2 != 0 {
            return Err(EmgError::invalid_filter(format!(
                "Butterworth order must be even and positive, got {}",
                order
            )));
        }
        if !(cutoff > 0.0 && cutoff < sample_rate / 2.0) {
            return Err(EmgError::invalid_filter(format!(
                "cutoff {} Hz must lie strictly between 0 and Nyquist {} Hz",
                cutoff,
                sample_rate / 2.0
            )));
        }

        let biquads = butterworth_q_factors(order)
            .into_iter()
            .map(|q| match kind {
                ButterworthKind::Lowpass => BiquadSection::lowpass(cutoff, sample_rate, q),
                ButterworthKind::Highpass => BiquadSection::highpass(cutoff, sample_rate, q),
            })
            .collect();

        Ok(Self { order, biquads })
    }

    pub fn lowpass(cutoff: f64, order: usize, sample_rate: f64) -> EmgResult<Self> {
        Self::new(ButterworthKind::Lowpass, cutoff, order, sample_rate)
    }

    pub fn highpass(cutoff: f64, order: usize, sample_rate: f64) -> EmgResult<Self> {
        Self::new(ButterworthKind::Highpass, cutoff, order, sample_rate)
    }
}

impl SampleProcessor for ButterworthFilter {
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        self.biquads
            .iter_mut()
            .fold(input, |sample, biquad| biquad.process_sample(sample, channel))
    }

    fn reset(&mut self) {
        for biquad in &mut self.biquads {
            biquad.reset();
        }
    }

    fn latency_estimate(&self) -> u64 {
        self.order as u64
    }
}

/// Notch filter for powerline interference removal
#[derive(Debug, Clone)]
pub struct NotchFilter {
    section: BiquadSection,
}

impl NotchFilter {
    pub fn new(notch_freq: f64, q_factor: f64, sample_rate: f64) -> EmgResult<Self> {
        if !(notch_freq > 0.0 && notch_freq < sample_rate / 2.0) {
            return Err(EmgError::invalid_filter(format!(
                "notch frequency {} Hz must lie below Nyquist {} Hz",
                notch_freq,
                sample_rate / 2.0
            )));
        }
        if !(q_factor > 0.0) {
            return Err(EmgError::invalid_filter("notch Q must be positive"));
        }

        Ok(Self {
            section: BiquadSection::notch(notch_freq, sample_rate, q_factor),
        })
    }
}

impl SampleProcessor for NotchFilter {
    fn process_sample(&mut self, input: f64, channel: usize) -> f64 {
        self.section.process_sample(input, channel)
    }

    fn reset(&mut self) {
        self.section.reset();
    }

    fn latency_estimate(&self) -> u64 {
        2
    }
}

/// What a configuration change did to the filter memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterUpdate {
    /// Bandpass redesigned and all delay lines zeroed
    pub state_reset: bool,
    /// Notch switched on or off
    pub notch_toggled: bool,
}

/// Per-session filter chain: notch -> lowpass -> highpass, both channels
pub struct FilterPipeline {
    config: FilterConfig,
    bounds: CutoffBounds,
    sample_rate: f64,
    order: usize,
    notch: NotchFilter,
    lowpass: ButterworthFilter,
    highpass: ButterworthFilter,
}

impl FilterPipeline {
    /// Build the chain with the configured default settings
    pub fn new(processing: &ProcessingConfig) -> EmgResult<Self> {
        let config = processing.default_filter;
        config.validate(&processing.cutoff_bounds, processing.sample_rate)?;

        Ok(Self {
            config,
            bounds: processing.cutoff_bounds,
            sample_rate: processing.sample_rate,
            order: processing.filter_order,
            notch: NotchFilter::new(processing.mains_frequency, processing.notch_q, processing.sample_rate)?,
            lowpass: ButterworthFilter::lowpass(config.low_pass_cutoff, processing.filter_order, processing.sample_rate)?,
            highpass: ButterworthFilter::highpass(config.high_pass_cutoff, processing.filter_order, processing.sample_rate)?,
        })
    }

    /// Current settings
    pub fn config(&self) -> FilterConfig {
        self.config
    }

    /// Swap in new settings, or reject them and keep the current ones
    ///
    /// A cutoff change redesigns the bandpass and zeroes every delay line.
    /// Toggling only the notch leaves the bandpass memory untouched.
    pub fn apply_config(&mut self, new_config: FilterConfig) -> EmgResult<FilterUpdate> {
        new_config.validate(&self.bounds, self.sample_rate)?;

        let cutoffs_changed = !new_config.same_cutoffs(&self.config);
        let notch_toggled = new_config.notch_enabled != self.config.notch_enabled;

        if cutoffs_changed {
            // Build both before touching self so a failure leaves nothing half-applied
            let lowpass = ButterworthFilter::lowpass(new_config.low_pass_cutoff, self.order, self.sample_rate)?;
            let highpass = ButterworthFilter::highpass(new_config.high_pass_cutoff, self.order, self.sample_rate)?;
            self.lowpass = lowpass;
            self.highpass = highpass;
            self.notch.reset();
        } else if notch_toggled && new_config.notch_enabled {
            // Memory from before the notch was switched off is stale
            self.notch.reset();
        }

        self.config = new_config;

        info!(
            low_pass = new_config.low_pass_cutoff,
            high_pass = new_config.high_pass_cutoff,
            notch = new_config.notch_enabled,
            state_reset = cutoffs_changed,
            "Filters updated"
        );

        Ok(FilterUpdate {
            state_reset: cutoffs_changed,
            notch_toggled,
        })
    }

    /// Filter one frame's two channels
    pub fn process(&mut self, ch1: f64, ch2: f64) -> (f64, f64) {
        let (mut y1, mut y2) = (ch1, ch2);
        if self.config.notch_enabled {
            (y1, y2) = process_pair(&mut self.notch, y1, y2);
        }
        (y1, y2) = process_pair(&mut self.lowpass, y1, y2);
        process_pair(&mut self.highpass, y1, y2)
    }

    /// Zero all delay lines, keeping the settings
    pub fn reset(&mut self) {
        self.notch.reset();
        self.lowpass.reset();
        self.highpass.reset();
        debug!("Filter state reset");
    }

    /// Group delay estimate of the active stages, in samples
    pub fn latency_estimate(&self) -> u64 {
        let notch = if self.config.notch_enabled { self.notch.latency_estimate() } else { 0 };
        notch + self.lowpass.latency_estimate() + self.highpass.latency_estimate()
    }
}
