//! Core per-sample processor trait

/// Number of EMG channels carried by every frame
pub const CHANNEL_COUNT: usize = 2;

/// Core trait for stateful per-sample processors
///
/// Implementations keep independent memory for each channel; a sample on one
/// channel never affects the output of the other.
pub trait SampleProcessor: Send + Sync {
    /// Process one sample of `channel` and return the output sample
    fn process_sample(&mut self, input: f64, channel: usize) -> f64;

    /// Zero all internal state
    fn reset(&mut self);

    /// Group delay estimate in samples
    fn latency_estimate(&self) -> u64 {
        1
    }
}

/// Run both channels of one frame through a processor
pub fn process_pair<P: SampleProcessor + ?Sized>(processor: &mut P, ch1: f64, ch2: f64) -> (f64, f64) {
    (processor.process_sample(ch1, 0), processor.process_sample(ch2, 1))
}
