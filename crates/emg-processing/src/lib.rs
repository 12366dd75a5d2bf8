//! EMG-Processing: Real-time signal chain for the EMG posture hub
//!
//! Per-sample filtering, posture scoring and windowed statistics.

pub mod config;
pub mod filters;
pub mod pipeline;
pub mod posture;
pub mod processor;
pub mod stats;

pub use config::ProcessingConfig;
pub use filters::{
    ButterworthFilter, ButterworthKind, CutoffBounds, FilterConfig, FilterPipeline, FilterUpdate,
    NotchFilter,
};
pub use pipeline::{ChainCounters, SignalChain};
pub use posture::{PostureBaseline, PostureEstimator, MAX_SCORE};
pub use processor::{process_pair, SampleProcessor, CHANNEL_COUNT};
pub use stats::{imbalance, ChannelStats, StatsAggregator};
