//! Error handling for the EMG posture hub
//!
//! One error type covers the whole ingest path. None of these conditions is
//! fatal to the process: each is recovered at the point where it surfaces.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for EMG hub operations
pub type EmgResult<T> = Result<T, EmgError>;

/// Error type for all ingest, processing and distribution operations
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EmgError {
    /// A device line could not be decoded
    #[error("Malformed frame ({reason}): {line:?}")]
    MalformedFrame {
        /// What was wrong with the line
        reason: String,
        /// The offending line, truncated for logging
        line: String,
    },

    /// Filter cutoffs out of bounds or contradictory
    #[error("Invalid filter configuration: {reason}")]
    InvalidFilterConfig {
        /// Which constraint was violated
        reason: String,
    },

    /// Calibration requested before any orientation was received
    #[error("Calibration unavailable: no orientation data received yet")]
    CalibrationUnavailable,

    /// The sensing device connection is gone (or the coordinator stopped)
    #[error("Sensing device disconnected")]
    DeviceDisconnected,

    /// A dashboard subscriber is gone or cannot take more output
    #[error("Subscriber {id} unreachable")]
    SubscriberUnreachable {
        /// Subscriber identifier
        id: Uuid,
    },

    /// Unknown export range selector
    #[error("Invalid export range '{value}', expected one of 10m, 30m, 1h, full")]
    InvalidExportRange {
        /// The rejected selector
        value: String,
    },

    /// Invalid process configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },
}

impl EmgError {
    /// Longest slice of the offending line kept in a `MalformedFrame`
    const MAX_LINE_ECHO: usize = 64;

    /// Build a malformed-frame error, keeping only a prefix of the line
    pub fn malformed(reason: impl Into<String>, line: &str) -> Self {
        let line = match line.char_indices().nth(Self::MAX_LINE_ECHO) {
            Some((idx, _)) => format!("{}...", &line[..idx]),
            None => line.to_string(),
        };
        EmgError::MalformedFrame {
            reason: reason.into(),
            line,
        }
    }

    /// Build a filter configuration error
    pub fn invalid_filter(reason: impl Into<String>) -> Self {
        EmgError::InvalidFilterConfig {
            reason: reason.into(),
        }
    }

    /// Build a process configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        EmgError::InvalidConfig {
            reason: reason.into(),
        }
    }
}
