//! Dashboard wire protocol
//!
//! Every message is a JSON object tagged by `type`.
//!
//! Outbound: `emg_data`, `emg_stats`, `device_status`, `mpu_status`,
//! `filter_settings`, `filter_settings_ack`, `calibration_ack`, `status`,
//! `messages_dropped`, `error`.
//!
//! Inbound: `filter_settings`, `calibrate`, `get_status`.

use chrono::{DateTime, SecondsFormat, Utc};
use emg_core::{EmgError, EmgResult, ProcessedSample, StatsSource, StatsWindow};
use emg_processing::{ChainCounters, FilterConfig, PostureBaseline};
use serde::{Deserialize, Serialize};

/// Connection state of the sensing device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Connected,
    Disconnected,
}

/// Coordinator snapshot returned for `get_status` and `/api/status`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HubStatus {
    pub device: DeviceState,
    pub device_peer: Option<String>,
    pub session_started: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counters: ChainCounters,
    pub subscribers: usize,
    pub recorded: usize,
    /// Capture times of the first and last recorded entries
    pub recorded_from: Option<DateTime<Utc>>,
    pub recorded_to: Option<DateTime<Utc>>,
    pub filter: FilterConfig,
    pub baseline: PostureBaseline,
    pub orientation_available: bool,
}

/// Message sent to dashboards
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardMessage {
    EmgData {
        raw1: f64,
        filtered1: f64,
        raw2: f64,
        filtered2: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pitch: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        roll: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        posture_score: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    EmgStats {
        rms1: f64,
        rms2: f64,
        mean1: f64,
        mean2: f64,
        imbalance: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        pitch: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        roll: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        posture_score: Option<f64>,
        window_end: DateTime<Utc>,
        sample_count: usize,
        source: StatsSource,
    },
    DeviceStatus {
        status: DeviceState,
        timestamp: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        client_info: Option<String>,
    },
    MpuStatus {
        available: bool,
    },
    /// Current filter settings, announced to everyone after a change
    FilterSettings(FilterConfig),
    FilterSettingsAck {
        applied: bool,
        settings: FilterConfig,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    CalibrationAck {
        calibrated: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pitch0: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        roll0: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Status(HubStatus),
    MessagesDropped {
        count: u64,
    },
    Error {
        message: String,
    },
}

impl DashboardMessage {
    pub fn from_sample(sample: &ProcessedSample) -> Self {
        DashboardMessage::EmgData {
            raw1: sample.raw1,
            filtered1: sample.filtered1,
            raw2: sample.raw2,
            filtered2: sample.filtered2,
            pitch: sample.orientation.map(|o| o.pitch),
            roll: sample.orientation.map(|o| o.roll),
            posture_score: sample.posture_score,
            timestamp: sample.received_at,
        }
    }

    pub fn from_window(window: &StatsWindow) -> Self {
        DashboardMessage::EmgStats {
            rms1: window.rms1,
            rms2: window.rms2,
            mean1: window.mean1,
            mean2: window.mean2,
            imbalance: window.imbalance,
            pitch: window.pitch,
            roll: window.roll,
            posture_score: window.posture_score,
            window_end: window.window_end,
            sample_count: window.sample_count,
            source: window.source,
        }
    }

    pub fn device_status(status: DeviceState, at: DateTime<Utc>, client_info: Option<String>) -> Self {
        DashboardMessage::DeviceStatus {
            status,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            client_info,
        }
    }

    pub fn filter_ack(result: &EmgResult<FilterConfig>, current: FilterConfig) -> Self {
        match result {
            Ok(settings) => DashboardMessage::FilterSettingsAck {
                applied: true,
                settings: *settings,
                error: None,
            },
            Err(e) => DashboardMessage::FilterSettingsAck {
                applied: false,
                settings: current,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn calibration_ack(result: &EmgResult<PostureBaseline>) -> Self {
        match result {
            Ok(PostureBaseline::Calibrated { pitch0, roll0, .. }) => DashboardMessage::CalibrationAck {
                calibrated: true,
                pitch0: Some(*pitch0),
                roll0: Some(*roll0),
                error: None,
            },
            Ok(PostureBaseline::Uncalibrated) => DashboardMessage::CalibrationAck {
                calibrated: false,
                pitch0: None,
                roll0: None,
                error: None,
            },
            Err(e) => DashboardMessage::CalibrationAck {
                calibrated: false,
                pitch0: None,
                roll0: None,
                error: Some(e.to_string()),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        DashboardMessage::Error {
            message: message.into(),
        }
    }

    /// Raw sample updates may be thinned out; everything else is always sent
    pub fn is_raw_sample(&self) -> bool {
        matches!(self, DashboardMessage::EmgData { .. })
    }

    pub fn to_json(&self) -> EmgResult<String> {
        serde_json::to_string(self)
            .map_err(|e| EmgError::invalid_config(format!("JSON serialization failed: {}", e)))
    }
}

/// Command received from a dashboard
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardCommand {
    FilterSettings(FilterConfig),
    Calibrate,
    GetStatus,
}

impl DashboardCommand {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
