//! Session recorder and CSV export
//!
//! The log is append-only and ordered by capture time. A single writer (the
//! ingest coordinator) appends; exports copy the matching tail under a read
//! lock and render it after the lock is released.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use emg_core::{EmgError, EmgResult, RecordKind, SessionRecord};
use parking_lot::RwLock;
use std::fmt::Write;
use std::str::FromStr;
use tracing::{debug, info};

/// CSV header of every export
pub const CSV_HEADER: &str =
    "timestamp,channel1,channel2,rms1,rms2,mean1,mean2,imbalance,pitch,roll,postureScore";

/// Time span selected for an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportRange {
    TenMinutes,
    ThirtyMinutes,
    OneHour,
    Full,
}

impl ExportRange {
    /// Look-back window, `None` for the whole session
    pub fn duration(&self) -> Option<Duration> {
        match self {
            ExportRange::TenMinutes => Some(Duration::minutes(10)),
            ExportRange::ThirtyMinutes => Some(Duration::minutes(30)),
            ExportRange::OneHour => Some(Duration::hours(1)),
            ExportRange::Full => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportRange::TenMinutes => "10m",
            ExportRange::ThirtyMinutes => "30m",
            ExportRange::OneHour => "1h",
            ExportRange::Full => "full",
        }
    }
}

impl FromStr for ExportRange {
    type Err = EmgError;

    fn from_str(value: &str) -> EmgResult<Self> {
        match value.trim() {
            "10m" => Ok(ExportRange::TenMinutes),
            "30m" => Ok(ExportRange::ThirtyMinutes),
            "1h" => Ok(ExportRange::OneHour),
            "full" => Ok(ExportRange::Full),
            other => Err(EmgError::InvalidExportRange {
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only log of everything the hub processed in this session
#[derive(Debug, Default)]
pub struct SessionRecorder {
    records: RwLock<Vec<SessionRecord>>,
}

impl SessionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record; capture times never go backwards
    pub fn append(&self, kind: RecordKind, captured_at: DateTime<Utc>) {
        let mut records = self.records.write();
        let captured_at = match records.last() {
            Some(last) if last.captured_at > captured_at => last.captured_at,
            _ => captured_at,
        };
        records.push(SessionRecord { captured_at, kind });
    }

    /// Drop everything and start a new session
    pub fn clear(&self) {
        let mut records = self.records.write();
        let discarded = records.len();
        records.clear();
        info!(discarded, "Session recorder cleared");
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Capture times of the first and last record
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let records = self.records.read();
        Some((records.first()?.captured_at, records.last()?.captured_at))
    }

    /// Copy of the records captured in `[now - range, now]`
    pub fn snapshot(&self, range: ExportRange, now: DateTime<Utc>) -> Vec<SessionRecord> {
        let records = self.records.read();
        let end = records.partition_point(|r| r.captured_at <= now);
        let start = match range.duration() {
            Some(duration) => {
                let from = now - duration;
                records[..end].partition_point(|r| r.captured_at < from)
            }
            None => 0,
        };
        records[start..end].to_vec()
    }

    /// Render the selected range as CSV
    pub fn export_csv(&self, range: ExportRange, now: DateTime<Utc>) -> String {
        let snapshot = self.snapshot(range, now);
        debug!(range = range.as_str(), rows = snapshot.len(), "Rendering CSV export");
        render_csv(&snapshot)
    }
}

/// Render records as CSV; absent columns stay empty
pub fn render_csv(records: &[SessionRecord]) -> String {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + records.len() * 64);
    out.push_str(CSV_HEADER);
    out.push('\n');

    for record in records {
        let timestamp = record.captured_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        // Writing into a String cannot fail
        let _ = match &record.kind {
            RecordKind::Sample(s) => writeln!(
                out,
                "{},{},{},,,,,,{},{},{}",
                timestamp,
                s.filtered1,
                s.filtered2,
                opt(s.orientation.map(|o| o.pitch)),
                opt(s.orientation.map(|o| o.roll)),
                opt(s.posture_score),
            ),
            RecordKind::Stats(w) => writeln!(
                out,
                "{},,,{},{},{},{},{},{},{},{}",
                timestamp,
                w.rms1,
                w.rms2,
                w.mean1,
                w.mean2,
                w.imbalance,
                opt(w.pitch),
                opt(w.roll),
                opt(w.posture_score),
            ),
        };
    }

    out
}

fn opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
