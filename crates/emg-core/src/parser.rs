//! Line-oriented device frame parser
//!
//! Accepted formats:
//!
//! - `E1,E2`
//! - `E1,E2,pitch,roll`
//! - `STATS,rms1,rms2,mean1,mean2,imbalance[,pitch,roll]`
//!
//! Parsing is pure: it never touches session state. Callers decide what to do
//! with a `MalformedFrame` (the ingest path drops and counts it).

use crate::emg_types::{DeviceStats, Orientation, ParsedFrame, SampleFrame};
use crate::error::{EmgError, EmgResult};
use chrono::{DateTime, Utc};

/// Leading token of device-computed statistics lines
pub const STATS_TOKEN: &str = "STATS";

/// Decode one line received at `received_at`
pub fn parse_line(line: &str, received_at: DateTime<Utc>) -> EmgResult<ParsedFrame> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(EmgError::malformed("empty line", line));
    }

    let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();

    if fields[0] == STATS_TOKEN {
        parse_stats(&fields[1..], line, received_at).map(ParsedFrame::Stats)
    } else {
        parse_sample(&fields, line, received_at).map(ParsedFrame::Sample)
    }
}

/// Split a transport message into candidate lines, skipping blank ones
pub fn split_lines(message: &str) -> impl Iterator<Item = &str> {
    message.lines().filter(|l| !l.trim().is_empty())
}

fn parse_sample(fields: &[&str], line: &str, received_at: DateTime<Utc>) -> EmgResult<SampleFrame> {
    match fields.len() {
        2 => {
            let channel1 = parse_field(fields[0], "channel1", line)?;
            let channel2 = parse_field(fields[1], "channel2", line)?;
            Ok(SampleFrame::new(channel1, channel2, None, received_at))
        }
        4 => {
            let channel1 = parse_field(fields[0], "channel1", line)?;
            let channel2 = parse_field(fields[1], "channel2", line)?;
            let pitch = parse_field(fields[2], "pitch", line)?;
            let roll = parse_field(fields[3], "roll", line)?;
            Ok(SampleFrame::new(
                channel1,
                channel2,
                Some(Orientation::new(pitch, roll)),
                received_at,
            ))
        }
        n => Err(EmgError::malformed(
            format!("expected 2 or 4 sample fields, got {}", n),
            line,
        )),
    }
}

fn parse_stats(fields: &[&str], line: &str, received_at: DateTime<Utc>) -> EmgResult<DeviceStats> {
    if fields.len() != 5 && fields.len() != 7 {
        return Err(EmgError::malformed(
            format!("expected 5 or 7 STATS fields, got {}", fields.len()),
            line,
        ));
    }

    let orientation = if fields.len() == 7 {
        Some(Orientation::new(
            parse_field(fields[5], "pitch", line)?,
            parse_field(fields[6], "roll", line)?,
        ))
    } else {
        None
    };

    Ok(DeviceStats {
        rms1: parse_field(fields[0], "rms1", line)?,
        rms2: parse_field(fields[1], "rms2", line)?,
        mean1: parse_field(fields[2], "mean1", line)?,
        mean2: parse_field(fields[3], "mean2", line)?,
        imbalance: parse_field(fields[4], "imbalance", line)?,
        orientation,
        received_at,
    })
}

fn parse_field(field: &str, name: &str, line: &str) -> EmgResult<f64> {
    let value: f64 = field
        .parse()
        .map_err(|_| EmgError::malformed(format!("{} is not numeric: {:?}", name, field), line))?;

    // "nan" and "inf" parse as f64 but would poison the filter state
    if !value.is_finite() {
        return Err(EmgError::malformed(format!("{} is not finite", name), line));
    }

    Ok(value)
}
