//! # Telemetry Encoding
//!
//! Turns a `Sample` into a request body.
//!
//! Both encodings carry the same schema: measurement name, `device_id` and
//! `location` tags, `voltage`/`current`/`power` fields and an optional Unix
//! timestamp in seconds.

use serde::{Deserialize, Serialize};
use std::fmt::Write;
use thiserror::Error;

use super::EndpointConfig;
use crate::sensor::Sample;

/// Content type for line-protocol bodies
pub const LINE_PROTOCOL_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for JSON bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Wire format used for every delivery of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// `power_data,device_id=..,location=.. voltage=..,current=..,power=.. [ts]`
    #[default]
    LineProtocol,
    /// `{"device_id", "location", "voltage", "current", "power", "timestamp"}`
    Json,
}

/// Encoded request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: String,
    pub content_type: &'static str,
}

/// Sample cannot be represented in the chosen encoding
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    #[error("{field} is not a finite number ({value})")]
    NonFinite { field: &'static str, value: f64 },

    #[error("JSON serialization failed: {0}")]
    Json(String),
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    device_id: &'a str,
    location: &'a str,
    voltage: f64,
    current: f64,
    power: f64,
    timestamp: Option<i64>,
}

impl Encoding {
    pub fn content_type(self) -> &'static str {
        match self {
            Encoding::LineProtocol => LINE_PROTOCOL_CONTENT_TYPE,
            Encoding::Json => JSON_CONTENT_TYPE,
        }
    }

    /// Encode `sample` with the tags from `endpoint`
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::NonFinite` for NaN or infinite readings.
    pub fn encode(self, endpoint: &EndpointConfig, sample: &Sample) -> Result<Payload, EncodeError> {
        check_finite(sample)?;

        let body = match self {
            Encoding::LineProtocol => encode_line_protocol(
                &endpoint.measurement,
                &endpoint.device_id,
                &endpoint.location,
                sample,
            ),
            Encoding::Json => encode_json(&endpoint.device_id, &endpoint.location, sample)?,
        };

        Ok(Payload {
            body,
            content_type: self.content_type(),
        })
    }
}

fn check_finite(sample: &Sample) -> Result<(), EncodeError> {
    for (field, value) in [
        ("voltage", sample.voltage),
        ("current", sample.current),
        ("power", sample.power),
    ] {
        if !value.is_finite() {
            return Err(EncodeError::NonFinite { field, value });
        }
    }
    Ok(())
}

/// Build one line-protocol record with fields at 2 decimal places
///
/// An empty `location` omits the tag.
pub fn encode_line_protocol(measurement: &str, device_id: &str, location: &str, sample: &Sample) -> String {
    let mut line = String::with_capacity(96);
    line.push_str(&escape(measurement, &[',', ' ']));
    line.push_str(",device_id=");
    line.push_str(&escape(device_id, &[',', '=', ' ']));
    if !location.is_empty() {
        line.push_str(",location=");
        line.push_str(&escape(location, &[',', '=', ' ']));
    }

    // Writing to a String cannot fail
    let _ = write!(
        line,
        " voltage={:.2},current={:.2},power={:.2}",
        sample.voltage, sample.current, sample.power
    );
    if let Some(ts) = sample.timestamp {
        let _ = write!(line, " {}", ts);
    }

    line
}

fn encode_json(device_id: &str, location: &str, sample: &Sample) -> Result<String, EncodeError> {
    let record = JsonRecord {
        device_id,
        location,
        voltage: sample.voltage,
        current: sample.current,
        power: sample.power,
        timestamp: sample.timestamp,
    };
    serde_json::to_string(&record).map_err(|e| EncodeError::Json(e.to_string()))
}

/// Backslash-escape `special` characters (and backslashes)
fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
