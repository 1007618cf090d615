//! # Sensor Module
//!
//! Power sensor readings (INA260 or compatible).
//!
//! This module handles:
//! - The `SensorSource` seam the sampling loop reads from
//! - Turning a raw reading into a timestamped `Sample`
//! - Reading the kernel hwmon driver (`hwmon` submodule)

pub mod hwmon;

use std::path::PathBuf;
use thiserror::Error;

/// Instantaneous electrical measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Bus voltage in volts
    pub voltage: f64,
    /// Current in amps
    pub current: f64,
    /// Power in watts
    pub power: f64,
}

/// One reading prepared for delivery
///
/// Lives for exactly one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    /// Unix time in seconds
    pub timestamp: Option<i64>,
}

impl Sample {
    pub fn from_reading(reading: Reading, timestamp: Option<i64>) -> Self {
        Self {
            voltage: reading.voltage,
            current: reading.current,
            power: reading.power,
            timestamp,
        }
    }
}

/// Sensor read failures; the loop skips the iteration
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor not found: {0}")]
    NotFound(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unparseable value {value:?} in {}", .path.display())]
    Parse { path: PathBuf, value: String },
}

/// Synchronous source of power readings
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send {
    /// Read voltage, current and power at this instant
    fn read(&mut self) -> Result<Reading, SensorError>;
}
