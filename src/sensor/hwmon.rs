//! # hwmon Sensor
//!
//! Reads an INA2xx power monitor through the Linux hwmon class.
//!
//! ## Attributes
//!
//! - `in1_input`: bus voltage (mV)
//! - `curr1_input`: current (mA)
//! - `power1_input`: power (uW)

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{Reading, SensorError, SensorSource};

/// Root of the hwmon class
const HWMON_ROOT: &str = "/sys/class/hwmon";

/// Power monitor exposed by a hwmon driver
#[derive(Debug)]
pub struct HwmonSensor {
    dir: PathBuf,
}

impl HwmonSensor {
    /// Find the first hwmon device whose `name` attribute equals `name`
    ///
    /// # Errors
    ///
    /// - `NotFound`: no matching device
    /// - `Io`: the hwmon class directory cannot be listed
    pub fn open(name: &str) -> Result<Self, SensorError> {
        Self::discover(Path::new(HWMON_ROOT), name)
    }

    /// Same as [`HwmonSensor::open`] under an alternate root
    pub fn discover(root: &Path, name: &str) -> Result<Self, SensorError> {
        let mut entries: Vec<PathBuf> = fs::read_dir(root)
            .map_err(|source| SensorError::Io {
                path: root.to_path_buf(),
                source,
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();

        // Sort for deterministic selection when several monitors are present
        entries.sort();

        for dir in entries {
            match fs::read_to_string(dir.join("name")) {
                Ok(found) if found.trim() == name => {
                    info!("Found {} power monitor at: {}", name, dir.display());
                    return Ok(Self { dir });
                }
                Ok(found) => debug!("Skipping hwmon {} ({})", dir.display(), found.trim()),
                Err(e) => debug!("Could not read name of {}: {}", dir.display(), e),
            }
        }

        Err(SensorError::NotFound(format!(
            "no hwmon device named {} under {}",
            name,
            root.display()
        )))
    }

    /// Use a known hwmon directory
    pub fn at<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_attr(&self, attr: &str) -> Result<f64, SensorError> {
        let path = self.dir.join(attr);
        let raw = fs::read_to_string(&path).map_err(|source| SensorError::Io {
            path: path.clone(),
            source,
        })?;

        raw.trim()
            .parse::<i64>()
            .map(|v| v as f64)
            .map_err(|_| SensorError::Parse {
                path,
                value: raw.trim().to_string(),
            })
    }
}

impl SensorSource for HwmonSensor {
    fn read(&mut self) -> Result<Reading, SensorError> {
        Ok(Reading {
            voltage: self.read_attr("in1_input")? / 1_000.0,
            current: self.read_attr("curr1_input")? / 1_000.0,
            power: self.read_attr("power1_input")? / 1_000_000.0,
        })
    }
}
