//! # Reset Line
//!
//! Drives the Ethernet controller's active-low reset pin.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::HardwareError;

/// Root of the legacy sysfs GPIO interface
const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Hardware reset line of the network controller
pub trait ResetLine: Send {
    /// Hold the controller in reset (RSTn low)
    fn hold(&mut self) -> Result<(), HardwareError>;

    /// Release the controller from reset (RSTn high); the chip starts running
    fn release(&mut self) -> Result<(), HardwareError>;
}

impl<R: ResetLine + ?Sized> ResetLine for Box<R> {
    fn hold(&mut self) -> Result<(), HardwareError> {
        (**self).hold()
    }

    fn release(&mut self) -> Result<(), HardwareError> {
        (**self).release()
    }
}

/// Reset line exported through `/sys/class/gpio/gpioN/value`
///
/// The pin must already be exported and configured as an output.
#[derive(Debug)]
pub struct SysfsResetLine {
    value_path: PathBuf,
}

impl SysfsResetLine {
    /// Use exported GPIO number `gpio`
    pub fn new(gpio: u32) -> Self {
        Self::with_value_path(Path::new(SYSFS_GPIO_ROOT).join(format!("gpio{}", gpio)).join("value"))
    }

    /// Use an explicit `value` attribute path
    pub fn with_value_path<P: Into<PathBuf>>(value_path: P) -> Self {
        Self {
            value_path: value_path.into(),
        }
    }

    fn write_level(&self, level: &str) -> Result<(), HardwareError> {
        debug!("Setting reset line {} to {}", self.value_path.display(), level);
        fs::write(&self.value_path, level).map_err(|e| {
            HardwareError::ResetLine(format!("{}: {}", self.value_path.display(), e))
        })
    }
}

impl ResetLine for SysfsResetLine {
    fn hold(&mut self) -> Result<(), HardwareError> {
        self.write_level("0")
    }

    fn release(&mut self) -> Result<(), HardwareError> {
        self.write_level("1")
    }
}

/// Board without a wired reset line; the controller is reset by power-on only
#[derive(Debug, Default)]
pub struct NoResetLine;

impl ResetLine for NoResetLine {
    fn hold(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }

    fn release(&mut self) -> Result<(), HardwareError> {
        Ok(())
    }
}
