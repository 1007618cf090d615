//! # Error Types
//!
//! Custom error types for Powermon using `thiserror`.
//!
//! Only [`PowermonError`] ever stops the process. Per-iteration failures
//! (sensor, encoding, delivery) have their own types in their modules and
//! are absorbed by the sampling loop.

use thiserror::Error;

/// Unrecoverable hardware fault raised during link bring-up
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// Reset line could not be driven
    #[error("reset line fault: {0}")]
    ResetLine(String),

    /// Network controller did not answer on its bus
    #[error("network controller unresponsive: {0}")]
    BusUnresponsive(String),

    /// Interface refused the requested addressing
    #[error("interface configuration failed: {0}")]
    Configure(String),
}

/// Main error type for Powermon
#[derive(Debug, Error)]
pub enum PowermonError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Hardware faults (fatal)
    #[error("Hardware fault: {0}")]
    Hardware(#[from] HardwareError),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Powermon
pub type Result<T> = std::result::Result<T, PowermonError>;
