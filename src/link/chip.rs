//! Trait abstraction for the Ethernet controller to enable testing

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::{IfConfig, MacAddress};
use crate::error::HardwareError;

/// Identity reported by the controller after reset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChipInfo {
    /// Chip identifier (e.g. "w5500")
    pub chip: String,
    /// MAC address the controller is actually using
    pub mac: MacAddress,
}

/// Why a DHCP lease could not be obtained
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaseError {
    /// No offer arrived in time
    #[error("no DHCP lease within {0:?}")]
    Timeout(Duration),

    /// Lease completed but left the interface at 0.0.0.0
    #[error("DHCP produced the unspecified address")]
    UnspecifiedAddress,

    /// Cable unplugged or PHY down
    #[error("link has no carrier")]
    NoCarrier,

    /// Controller fault while negotiating; not retried
    #[error(transparent)]
    Hardware(#[from] HardwareError),
}

/// Operations the bring-up controller needs from an Ethernet controller
#[async_trait]
pub trait NetworkChip: Send {
    /// Probe the controller after its reset line was released and program the MAC
    async fn initialize(&mut self, mac: MacAddress) -> Result<ChipInfo, HardwareError>;

    /// Run one DHCP exchange, waiting at most `timeout`
    async fn request_lease(&mut self, timeout: Duration) -> Result<IfConfig, LeaseError>;

    /// Apply address, mask, gateway and DNS without any network round-trip
    async fn apply_static(&mut self, config: &IfConfig) -> Result<(), HardwareError>;
}
