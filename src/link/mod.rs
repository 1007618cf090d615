//! # Link Bring-Up Module
//!
//! Brings the Ethernet controller from reset to an addressed interface.
//!
//! This module handles:
//! - Sequencing the hardware reset line (hold >= 1s, then release)
//! - Probing the controller and programming its MAC
//! - DHCP lease acquisition with an explicit failure policy
//! - Static addressing when DHCP is disabled or falls back
//!
//! The only error that escapes [`LinkController::bring_up`] is a
//! [`HardwareError`]; DHCP trouble is resolved inside according to
//! [`DhcpPolicy`].

pub mod chip;
pub mod host;
pub mod reset;

use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::NetworkConfig;
use crate::error::HardwareError;
use chip::{ChipInfo, LeaseError, NetworkChip};
use reset::ResetLine;

/// 6-byte Ethernet hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct MacAddress(pub [u8; 6]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.trim().split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| format!("MAC address too short: {}", s))?;
            *byte = u8::from_str_radix(part, 16)
                .map_err(|e| format!("invalid MAC octet {:?}: {}", part, e))?;
        }
        if parts.next().is_some() {
            return Err(format!("MAC address too long: {}", s));
        }
        Ok(MacAddress(bytes))
    }
}

/// IPv4 interface configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfConfig {
    pub ip: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

/// How the interface got its address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Dhcp,
    Static,
    /// DHCP failed and the configured static address was applied
    StaticFallback,
}

impl fmt::Display for Addressing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addressing::Dhcp => write!(f, "DHCP"),
            Addressing::Static => write!(f, "static"),
            Addressing::StaticFallback => write!(f, "static fallback"),
        }
    }
}

/// Addressed network interface
///
/// Created only by [`LinkController`]. The transport reads it, nothing
/// mutates it; recovering from link loss means bringing the link up again and
/// replacing the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceHandle {
    chip: String,
    mac: MacAddress,
    ifconfig: IfConfig,
    addressing: Addressing,
}

impl InterfaceHandle {
    pub(crate) fn new(chip: String, mac: MacAddress, ifconfig: IfConfig, addressing: Addressing) -> Self {
        Self {
            chip,
            mac,
            ifconfig,
            addressing,
        }
    }

    pub fn chip(&self) -> &str {
        &self.chip
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ifconfig.ip
    }

    pub fn ifconfig(&self) -> &IfConfig {
        &self.ifconfig
    }

    pub fn addressing(&self) -> Addressing {
        self.addressing
    }
}

/// What to do when a DHCP attempt fails
///
/// The two policies are not equivalent: `FallbackToStatic` always returns
/// after one attempt, `RetryForever` only returns once a lease is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpPolicy {
    /// Apply the configured static address immediately; DHCP is not retried
    FallbackToStatic,
    /// Sleep `backoff` and request again, never using the static address
    RetryForever { backoff: Duration },
}

/// Next step of the lease state machine after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStep {
    FallBack,
    RetryAfter(Duration),
}

impl DhcpPolicy {
    pub fn after_failure(&self) -> LeaseStep {
        match *self {
            DhcpPolicy::FallbackToStatic => LeaseStep::FallBack,
            DhcpPolicy::RetryForever { backoff } => LeaseStep::RetryAfter(backoff),
        }
    }
}

/// Link Bring-Up Controller
///
/// Owns the controller and its reset line for the process lifetime so that
/// bring-up can be repeated after link loss.
pub struct LinkController<C, R> {
    chip: C,
    reset: R,
    config: NetworkConfig,
}

impl<C: NetworkChip, R: ResetLine> LinkController<C, R> {
    pub fn new(chip: C, reset: R, config: NetworkConfig) -> Self {
        Self { chip, reset, config }
    }

    /// Reset the controller and bring the interface to an addressed state
    ///
    /// Under [`DhcpPolicy::RetryForever`] this does not return until a lease
    /// is obtained.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError` if the reset line cannot be driven or the
    /// controller does not respond. Everything else is retried or falls back
    /// per the configured [`DhcpPolicy`].
    pub async fn bring_up(&mut self) -> Result<InterfaceHandle, HardwareError> {
        let info = self.prepare().await?;
        let mut attempt: u64 = 1;

        loop {
            match self.address_once(attempt).await? {
                LeaseAttempt::Addressed(ifconfig, addressing) => {
                    return Ok(Self::finish(info, ifconfig, addressing));
                }
                LeaseAttempt::RetryAfter(backoff) => {
                    info!("Retrying DHCP in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Single bring-up pass, used to recover from link loss while sampling
    ///
    /// Same sequence as [`bring_up`](Self::bring_up) but with at most one
    /// lease request. Returns `Ok(None)` when the retry policy wants another
    /// lease attempt; the caller decides when to try again.
    pub async fn try_bring_up(&mut self) -> Result<Option<InterfaceHandle>, HardwareError> {
        let info = self.prepare().await?;

        match self.address_once(1).await? {
            LeaseAttempt::Addressed(ifconfig, addressing) => {
                Ok(Some(Self::finish(info, ifconfig, addressing)))
            }
            LeaseAttempt::RetryAfter(_) => Ok(None),
        }
    }

    async fn prepare(&mut self) -> Result<ChipInfo, HardwareError> {
        self.reset.hold()?;
        tokio::time::sleep(self.config.reset_hold()).await;
        self.reset.release()?;

        self.chip.initialize(self.config.mac).await
    }

    fn finish(info: ChipInfo, ifconfig: IfConfig, addressing: Addressing) -> InterfaceHandle {
        info!("Chip version: {}", info.chip);
        info!("MAC address: {}", info.mac);
        info!("IP address: {} ({})", ifconfig.ip, addressing);

        InterfaceHandle::new(info.chip, info.mac, ifconfig, addressing)
    }

    /// Static configuration, or one lease request followed by the policy step
    async fn address_once(&mut self, attempt: u64) -> Result<LeaseAttempt, HardwareError> {
        if !self.config.dhcp_enabled {
            let ifconfig = self.config.static_ifconfig();
            self.chip.apply_static(&ifconfig).await?;
            return Ok(LeaseAttempt::Addressed(ifconfig, Addressing::Static));
        }

        let failure = match self.chip.request_lease(self.config.dhcp_timeout()).await {
            Ok(lease) if !lease.ip.is_unspecified() => {
                info!("DHCP assigned IP: {} (attempt {})", lease.ip, attempt);
                return Ok(LeaseAttempt::Addressed(lease, Addressing::Dhcp));
            }
            Ok(_) => LeaseError::UnspecifiedAddress,
            Err(LeaseError::Hardware(e)) => return Err(e),
            Err(e) => e,
        };

        match self.config.dhcp_policy().after_failure() {
            LeaseStep::FallBack => {
                warn!("DHCP failed ({}), falling back to static IP", failure);
                let ifconfig = self.config.static_ifconfig();
                self.chip.apply_static(&ifconfig).await?;
                Ok(LeaseAttempt::Addressed(ifconfig, Addressing::StaticFallback))
            }
            LeaseStep::RetryAfter(backoff) => {
                warn!("DHCP attempt {} failed ({})", attempt, failure);
                Ok(LeaseAttempt::RetryAfter(backoff))
            }
        }
    }
}

enum LeaseAttempt {
    Addressed(IfConfig, Addressing),
    RetryAfter(Duration),
}
