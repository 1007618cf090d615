//! # Powermon Library
//!
//! Power telemetry agent for a single INA260-class sensor behind an
//! Ethernet controller.
//!
//! This library provides the connectivity bring-up and delivery core:
//! resetting and addressing the network interface, encoding voltage,
//! current and power samples, and shipping them to an HTTP time-series or
//! SQL sink on a fixed cadence that survives any single failure.

pub mod config;
pub mod error;
pub mod link;
pub mod sampler;
pub mod sensor;
pub mod transport;
