//! # Sampling Loop
//!
//! Runs read -> encode -> deliver -> sleep forever.
//!
//! Each iteration produces an [`IterationReport`]; the loop logs it, counts
//! it and moves on. A single bad reading or failed delivery never ends the
//! loop. Only a hardware fault while re-bringing-up the link, or the
//! shutdown future completing, returns from [`SamplingLoop::run`].

use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::HardwareError;
use crate::link::chip::NetworkChip;
use crate::link::reset::ResetLine;
use crate::link::{InterfaceHandle, LinkController};
use crate::sensor::{Sample, SensorError, SensorSource};
use crate::transport::encoding::EncodeError;
use crate::transport::{DeliveryOutcome, TelemetrySink};

/// Cadence and recovery settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Sleep between iterations
    pub period: Duration,
    /// Stamp samples with the current Unix time
    pub timestamps: bool,
    /// Consecutive link-level failures before bring-up is repeated (0 = never)
    pub rebring_up_after: u32,
}

/// What happened in one iteration
#[derive(Debug)]
pub enum IterationReport {
    /// A delivery was attempted
    Sent(DeliveryOutcome),
    /// No sample this time
    SensorFailed(SensorError),
    /// Sample could not be encoded; nothing was sent
    EncodeFailed(EncodeError),
}

/// Counters over the loop's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub transport_failures: u64,
    pub encode_failures: u64,
    pub sensor_failures: u64,
    pub rebring_ups: u64,
    /// Re-bring-ups that ended without an address
    pub failed_rebring_ups: u64,
}

/// Sampling Loop
pub struct SamplingLoop<S, T, C, R> {
    sensor: S,
    sink: T,
    link: LinkController<C, R>,
    handle: InterfaceHandle,
    settings: LoopSettings,
    stats: LoopStats,
    link_failures: u32,
}

impl<S, T, C, R> SamplingLoop<S, T, C, R>
where
    S: SensorSource,
    T: TelemetrySink,
    C: NetworkChip,
    R: ResetLine,
{
    /// Build the loop around an already brought-up link
    pub fn new(
        sensor: S,
        sink: T,
        link: LinkController<C, R>,
        handle: InterfaceHandle,
        settings: LoopSettings,
    ) -> Self {
        Self {
            sensor,
            sink,
            link,
            handle,
            settings,
            stats: LoopStats::default(),
            link_failures: 0,
        }
    }

    /// Acquire, encode and deliver one sample
    pub async fn run_iteration(&mut self) -> IterationReport {
        let reading = match self.sensor.read() {
            Ok(reading) => reading,
            Err(e) => return IterationReport::SensorFailed(e),
        };

        info!(
            "Voltage: {:.2} V, Current: {:.2} mA, Power: {:.2} mW",
            reading.voltage,
            reading.current * 1000.0,
            reading.power * 1000.0
        );

        let timestamp = self.settings.timestamps.then(|| chrono::Utc::now().timestamp());
        let sample = Sample::from_reading(reading, timestamp);

        let payload = match self.sink.encode(&sample) {
            Ok(payload) => payload,
            Err(e) => return IterationReport::EncodeFailed(e),
        };

        IterationReport::Sent(self.sink.deliver(payload, &self.handle).await)
    }

    /// Log and count one report, tracking consecutive link-level failures
    fn record(&mut self, report: IterationReport) {
        self.stats.iterations += 1;

        match report {
            IterationReport::Sent(DeliveryOutcome::Delivered) => {
                info!("Sample delivered");
                self.stats.delivered += 1;
                self.link_failures = 0;
            }
            IterationReport::Sent(DeliveryOutcome::RemoteRejected { status, body }) => {
                warn!("Sink rejected sample with status {}: {}", status, body);
                self.stats.rejected += 1;
                self.link_failures = 0;
            }
            IterationReport::Sent(DeliveryOutcome::TransportFailed(e)) => {
                warn!("Failed to send sample: {}", e);
                self.stats.transport_failures += 1;
                if e.is_link_level() {
                    self.link_failures += 1;
                }
            }
            IterationReport::EncodeFailed(e) => {
                warn!("Failed to encode sample: {}", e);
                self.stats.encode_failures += 1;
            }
            IterationReport::SensorFailed(e) => {
                warn!("Failed to read sensor: {}", e);
                self.stats.sensor_failures += 1;
            }
        }
    }

    fn needs_rebring_up(&self) -> bool {
        self.settings.rebring_up_after > 0 && self.link_failures >= self.settings.rebring_up_after
    }

    /// Run until `shutdown` completes
    ///
    /// # Errors
    ///
    /// Returns `HardwareError` if repeating bring-up after link loss hits a
    /// hardware fault.
    pub async fn run<F: Future>(mut self, shutdown: F) -> Result<LoopStats, HardwareError> {
        tokio::pin!(shutdown);

        info!("Starting sampling loop every {:?}", self.settings.period);

        loop {
            let report = self.run_iteration().await;
            self.record(report);

            if self.needs_rebring_up() {
                warn!(
                    "{} consecutive link failures, bringing the link up again",
                    self.link_failures
                );

                let result = tokio::select! {
                    result = self.link.try_bring_up() => Some(result),
                    _ = &mut shutdown => None,
                };

                match result {
                    Some(Ok(Some(handle))) => {
                        info!("Link restored: {} on {}", handle.ip(), handle.mac());
                        self.handle = handle;
                        self.link_failures = 0;
                        self.stats.rebring_ups += 1;
                    }
                    Some(Ok(None)) => {
                        warn!("Link still down, sampling continues on the old handle");
                        self.stats.failed_rebring_ups += 1;
                    }
                    Some(Err(e)) => {
                        error!("Link bring-up failed: {}", e);
                        return Err(e);
                    }
                    None => break,
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.period) => {}
                _ = &mut shutdown => break,
            }
        }

        info!("Sampling loop stopped: {:?}", self.stats);
        Ok(self.stats)
    }
}
