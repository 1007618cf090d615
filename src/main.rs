//! # Powermon
//!
//! Power telemetry agent: reads an INA260 power monitor and ships
//! voltage/current/power samples to InfluxDB or PostgREST over Ethernet.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use powermon::config::{Config, LoggingConfig};
use powermon::link::host::HostInterface;
use powermon::link::reset::{NoResetLine, ResetLine, SysfsResetLine};
use powermon::link::LinkController;
use powermon::sampler::SamplingLoop;
use powermon::sensor::hwmon::HwmonSensor;
use powermon::transport::HttpTransport;

/// Daily-rotated log file name inside `[logging].directory`
const LOG_FILE_PREFIX: &str = "powermon.log";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(version, about = "Ship power monitor samples to a telemetry sink")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "POWERMON_CONFIG", default_value = "config/default.toml")]
    config: PathBuf,
}

/// Main entry point for Powermon
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate configuration
///    - Set up logging (stdout, optional rotating file)
///
/// 2. **Link Bring-Up**
///    - Pulse the controller reset line
///    - Acquire an address (DHCP or static, per policy)
///
/// 3. **Sampling Loop**
///    - Read sensor, encode, deliver, sleep; forever
///    - Repeat bring-up after sustained link loss
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - Configuration is missing or invalid
/// - The network controller or its reset line is faulty
/// - The power monitor cannot be found
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;

    let _log_guard = init_logging(&config.logging);

    info!("Powermon v{} starting...", env!("CARGO_PKG_VERSION"));

    let reset: Box<dyn ResetLine> = match config.network.reset_gpio {
        Some(gpio) => Box::new(SysfsResetLine::new(gpio)),
        None => Box::new(NoResetLine),
    };
    let chip = HostInterface::new(&config.network.interface)
        .with_dhcp_client(&config.network.dhcp_client);
    info!("Bringing up network interface {}", chip.name());

    let mut link = LinkController::new(chip, reset, config.network.clone());
    let handle = tokio::select! {
        result = link.bring_up() => result.context("Network bring-up failed")?,
        _ = shutdown_signal() => return Ok(()),
    };

    let endpoint = config.endpoint();
    info!(
        "Delivering {:?} samples for {} to {}",
        endpoint.encoding, endpoint.device_id, endpoint.url
    );
    let transport = HttpTransport::new(endpoint)?;

    let sensor = match &config.sensor.hwmon_path {
        Some(path) => HwmonSensor::at(path),
        None => HwmonSensor::open(&config.sensor.hwmon_name)
            .context("Failed to find power monitor")?,
    };
    info!("Reading power monitor at: {}", sensor.dir().display());

    let sampler = SamplingLoop::new(sensor, transport, link, handle, config.loop_settings());
    let stats = sampler.run(shutdown_signal()).await?;

    info!(
        "Total samples delivered: {} of {} iterations",
        stats.delivered, stats.iterations
    );

    Ok(())
}

/// Install the stdout subscriber and, when configured, a rotating log file
///
/// `RUST_LOG` overrides the configured level. The returned guard flushes the
/// file writer when dropped.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            warn!("Could not listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_default_config_path() {
        let args = Args::try_parse_from(["powermon"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config/default.toml"));
    }

    #[test]
    fn test_config_path_flag() {
        let args = Args::try_parse_from(["powermon", "--config", "/etc/powermon.toml"]).unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/powermon.toml"));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.device.device_id, "monitor_01");
        assert_eq!(config.sink.measurement, "power_data");
    }
}
