//! # Irradiance Node
//!
//! Solar irradiance field node: samples the panels, answers gateway polls over
//! the LoRa modem and uploads batched averages over HTTP.

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use irradiance_node::config::{Config, LoggingConfig};
use irradiance_node::link::{ExchangeOutcome, LinkSession};
use irradiance_node::radio::SerialModem;
use irradiance_node::sensors::conversion::BENCH_PANEL_CALIBRATION;
use irradiance_node::sensors::{LocalClock, SimulatedPanels};
use irradiance_node::telemetry::{SnapshotLogger, TelemetryAccumulator};
use irradiance_node::upload::{ReqwestTransport, Uploader};

/// Config file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Samples between status log messages
const STATS_LOG_INTERVAL_SAMPLES: u64 = 30;

/// Bench swell period for the simulated panels, in samples
const SIMULATED_PERIOD_SAMPLES: u32 = 360;

/// Main entry point for the irradiance node
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument, or `config/default.toml`)
///    - Set up logging to stderr and, if configured, a daily log file,
///      then report where the configuration came from
///    - Open the LoRa modem and assemble the node
///
/// 2. **Main Loop**
///    - Radio interval: answer at most one gateway poll
///    - Sampling interval: read panels, accumulate, log, upload
///    - Handle Ctrl+C for graceful shutdown
///
/// # Errors
///
/// Returns error if:
/// - Configuration is invalid
/// - No radio modem is found
/// - The snapshot log directory cannot be created
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path))?;

    let _log_guard = init_logging(&config.logging)?;
    info!("Irradiance Node v{} starting...", env!("CARGO_PKG_VERSION"));
    config.log_origin();
    info!(
        "Node {} ({}) polled by gateway {}",
        config.node.address, config.node.tag, config.node.gateway_address
    );

    let device_paths: Vec<&str> = config.radio.device_paths.iter().map(String::as_str).collect();
    let modem = SerialModem::open_with_paths(&device_paths, config.radio.baud_rate)?;
    info!("LoRa modem opened at: {}", modem.device_path());

    let session = LinkSession::new(modem, config.link_settings());
    let accumulator = TelemetryAccumulator::new(config.accumulator_settings())?;

    let mut source = SimulatedPanels::new(
        config.sampling.simulated_irradiance,
        config.sampling.simulated_swing,
        SIMULATED_PERIOD_SAMPLES,
    );
    if config.sampling.apply_panel_calibration {
        source = source.with_calibration(BENCH_PANEL_CALIBRATION);
    }
    if config.sampling.calibration_mode {
        info!("Calibration mode: averaging reference cell over {} samples", config.accumulator.calibration_threshold);
        source = source.with_reference_cell();
    }

    let mut node = irradiance_node::node::TelemetryNode::new(session, accumulator, source, LocalClock)
        .with_expected_gateway(config.node.gateway_address);

    if config.upload.enabled {
        let transport = ReqwestTransport::new(Duration::from_millis(config.upload.timeout_ms))?;
        node = node.with_uploader(
            Uploader::new(transport, config.upload_targets()),
            config.upload.fifteen_second_enabled,
        );
        info!("Uploading to {}", config.upload.server);
    } else {
        info!("HTTP upload disabled");
    }

    if config.telemetry.enabled {
        let logger = SnapshotLogger::new(
            &config.telemetry.log_dir,
            config.telemetry.max_records_per_file,
            config.telemetry.max_files_to_keep,
        )?;
        node = node.with_logger(logger);
    }

    let mut radio_interval = interval(Duration::from_millis(config.radio.cycle_ms));
    radio_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sample_interval = interval(Duration::from_millis(config.sampling.interval_ms));
    sample_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Sampling every {} ms", config.sampling.interval_ms);
    info!("Press Ctrl+C to exit");

    let mut last_logged_samples: u64 = 0;

    // Main loop
    loop {
        tokio::select! {
            _ = radio_interval.tick() => {
                match node.radio_cycle().await {
                    Ok(ExchangeOutcome::NoActivity) => {}
                    Ok(outcome) => debug!("Radio exchange: {:?}", outcome),
                    Err(e) => warn!("Radio cycle failed: {}", e),
                }
            }

            _ = sample_interval.tick() => {
                if let Err(e) = node.sample_cycle().await {
                    warn!("Sample cycle failed: {}", e);
                    continue;
                }

                let stats = node.stats();
                if stats.samples - last_logged_samples >= STATS_LOG_INTERVAL_SAMPLES {
                    info!(
                        "{} samples, {} polls answered ({} with data, {} unacknowledged), {} uploads ok, {} failed",
                        stats.samples, stats.polls_answered, stats.payloads_delivered,
                        stats.missed_acks, stats.uploads_ok, stats.uploads_failed
                    );
                    last_logged_samples = stats.samples;
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                info!("Final stats: {:?}", node.stats());
                break;
            }
        }
    }

    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` directives take precedence over the configured level. The
/// returned guard flushes the file writer on drop.
fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level: tracing::Level = logging
        .level
        .parse()
        .with_context(|| format!("Invalid log level: {}", logging.level))?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let (file_layer, guard) = match &logging.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "irradiance-node.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}
