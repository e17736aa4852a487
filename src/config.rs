//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration. API keys may be overridden from the environment:
//! - `UPLOAD_KEY_5MIN`
//! - `UPLOAD_KEY_15SEC`
//! - `UPLOAD_KEY_CALIBRATION`

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{NodeError, Result};
use crate::link::LinkSettings;
use crate::telemetry::AccumulatorSettings;
use crate::upload::{UploadTargets, DEFAULT_SERVER};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub radio: RadioConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub accumulator: AccumulatorConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Where the values came from; reported by [`Config::log_origin`]
    #[serde(skip)]
    pub origin: ConfigOrigin,
}

/// Provenance of a loaded [`Config`]
///
/// Loading runs before the subscriber is installed, so these facts are
/// kept here and logged afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOrigin {
    /// File the values were read from
    pub file: Option<PathBuf>,
    /// Path that was tried and did not exist, so defaults were used
    pub missing_file: Option<PathBuf>,
    /// Environment variables that replaced configured values
    pub env_overrides: Vec<&'static str>,
}

/// Node identity
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    #[serde(default = "default_node_address")]
    pub address: u8,

    /// Expected poller; requests from other addresses are answered but logged
    #[serde(default = "default_gateway_address")]
    pub gateway_address: u8,

    #[serde(default = "default_tag")]
    pub tag: String,
}

/// Radio modem configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RadioConfig {
    #[serde(default = "default_device_paths")]
    pub device_paths: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Period between link polls in the main loop
    #[serde(default = "default_radio_cycle_ms")]
    pub cycle_ms: u64,
}

/// Sensor sampling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SamplingConfig {
    #[serde(default = "default_sampling_interval_ms")]
    pub interval_ms: u64,

    #[serde(default)]
    pub calibration_mode: bool,

    /// Apply the per-panel linear correction after Isc conversion
    #[serde(default = "default_apply_panel_calibration")]
    pub apply_panel_calibration: bool,

    #[serde(default = "default_simulated_irradiance")]
    pub simulated_irradiance: f32,

    #[serde(default = "default_simulated_swing")]
    pub simulated_swing: f32,
}

/// Accumulator thresholds, in samples
#[derive(Debug, Deserialize, Clone)]
pub struct AccumulatorConfig {
    #[serde(default = "default_radio_ready_threshold")]
    pub radio_ready_threshold: u32,

    #[serde(default = "default_radio_stale_threshold")]
    pub radio_stale_threshold: u32,

    #[serde(default = "default_cloud_threshold")]
    pub cloud_threshold: u32,

    #[serde(default = "default_calibration_threshold")]
    pub calibration_threshold: u32,
}

/// HTTP upload configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default)]
    pub five_minute_key: String,

    #[serde(default)]
    pub fifteen_second_key: String,

    #[serde(default)]
    pub calibration_key: String,

    #[serde(default = "default_fifteen_second_enabled")]
    pub fifteen_second_enabled: bool,

    #[serde(default = "default_upload_timeout_ms")]
    pub timeout_ms: u64,
}

/// Snapshot log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write a daily rolling log file here
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_node_address() -> u8 { 22 }
fn default_gateway_address() -> u8 { 30 }
fn default_tag() -> String { "NODE1".to_string() }

fn default_device_paths() -> Vec<String> {
    crate::radio::DEFAULT_DEVICE_PATHS.iter().map(|p| p.to_string()).collect()
}
fn default_baud_rate() -> u32 { crate::radio::MODEM_BAUD_RATE }
fn default_timeout_ms() -> u64 { 50 }
fn default_poll_interval_ms() -> u64 { 2 }
fn default_radio_cycle_ms() -> u64 { 100 }

fn default_sampling_interval_ms() -> u64 { 10_000 }
fn default_apply_panel_calibration() -> bool { true }
fn default_simulated_irradiance() -> f32 { 750.0 }
fn default_simulated_swing() -> f32 { 150.0 }

fn default_radio_ready_threshold() -> u32 { 12 }
fn default_radio_stale_threshold() -> u32 { 30 }
fn default_cloud_threshold() -> u32 { 30 }
fn default_calibration_threshold() -> u32 { 90 }

fn default_server() -> String { DEFAULT_SERVER.to_string() }
fn default_fifteen_second_enabled() -> bool { true }
fn default_upload_timeout_ms() -> u64 { 10_000 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: default_node_address(),
            gateway_address: default_gateway_address(),
            tag: default_tag(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            device_paths: default_device_paths(),
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            cycle_ms: default_radio_cycle_ms(),
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sampling_interval_ms(),
            calibration_mode: false,
            apply_panel_calibration: default_apply_panel_calibration(),
            simulated_irradiance: default_simulated_irradiance(),
            simulated_swing: default_simulated_swing(),
        }
    }
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            radio_ready_threshold: default_radio_ready_threshold(),
            radio_stale_threshold: default_radio_stale_threshold(),
            cloud_threshold: default_cloud_threshold(),
            calibration_threshold: default_calibration_threshold(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: default_server(),
            five_minute_key: String::new(),
            fifteen_second_key: String::new(),
            calibration_key: String::new(),
            fifteen_second_enabled: default_fifteen_second_enabled(),
            timeout_ms: default_upload_timeout_ms(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> NodeError {
    NodeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use irradiance_node::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml(&contents, |name| std::env::var(name).ok())?;
        config.origin.file = Some(path.as_ref().to_path_buf());
        Ok(config)
    }

    /// Load from `path`, or use defaults if the file does not exist
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read, parsed or validated
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        match Self::load(path.as_ref()) {
            Err(NodeError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                let mut config = Self::from_toml("", |name| std::env::var(name).ok())?;
                config.origin.missing_file = Some(path.as_ref().to_path_buf());
                Ok(config)
            }
            result => result,
        }
    }

    /// Report where the configuration came from
    ///
    /// Call once the tracing subscriber is installed.
    pub fn log_origin(&self) {
        if let Some(file) = &self.origin.file {
            info!("Loaded config from {}", file.display());
        }
        if let Some(missing) = &self.origin.missing_file {
            info!("No config at {}, using defaults", missing.display());
        }
        for name in &self.origin.env_overrides {
            info!("Using {} from environment", name);
        }
    }

    /// Parse, apply overrides from `lookup`, and validate
    ///
    /// # Errors
    ///
    /// Returns error if parsing or validation fails
    pub fn from_toml<F>(contents: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = toml::from_str(contents)?;
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, key) in [
            ("UPLOAD_KEY_5MIN", &mut self.upload.five_minute_key),
            ("UPLOAD_KEY_15SEC", &mut self.upload.fifteen_second_key),
            ("UPLOAD_KEY_CALIBRATION", &mut self.upload.calibration_key),
        ] {
            if let Some(value) = lookup(name) {
                *key = value;
                self.origin.env_overrides.push(name);
            }
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Node identity
        if self.node.tag.is_empty() || self.node.tag.contains('|') {
            return Err(invalid("node tag must be non-empty and must not contain '|'"));
        }

        if self.node.address == self.node.gateway_address {
            return Err(invalid("node address must differ from gateway address"));
        }

        // Radio
        if self.radio.device_paths.is_empty() {
            return Err(invalid("radio device_paths cannot be empty"));
        }

        if ![9600, 19200, 38400, 57600, 115200].contains(&self.radio.baud_rate) {
            return Err(invalid("baud_rate must be one of: 9600, 19200, 38400, 57600, 115200"));
        }

        if self.radio.timeout_ms == 0 || self.radio.timeout_ms > 10000 {
            return Err(invalid("timeout_ms must be between 1 and 10000"));
        }

        if self.radio.poll_interval_ms == 0 || self.radio.poll_interval_ms > self.radio.timeout_ms {
            return Err(invalid("poll_interval_ms must be between 1 and timeout_ms"));
        }

        if self.radio.cycle_ms == 0 || self.radio.cycle_ms > 60000 {
            return Err(invalid("radio cycle_ms must be between 1 and 60000"));
        }

        // Sampling
        if self.sampling.interval_ms == 0 || self.sampling.interval_ms > 3_600_000 {
            return Err(invalid("sampling interval_ms must be between 1 and 3600000"));
        }

        if self.sampling.simulated_irradiance < 0.0 || self.sampling.simulated_swing < 0.0 {
            return Err(invalid("simulated irradiance and swing cannot be negative"));
        }

        // Thresholds
        self.accumulator_settings().validate()?;

        // Upload
        if self.upload.enabled {
            if !self.upload.server.starts_with("http://") && !self.upload.server.starts_with("https://") {
                return Err(invalid(format!(
                    "Invalid upload server: {} (must start with http:// or https://)",
                    self.upload.server
                )));
            }

            let mut required = vec![("five_minute_key", &self.upload.five_minute_key)];
            if self.upload.fifteen_second_enabled {
                required.push(("fifteen_second_key", &self.upload.fifteen_second_key));
            }
            if self.sampling.calibration_mode {
                required.push(("calibration_key", &self.upload.calibration_key));
            }
            for (name, key) in required {
                if key.is_empty() {
                    return Err(invalid(format!("upload {} cannot be empty when upload is enabled", name)));
                }
            }

            if self.upload.timeout_ms == 0 || self.upload.timeout_ms > 60000 {
                return Err(invalid("upload timeout_ms must be between 1 and 60000"));
            }
        }

        // Snapshot log
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }

    pub fn accumulator_settings(&self) -> AccumulatorSettings {
        AccumulatorSettings {
            tag: self.node.tag.clone(),
            radio_ready_threshold: self.accumulator.radio_ready_threshold,
            radio_stale_threshold: self.accumulator.radio_stale_threshold,
            cloud_threshold: self.accumulator.cloud_threshold,
            calibration_threshold: self.accumulator.calibration_threshold,
            calibration_mode: self.sampling.calibration_mode,
        }
    }

    pub fn link_settings(&self) -> LinkSettings {
        LinkSettings {
            address: self.node.address,
            timeout: Duration::from_millis(self.radio.timeout_ms),
            poll_interval: Duration::from_millis(self.radio.poll_interval_ms),
        }
    }

    pub fn upload_targets(&self) -> UploadTargets {
        UploadTargets {
            server: self.upload.server.clone(),
            five_minute_key: self.upload.five_minute_key.clone(),
            fifteen_second_key: self.upload.fifteen_second_key.clone(),
            calibration_key: self.upload.calibration_key.clone(),
        }
    }
}
