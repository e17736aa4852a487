//! # Telemetry Module
//!
//! Turns sampling cycles into the averages each destination wants.
//!
//! This module handles:
//! - Cumulative averaging with threshold latching per stream
//! - Staging the radio payload in a single-slot mailbox
//! - Producing 5-minute, 15-second and calibration averages for upload
//! - Logging produced snapshots to rotating JSONL files

pub mod accumulator;
pub mod logger;
pub mod mailbox;
pub mod streams;
pub mod types;

pub use logger::SnapshotLogger;
pub use mailbox::RadioBuffer;
pub use streams::{AccumulatorSettings, IngestReport, TelemetryAccumulator};
pub use types::{AveragedReading, PanelReading, SensorSnapshot, Stream, PANEL_COUNT};
