//! Reading and snapshot types shared by the sensor, accumulator and upload layers.

use serde::Serialize;

/// Number of panels on the node
pub const PANEL_COUNT: usize = 6;

/// One panel's reading for one sampling cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PanelReading {
    /// Short-circuit current in mA
    pub current_ma: f32,
    /// Panel temperature in °C
    pub temperature_c: f32,
    /// Irradiance in W/m²
    pub irradiance: f32,
}

/// All panels, in panel order
pub type PanelBatch = [PanelReading; PANEL_COUNT];

/// Everything the accumulator needs from one sampling cycle, taken together
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSnapshot {
    pub readings: PanelBatch,
    /// Cross-panel irradiance average, computed by the sensor layer
    pub irradiance_avg: f32,
    /// Independent reference cell, present in calibration setups
    pub reference_irradiance: Option<f32>,
    /// Whatever the clock produced, passed through untouched
    pub timestamp: String,
}

/// Averaged values at the moment a stream completed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragedReading {
    pub irradiance_avg: f32,
    pub per_panel_avg: [f32; PANEL_COUNT],
    pub timestamp: String,
}

impl AveragedReading {
    /// Snapshot of a single cycle, without averaging over time
    pub fn from_snapshot(snapshot: &SensorSnapshot) -> Self {
        Self {
            irradiance_avg: snapshot.irradiance_avg,
            per_panel_avg: snapshot.readings.map(|reading| reading.irradiance),
            timestamp: snapshot.timestamp.clone(),
        }
    }
}

/// Destination stream of an accumulated value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Radio,
    FiveMinute,
    FifteenSecond,
    Calibration,
}
