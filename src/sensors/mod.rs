//! # Sensors Module
//!
//! Sources of panel readings and timestamps.
//!
//! This module handles:
//! - The [`PanelSource`] seam between acquisition hardware and the node
//! - Isc, thermistor and reference-cell conversions
//! - A deterministic simulated bench for hosts without the sensor bus
//! - Timestamps via [`Clock`]

pub mod clock;
pub mod conversion;

pub use clock::{Clock, LocalClock};

use crate::error::Result;
use crate::telemetry::types::{PanelBatch, PanelReading, PANEL_COUNT};
use conversion::{
    ads_raw_to_celsius, celsius_to_ads_raw, irradiance_to_isc, isc_to_irradiance, reference_cell_irradiance,
    LinearCalibration, DIVIDER_SUPPLY_VOLTS, G_REF, REFERENCE_CELL_VOLTS,
};
use tracing::debug;

/// Produces one reading per panel on demand
pub trait PanelSource: Send {
    /// Read every panel, in panel order
    ///
    /// # Errors
    ///
    /// Returns error if the acquisition hardware fails
    fn read_panels(&mut self) -> Result<PanelBatch>;

    /// Independent reference irradiance, if this source has a reference cell
    fn reference_irradiance(&mut self) -> Result<Option<f32>>;
}

/// Mean irradiance over all panels
pub fn cross_panel_average(readings: &PanelBatch) -> f32 {
    readings.iter().map(|reading| reading.irradiance).sum::<f32>() / PANEL_COUNT as f32
}

/// Deterministic bench: a slow irradiance swell with fixed per-panel offsets
///
/// Thermistor counts and currents are synthesised from the target irradiance
/// and fed back through [`ads_raw_to_celsius`] and [`isc_to_irradiance`], so
/// the conversion path is the one real panels use.
#[derive(Debug, Clone)]
pub struct SimulatedPanels {
    base_irradiance: f32,
    swing: f32,
    period_samples: u32,
    calibration: Option<[LinearCalibration; PANEL_COUNT]>,
    with_reference: bool,
    tick: u32,
}

/// Per-panel offsets from the bench irradiance, W/m²
const PANEL_OFFSETS: [f32; PANEL_COUNT] = [-6.0, -2.5, 0.0, 1.5, 3.0, 4.0];

/// Panel temperature rise per W/m², °C
const TEMPERATURE_RISE: f32 = 0.025;

impl SimulatedPanels {
    pub fn new(base_irradiance: f32, swing: f32, period_samples: u32) -> Self {
        Self {
            base_irradiance,
            swing,
            period_samples: period_samples.max(1),
            calibration: None,
            with_reference: false,
            tick: 0,
        }
    }

    /// Apply a linear correction per panel after Isc conversion
    pub fn with_calibration(mut self, calibration: [LinearCalibration; PANEL_COUNT]) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Also simulate a reference cell
    pub fn with_reference_cell(mut self) -> Self {
        self.with_reference = true;
        self
    }

    fn bench_irradiance(&self) -> f32 {
        let phase = self.tick as f32 / self.period_samples as f32 * std::f32::consts::TAU;
        (self.base_irradiance + self.swing * phase.sin()).max(0.0)
    }
}

impl PanelSource for SimulatedPanels {
    fn read_panels(&mut self) -> Result<PanelBatch> {
        let bench = self.bench_irradiance();
        self.tick = self.tick.wrapping_add(1);

        let mut batch = [PanelReading::default(); PANEL_COUNT];
        for (panel, reading) in batch.iter_mut().enumerate() {
            let target = (bench + PANEL_OFFSETS[panel]).max(0.0);
            let raw = celsius_to_ads_raw(25.0 + target * TEMPERATURE_RISE, DIVIDER_SUPPLY_VOLTS);
            let temperature_c = ads_raw_to_celsius(raw, DIVIDER_SUPPLY_VOLTS);
            let current_ma = irradiance_to_isc(target, temperature_c);
            let calibration = self.calibration.as_ref().map(|all| &all[panel]);

            *reading = PanelReading {
                current_ma,
                temperature_c,
                irradiance: isc_to_irradiance(current_ma, temperature_c, calibration),
            };
        }

        debug!("Simulated bench irradiance {:.2} W/m²", bench);
        Ok(batch)
    }

    fn reference_irradiance(&mut self) -> Result<Option<f32>> {
        if !self.with_reference {
            return Ok(None);
        }
        let volts = self.bench_irradiance() / G_REF * REFERENCE_CELL_VOLTS;
        Ok(Some(reference_cell_irradiance(volts)))
    }
}
