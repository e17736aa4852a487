//! # Telemetry Accumulator
//!
//! Feeds every sampling cycle into the per-destination streams:
//!
//! | Stream | Policy | Output |
//! |--------|--------|--------|
//! | radio | held until a gateway drains it, evicted when stale | [`RadioBuffer`] text |
//! | 5-minute cloud | restarts every window | [`AveragedReading`] |
//! | 15-second cloud | none, every cycle passes through | [`AveragedReading`] |
//! | calibration | shares the 5-minute window, skips missing readings | reference value |

use super::accumulator::{cumulative_update, AccumulatorState, ResetCause, ResetPolicy, StreamStatus, Tick};
use super::mailbox::RadioBuffer;
use super::types::{AveragedReading, SensorSnapshot, PANEL_COUNT};
use crate::error::{NodeError, Result};
use tracing::{debug, info};

/// Thresholds and identity for the accumulator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatorSettings {
    /// Node tag leading every radio payload (e.g. "NODE1")
    pub tag: String,
    /// Samples per radio average
    pub radio_ready_threshold: u32,
    /// Count after which an undrained radio payload is evicted
    pub radio_stale_threshold: u32,
    /// Samples per cloud upload in normal operation
    pub cloud_threshold: u32,
    /// Samples per cloud upload (and reference average) in calibration mode
    pub calibration_threshold: u32,
    /// Average the reference cell and use the calibration window
    pub calibration_mode: bool,
}

impl AccumulatorSettings {
    /// Check threshold ordering
    ///
    /// # Errors
    ///
    /// Returns `InvalidThresholds` if any threshold is zero or the stale
    /// bound does not exceed the ready threshold
    pub fn validate(&self) -> Result<()> {
        if self.radio_ready_threshold == 0 || self.cloud_threshold == 0 || self.calibration_threshold == 0 {
            return Err(NodeError::InvalidThresholds("thresholds must be greater than 0".to_string()));
        }

        if self.radio_stale_threshold <= self.radio_ready_threshold {
            return Err(NodeError::InvalidThresholds(format!(
                "radio stale threshold {} must exceed ready threshold {}",
                self.radio_stale_threshold, self.radio_ready_threshold
            )));
        }

        Ok(())
    }

    /// Window of the 5-minute stream for the current mode
    pub fn upload_threshold(&self) -> u32 {
        if self.calibration_mode {
            self.calibration_threshold
        } else {
            self.cloud_threshold
        }
    }
}

/// What one ingest produced
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// Radio stream step
    pub radio: Tick,
    /// Completed 5-minute average, if the window closed on this cycle
    pub five_minute: Option<AveragedReading>,
    /// Reference average taken alongside `five_minute` in calibration mode
    pub calibration_reference: Option<f32>,
    /// Pass-through of this cycle
    pub fifteen_second: AveragedReading,
}

/// Per-destination accumulation plus the radio mailbox
#[derive(Debug, Clone)]
pub struct TelemetryAccumulator {
    settings: AccumulatorSettings,
    radio: AccumulatorState,
    mailbox: RadioBuffer,
    last_timestamp: String,
    cloud: AccumulatorState,
    cloud_per_panel: [f32; PANEL_COUNT],
    reference_avg: f32,
    reference_samples: u32,
}

impl TelemetryAccumulator {
    /// # Errors
    ///
    /// Returns error if the settings fail [`AccumulatorSettings::validate`]
    pub fn new(settings: AccumulatorSettings) -> Result<Self> {
        settings.validate()?;

        let radio = AccumulatorState::new(
            settings.radio_ready_threshold,
            ResetPolicy::HoldUntilConsumed { stale_after: Some(settings.radio_stale_threshold) },
        );
        let cloud = AccumulatorState::new(settings.upload_threshold(), ResetPolicy::EveryWindow);

        Ok(Self {
            settings,
            radio,
            mailbox: RadioBuffer::new(),
            last_timestamp: String::new(),
            cloud,
            cloud_per_panel: [0.0; PANEL_COUNT],
            reference_avg: 0.0,
            reference_samples: 0,
        })
    }

    pub fn settings(&self) -> &AccumulatorSettings {
        &self.settings
    }

    /// Mailbox read by the link session
    pub fn radio_buffer(&self) -> &RadioBuffer {
        &self.mailbox
    }

    /// Mailbox handle for the link session to drain
    pub fn radio_buffer_mut(&mut self) -> &mut RadioBuffer {
        &mut self.mailbox
    }

    pub fn radio_state(&self) -> &AccumulatorState {
        &self.radio
    }

    pub fn cloud_state(&self) -> &AccumulatorState {
        &self.cloud
    }

    /// Reference readings folded into the current 5-minute window
    pub fn reference_samples(&self) -> u32 {
        self.reference_samples
    }

    /// Fold one sampling cycle into every stream
    pub fn ingest(&mut self, snapshot: &SensorSnapshot) -> IngestReport {
        let radio = self.ingest_radio(snapshot);

        if self.settings.calibration_mode {
            if let Some(reference) = snapshot.reference_irradiance {
                self.reference_samples += 1;
                cumulative_update(&mut self.reference_avg, reference, self.reference_samples);
            }
        }

        let five_minute = self.ingest_cloud(snapshot);
        let calibration_reference = match five_minute {
            Some(_) if self.settings.calibration_mode => self.take_reference(),
            _ => None,
        };

        IngestReport {
            radio,
            five_minute,
            calibration_reference,
            fifteen_second: AveragedReading::from_snapshot(snapshot),
        }
    }

    /// Read the reference average of the window that just completed and
    /// start the next one empty
    fn take_reference(&mut self) -> Option<f32> {
        let samples = std::mem::take(&mut self.reference_samples);
        let avg = std::mem::take(&mut self.reference_avg);
        let window = self.cloud.threshold();

        if samples == 0 {
            debug!("No reference readings in this window");
            return None;
        }
        if samples < window {
            debug!("Reference average covers {} of {} samples", samples, window);
        }
        Some(avg)
    }

    fn ingest_radio(&mut self, snapshot: &SensorSnapshot) -> Tick {
        // The link session clears the mailbox; mirror that into the stream
        if self.radio.is_ready() && !self.mailbox.is_ready() {
            self.radio.consume();
        }

        let tick = self.radio.ingest(snapshot.irradiance_avg);
        debug!("Radio average count: {}", self.radio.sample_count());

        if tick.reset == Some(ResetCause::Stale) {
            info!("Radio payload not polled within {} samples, discarding", self.settings.radio_stale_threshold);
            self.mailbox.clear();
        }

        if tick.status.divisor().is_some() {
            self.last_timestamp.clone_from(&snapshot.timestamp);
        }

        if let StreamStatus::Latched { .. } = tick.status {
            let payload = format!("{}|{}|{:.2}", self.settings.tag, self.last_timestamp, self.radio.running_avg());
            info!("Radio payload ready: {}", payload);
            self.mailbox.publish(payload);
        }

        tick
    }

    fn ingest_cloud(&mut self, snapshot: &SensorSnapshot) -> Option<AveragedReading> {
        let tick = self.cloud.ingest(snapshot.irradiance_avg);
        debug!("Cloud average count: {}", self.cloud.sample_count());

        if let Some(count) = tick.status.divisor() {
            for (avg, reading) in self.cloud_per_panel.iter_mut().zip(snapshot.readings.iter()) {
                cumulative_update(avg, reading.irradiance, count);
            }
        }

        let irradiance_avg = self.cloud.consume()?;
        Some(AveragedReading {
            irradiance_avg,
            per_panel_avg: self.cloud_per_panel,
            timestamp: snapshot.timestamp.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::PanelReading;

    fn settings() -> AccumulatorSettings {
        AccumulatorSettings {
            tag: "NODE1".to_string(),
            radio_ready_threshold: 3,
            radio_stale_threshold: 6,
            cloud_threshold: 4,
            calibration_threshold: 5,
            calibration_mode: false,
        }
    }

    fn snapshot(irradiance: f32, timestamp: &str) -> SensorSnapshot {
        let reading = PanelReading {
            current_ma: 30.0,
            temperature_c: 25.0,
            irradiance,
        };
        SensorSnapshot {
            readings: [reading; PANEL_COUNT],
            irradiance_avg: irradiance,
            reference_irradiance: Some(irradiance + 10.0),
            timestamp: timestamp.to_string(),
        }
    }

    #[test]
    fn test_settings_validation() {
        assert!(settings().validate().is_ok());

        let mut bad = settings();
        bad.radio_stale_threshold = bad.radio_ready_threshold;
        assert!(bad.validate().is_err());

        let mut bad = settings();
        bad.cloud_threshold = 0;
        assert!(TelemetryAccumulator::new(bad).is_err());
    }

    #[test]
    fn test_radio_payload_published_at_threshold() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();

        acc.ingest(&snapshot(500.0, "14/03/25 10:15:12"));
        acc.ingest(&snapshot(510.0, "14/03/25 10:15:22"));
        assert!(!acc.radio_buffer().is_ready());

        acc.ingest(&snapshot(527.11, "14/03/25 10:15:32"));
        assert_eq!(acc.radio_buffer().peek(), Some("NODE1|14/03/25 10:15:32|512.37"));
    }

    #[test]
    fn test_drained_radio_payload_restarts_window() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();
        for _ in 0..3 {
            acc.ingest(&snapshot(500.0, "t"));
        }
        assert!(acc.radio_buffer_mut().take().is_some());

        let report = acc.ingest(&snapshot(250.0, "t"));

        assert_eq!(report.radio.reset, Some(ResetCause::Consumed));
        assert_eq!(acc.radio_state().running_avg(), 250.0);
        assert!(!acc.radio_buffer().is_ready());
    }

    #[test]
    fn test_undrained_radio_payload_is_held_then_evicted() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();
        for _ in 0..3 {
            acc.ingest(&snapshot(500.0, "old"));
        }

        // Held through the stale bound
        for _ in 0..3 {
            let report = acc.ingest(&snapshot(900.0, "later"));
            assert_eq!(report.radio.status, StreamStatus::Holding);
            assert_eq!(acc.radio_buffer().peek(), Some("NODE1|old|500.00"));
        }

        let report = acc.ingest(&snapshot(123.0, "fresh"));
        assert_eq!(report.radio.reset, Some(ResetCause::Stale));
        assert!(!acc.radio_buffer().is_ready());
        assert_eq!(acc.radio_state().running_avg(), 123.0);

        acc.ingest(&snapshot(123.0, "fresh"));
        acc.ingest(&snapshot(123.0, "fresh"));
        assert_eq!(acc.radio_buffer().peek(), Some("NODE1|fresh|123.00"));
    }

    #[test]
    fn test_five_minute_average_every_window() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();

        let mut produced = Vec::new();
        for (i, irradiance) in [100.0, 200.0, 300.0, 400.0, 800.0, 800.0, 800.0, 800.0].iter().enumerate() {
            if let Some(reading) = acc.ingest(&snapshot(*irradiance, &format!("t{}", i))).five_minute {
                produced.push(reading);
            }
        }

        assert_eq!(produced.len(), 2);
        assert_eq!(produced[0].irradiance_avg, 250.0);
        assert_eq!(produced[0].per_panel_avg, [250.0; PANEL_COUNT]);
        assert_eq!(produced[0].timestamp, "t3");
        assert_eq!(produced[1].irradiance_avg, 800.0, "second window must not blend the first");
        assert_eq!(produced[1].per_panel_avg, [800.0; PANEL_COUNT]);
    }

    #[test]
    fn test_per_panel_averages_tracked_independently() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();
        let mut result = None;

        for step in 0..4 {
            let mut snap = snapshot(0.0, "t");
            for (panel, reading) in snap.readings.iter_mut().enumerate() {
                reading.irradiance = (panel * 100 + step * 10) as f32;
            }
            snap.irradiance_avg = 42.0;
            result = acc.ingest(&snap).five_minute.or(result);
        }

        let reading = result.expect("window of 4 should complete");
        assert_eq!(reading.irradiance_avg, 42.0, "cross-panel average is taken as supplied");
        for (panel, avg) in reading.per_panel_avg.iter().enumerate() {
            assert!((avg - (panel as f32 * 100.0 + 15.0)).abs() < 1e-3);
        }
    }

    #[test]
    fn test_fifteen_second_stream_passes_through() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();
        let report = acc.ingest(&snapshot(321.0, "now"));

        assert_eq!(report.fifteen_second.irradiance_avg, 321.0);
        assert_eq!(report.fifteen_second.per_panel_avg, [321.0; PANEL_COUNT]);
        assert_eq!(report.fifteen_second.timestamp, "now");
    }

    #[test]
    fn test_calibration_mode_uses_longer_window_and_reference() {
        let mut settings = settings();
        settings.calibration_mode = true;
        let mut acc = TelemetryAccumulator::new(settings).unwrap();
        assert_eq!(acc.cloud_state().threshold(), 5);

        let mut reports = Vec::new();
        for _ in 0..5 {
            reports.push(acc.ingest(&snapshot(600.0, "t")));
        }

        assert!(reports[..4].iter().all(|r| r.five_minute.is_none()));
        assert!(reports[4].five_minute.is_some());
        assert_eq!(reports[4].calibration_reference, Some(610.0));
        assert_eq!(acc.reference_samples(), 0);

        // The next window starts from the next reading only
        acc.ingest(&snapshot(100.0, "t"));
        assert_eq!(acc.reference_samples(), 1);
    }

    #[test]
    fn test_reference_stays_with_its_window_after_missing_reading() {
        let mut settings = settings();
        settings.calibration_mode = true;
        settings.cloud_threshold = 3;
        settings.calibration_threshold = 3;
        let mut acc = TelemetryAccumulator::new(settings).unwrap();

        let mut references = vec![None, Some(100.0), Some(100.0)];
        references.extend(std::iter::repeat(Some(900.0)).take(6));

        let mut produced = Vec::new();
        for reference in references {
            let mut snap = snapshot(500.0, "t");
            snap.reference_irradiance = reference;
            produced.push(acc.ingest(&snap).calibration_reference);
        }

        assert_eq!(
            produced,
            vec![None, None, Some(100.0), None, None, Some(900.0), None, None, Some(900.0)]
        );
    }

    #[test]
    fn test_window_without_reference_uploads_none() {
        let mut settings = settings();
        settings.calibration_mode = true;
        let mut acc = TelemetryAccumulator::new(settings).unwrap();

        let mut last = None;
        for _ in 0..5 {
            let mut snap = snapshot(600.0, "t");
            snap.reference_irradiance = None;
            last = Some(acc.ingest(&snap));
        }

        let report = last.unwrap();
        assert!(report.five_minute.is_some());
        assert_eq!(report.calibration_reference, None);
    }

    #[test]
    fn test_no_reference_outside_calibration_mode() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();
        let mut reports = Vec::new();
        for _ in 0..4 {
            reports.push(acc.ingest(&snapshot(600.0, "t")));
        }

        assert!(reports[3].five_minute.is_some());
        assert_eq!(reports[3].calibration_reference, None);
        assert_eq!(acc.reference_samples(), 0);
    }

    #[test]
    fn test_placeholder_timestamp_threaded_through() {
        let mut acc = TelemetryAccumulator::new(settings()).unwrap();
        for _ in 0..3 {
            acc.ingest(&snapshot(1.0, "01/01/70 00:00:00"));
        }
        assert_eq!(acc.radio_buffer().peek(), Some("NODE1|01/01/70 00:00:00|1.00"));
    }
}
