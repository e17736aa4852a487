//! # Telemetry Node
//!
//! Owns everything one field node needs and runs its two cycles:
//!
//! - [`TelemetryNode::radio_cycle`] answers at most one gateway poll
//! - [`TelemetryNode::sample_cycle`] reads the panels, feeds the accumulator,
//!   logs snapshots and uploads whatever completed
//!
//! Both run on the same task, so the radio mailbox needs no locking.

use crate::error::Result;
use crate::link::{ExchangeOutcome, LinkSession};
use crate::radio::RadioTransport;
use crate::sensors::{cross_panel_average, Clock, PanelSource};
use crate::telemetry::{AveragedReading, IngestReport, SensorSnapshot, SnapshotLogger, Stream, TelemetryAccumulator};
use crate::upload::{Destination, HttpTransport, UploadOutcome, UploadPayloadBuilder, Uploader};
use tracing::{debug, info, warn};

/// Running counters, logged periodically by the main loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    pub samples: u64,
    pub polls_answered: u64,
    pub payloads_delivered: u64,
    pub missed_acks: u64,
    pub frames_discarded: u64,
    pub uploads_ok: u64,
    pub uploads_failed: u64,
}

/// What one sampling cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub ingest: IngestReport,
    pub uploads: Vec<(Destination, UploadOutcome)>,
}

/// Node context: link session, accumulator, collaborators
pub struct TelemetryNode<R, H, S, C>
where
    R: RadioTransport,
    H: HttpTransport,
    S: PanelSource,
    C: Clock,
{
    session: LinkSession<R>,
    accumulator: TelemetryAccumulator,
    source: S,
    clock: C,
    uploader: Option<Uploader<H>>,
    fifteen_second_uploads: bool,
    logger: Option<SnapshotLogger>,
    gateway_address: Option<u8>,
    stats: NodeStats,
}

impl<R, H, S, C> std::fmt::Debug for TelemetryNode<R, H, S, C>
where
    R: RadioTransport,
    H: HttpTransport,
    S: PanelSource,
    C: Clock,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryNode")
            .field("session", &self.session)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<R, H, S, C> TelemetryNode<R, H, S, C>
where
    R: RadioTransport,
    H: HttpTransport,
    S: PanelSource,
    C: Clock,
{
    /// Node with radio and sampling only; add uploads and logging with the `with_*` methods
    pub fn new(session: LinkSession<R>, accumulator: TelemetryAccumulator, source: S, clock: C) -> Self {
        Self {
            session,
            accumulator,
            source,
            clock,
            uploader: None,
            fifteen_second_uploads: false,
            logger: None,
            gateway_address: None,
            stats: NodeStats::default(),
        }
    }

    /// Upload completed averages; 15-second uploads only if `fifteen_second` is set
    pub fn with_uploader(mut self, uploader: Uploader<H>, fifteen_second: bool) -> Self {
        self.uploader = Some(uploader);
        self.fifteen_second_uploads = fifteen_second;
        self
    }

    pub fn with_logger(mut self, logger: SnapshotLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Warn when a poll comes from anyone else
    pub fn with_expected_gateway(mut self, address: u8) -> Self {
        self.gateway_address = Some(address);
        self
    }

    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    pub fn accumulator(&self) -> &TelemetryAccumulator {
        &self.accumulator
    }

    /// Answer at most one gateway poll
    ///
    /// # Errors
    ///
    /// Returns error if the radio transport fails
    pub async fn radio_cycle(&mut self) -> Result<ExchangeOutcome> {
        let outcome = self.session.poll_once(self.accumulator.radio_buffer_mut()).await?;

        match outcome {
            ExchangeOutcome::NoActivity => {}
            ExchangeOutcome::Discarded(reason) => {
                self.stats.frames_discarded += 1;
                debug!("Frame discarded: {:?}", reason);
            }
            ExchangeOutcome::Delivered {
                requester,
                had_data,
                acknowledged,
            } => {
                self.stats.polls_answered += 1;
                if had_data {
                    self.stats.payloads_delivered += 1;
                }
                if !acknowledged {
                    self.stats.missed_acks += 1;
                }
                if self.gateway_address.is_some_and(|gateway| gateway != requester) {
                    warn!("Answered poll from unexpected address {}", requester);
                }
            }
        }

        Ok(outcome)
    }

    /// Sample, accumulate, log and upload
    ///
    /// Upload and snapshot-log failures are logged and counted, never raised.
    ///
    /// # Errors
    ///
    /// Returns error if the panel source fails
    pub async fn sample_cycle(&mut self) -> Result<SampleReport> {
        let readings = self.source.read_panels()?;
        let reference_irradiance = if self.accumulator.settings().calibration_mode {
            self.source.reference_irradiance()?
        } else {
            None
        };

        let snapshot = SensorSnapshot {
            irradiance_avg: cross_panel_average(&readings),
            readings,
            reference_irradiance,
            timestamp: self.clock.timestamp(),
        };
        debug!("Sampled {:.2} W/m² at {}", snapshot.irradiance_avg, snapshot.timestamp);

        let ingest = self.accumulator.ingest(&snapshot);
        self.stats.samples += 1;

        let calibration_mode = self.accumulator.settings().calibration_mode;
        let mut completed: Vec<(Destination, &AveragedReading, Option<f32>)> = Vec::new();

        if let Some(reading) = &ingest.five_minute {
            let (stream, destination) = if calibration_mode {
                (Stream::Calibration, Destination::Calibration)
            } else {
                (Stream::FiveMinute, Destination::FiveMinute)
            };
            info!("{} average ready: {:.2} W/m²", destination, reading.irradiance_avg);
            self.log_snapshot(stream, reading, ingest.calibration_reference);
            completed.push((destination, reading, ingest.calibration_reference));
        }

        self.log_snapshot(Stream::FifteenSecond, &ingest.fifteen_second, None);
        if self.fifteen_second_uploads {
            completed.push((Destination::FifteenSecond, &ingest.fifteen_second, None));
        }

        let mut uploads = Vec::new();
        if let Some(uploader) = &self.uploader {
            for (destination, reading, reference) in completed {
                let payload = UploadPayloadBuilder::build(reading, destination, reference);
                let outcome = uploader.upload(&payload).await;
                if outcome.is_uploaded() {
                    self.stats.uploads_ok += 1;
                } else {
                    self.stats.uploads_failed += 1;
                }
                uploads.push((destination, outcome));
            }
        }

        Ok(SampleReport { ingest, uploads })
    }

    fn log_snapshot(&mut self, stream: Stream, reading: &AveragedReading, reference: Option<f32>) {
        if let Some(logger) = self.logger.as_mut() {
            if let Err(e) = logger.record(stream, reading, reference) {
                warn!("Failed to log {:?} snapshot: {}", stream, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;
    use crate::link::decoder::decode;
    use crate::link::encoder::encode;
    use crate::link::LinkSettings;
    use crate::radio::port_trait::mocks::MockRadio;
    use crate::sensors::clock::mocks::FixedClock;
    use crate::telemetry::types::{PanelBatch, PanelReading, PANEL_COUNT};
    use crate::telemetry::AccumulatorSettings;
    use crate::upload::transport::MockHttpTransport;
    use crate::upload::UploadTargets;
    use std::time::Duration;
    use tempfile::TempDir;

    const NODE: u8 = 22;
    const GATEWAY: u8 = 30;
    const STAMP: &str = "14/03/25 10:15:32";

    /// Every panel reads the same irradiance
    struct SteadyPanels {
        irradiance: f32,
        reference: Option<f32>,
        fail: bool,
    }

    impl SteadyPanels {
        fn new(irradiance: f32) -> Self {
            Self {
                irradiance,
                reference: None,
                fail: false,
            }
        }
    }

    impl PanelSource for SteadyPanels {
        fn read_panels(&mut self) -> Result<PanelBatch> {
            if self.fail {
                return Err(NodeError::Io(std::io::Error::new(std::io::ErrorKind::Other, "bus fault")));
            }
            let reading = PanelReading {
                current_ma: 30.0,
                temperature_c: 25.0,
                irradiance: self.irradiance,
            };
            Ok([reading; PANEL_COUNT])
        }

        fn reference_irradiance(&mut self) -> Result<Option<f32>> {
            Ok(self.reference)
        }
    }

    fn accumulator(calibration_mode: bool) -> TelemetryAccumulator {
        TelemetryAccumulator::new(AccumulatorSettings {
            tag: "NODE1".to_string(),
            radio_ready_threshold: 2,
            radio_stale_threshold: 5,
            cloud_threshold: 3,
            calibration_threshold: 4,
            calibration_mode,
        })
        .unwrap()
    }

    fn targets() -> UploadTargets {
        UploadTargets {
            server: "http://example.test/update".to_string(),
            five_minute_key: "KEY5".to_string(),
            fifteen_second_key: "KEY15".to_string(),
            calibration_key: "KEYCAL".to_string(),
        }
    }

    fn node(
        source: SteadyPanels,
        calibration_mode: bool,
    ) -> (TelemetryNode<MockRadio, MockHttpTransport, SteadyPanels, FixedClock>, MockRadio) {
        let radio = MockRadio::new();
        let session = LinkSession::new(
            radio.clone(),
            LinkSettings {
                address: NODE,
                timeout: Duration::from_millis(20),
                poll_interval: Duration::from_millis(1),
            },
        );
        let node = TelemetryNode::new(session, accumulator(calibration_mode), source, FixedClock(STAMP.to_string()))
            .with_expected_gateway(GATEWAY);
        (node, radio)
    }

    #[tokio::test]
    async fn test_sampled_average_delivered_to_gateway() {
        let (mut node, radio) = node(SteadyPanels::new(500.0), false);

        node.sample_cycle().await.unwrap();
        node.sample_cycle().await.unwrap();
        assert!(node.accumulator().radio_buffer().is_ready());

        radio.push_inbound(encode(NODE, GATEWAY, 1, 0, b"Data!22"));
        radio.push_inbound(encode(NODE, GATEWAY, 2, 0, b"ok"));

        let outcome = node.radio_cycle().await.unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Delivered {
                requester: GATEWAY,
                had_data: true,
                acknowledged: true,
            }
        );

        let sent = radio.get_sent();
        assert_eq!(sent.len(), 2);
        let data = decode(&sent[1]).unwrap();
        assert_eq!(data.to, GATEWAY);
        assert_eq!(data.from, NODE);
        assert_eq!(data.payload_text(), "NODE1|14/03/25 10:15:32|500.00");

        assert!(!node.accumulator().radio_buffer().is_ready());
        let stats = node.stats();
        assert_eq!(stats.polls_answered, 1);
        assert_eq!(stats.payloads_delivered, 1);
        assert_eq!(stats.missed_acks, 0);
    }

    #[tokio::test]
    async fn test_repeated_poll_gets_no_data() {
        let (mut node, radio) = node(SteadyPanels::new(500.0), false);
        node.sample_cycle().await.unwrap();
        node.sample_cycle().await.unwrap();

        for id in [1, 3] {
            radio.push_inbound(encode(NODE, GATEWAY, id, 0, b"Data!22"));
            node.radio_cycle().await.unwrap();
        }

        let sent = radio.get_sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(decode(&sent[3]).unwrap().payload, b"NO_DATA".to_vec());

        let stats = node.stats();
        assert_eq!(stats.polls_answered, 2);
        assert_eq!(stats.payloads_delivered, 1);
        assert_eq!(stats.missed_acks, 2);
    }

    #[tokio::test]
    async fn test_discarded_frames_counted() {
        let (mut node, radio) = node(SteadyPanels::new(500.0), false);
        radio.push_inbound(encode(NODE, GATEWAY, 1, 0, b"hello"));

        let outcome = node.radio_cycle().await.unwrap();

        assert!(matches!(outcome, ExchangeOutcome::Discarded(_)));
        assert_eq!(node.stats().frames_discarded, 1);
        assert!(radio.get_sent().is_empty());
    }

    #[tokio::test]
    async fn test_radio_error_surfaces() {
        let (mut node, radio) = node(SteadyPanels::new(500.0), false);
        radio.set_send_error(std::io::ErrorKind::BrokenPipe);
        radio.push_inbound(encode(NODE, GATEWAY, 1, 0, b"Data!22"));

        assert!(node.radio_cycle().await.is_err());
    }

    #[tokio::test]
    async fn test_five_minute_upload_at_threshold() {
        let mut http = MockHttpTransport::new();
        http.expect_http_get()
            .withf(|url| {
                url == "http://example.test/update?api_key=KEY5\
                        &field1=640.00&field2=640.00&field3=640.00&field4=640.00\
                        &field5=640.00&field6=640.00&field7=640.00"
            })
            .times(1)
            .returning(|_| Ok(200));

        let (node, _radio) = node(SteadyPanels::new(640.0), false);
        let mut node = node.with_uploader(Uploader::new(http, targets()), false);

        assert!(node.sample_cycle().await.unwrap().uploads.is_empty());
        assert!(node.sample_cycle().await.unwrap().uploads.is_empty());

        let report = node.sample_cycle().await.unwrap();
        assert_eq!(
            report.uploads,
            vec![(Destination::FiveMinute, UploadOutcome::Uploaded { status: 200 })]
        );
        assert_eq!(node.stats().uploads_ok, 1);
    }

    #[tokio::test]
    async fn test_fifteen_second_upload_every_cycle() {
        let mut http = MockHttpTransport::new();
        http.expect_http_get()
            .withf(|url| url.contains("api_key=KEY15&"))
            .times(2)
            .returning(|_| Ok(200));

        let (node, _radio) = node(SteadyPanels::new(300.0), false);
        let mut node = node.with_uploader(Uploader::new(http, targets()), true);

        for _ in 0..2 {
            let report = node.sample_cycle().await.unwrap();
            assert_eq!(report.uploads.len(), 1);
            assert_eq!(report.uploads[0].0, Destination::FifteenSecond);
        }
    }

    #[tokio::test]
    async fn test_calibration_mode_uploads_reference() {
        let mut http = MockHttpTransport::new();
        http.expect_http_get()
            .withf(|url| url.starts_with("http://example.test/update?api_key=KEYCAL&") && url.ends_with("&field8=990.00"))
            .times(1)
            .returning(|_| Ok(200));

        let mut source = SteadyPanels::new(950.0);
        source.reference = Some(990.0);
        let (node, _radio) = node(source, true);
        let mut node = node.with_uploader(Uploader::new(http, targets()), false);

        // Calibration window is 4 samples in these settings
        for _ in 0..3 {
            assert!(node.sample_cycle().await.unwrap().uploads.is_empty());
        }
        let report = node.sample_cycle().await.unwrap();
        assert_eq!(report.ingest.calibration_reference, Some(990.0));
        assert_eq!(report.uploads[0].0, Destination::Calibration);
    }

    #[tokio::test]
    async fn test_failed_upload_is_not_fatal() {
        let mut http = MockHttpTransport::new();
        http.expect_http_get().times(1).returning(|_| Ok(503));

        let (node, _radio) = node(SteadyPanels::new(100.0), false);
        let mut node = node.with_uploader(Uploader::new(http, targets()), false);

        for _ in 0..3 {
            node.sample_cycle().await.unwrap();
        }

        assert_eq!(node.stats().uploads_failed, 1);
        // Next window starts fresh; nothing is retried
        let report = node.sample_cycle().await.unwrap();
        assert!(report.uploads.is_empty());
        assert!(report.ingest.five_minute.is_none());
    }

    #[tokio::test]
    async fn test_sensor_failure_surfaces() {
        let mut source = SteadyPanels::new(100.0);
        source.fail = true;
        let (mut node, _radio) = node(source, false);

        assert!(node.sample_cycle().await.is_err());
        assert_eq!(node.stats().samples, 0);
    }

    #[tokio::test]
    async fn test_snapshots_logged() {
        let dir = TempDir::new().unwrap();
        let logger = SnapshotLogger::new(dir.path(), 100, 2).unwrap();

        let (node, _radio) = node(SteadyPanels::new(700.0), false);
        let mut node = node.with_logger(logger);

        for _ in 0..3 {
            node.sample_cycle().await.unwrap();
        }

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let contents = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
        let streams: Vec<String> = contents
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["stream"].as_str().unwrap().to_string())
            .collect();

        assert_eq!(streams, vec!["fifteen_second", "fifteen_second", "five_minute", "fifteen_second"]);
    }
}
