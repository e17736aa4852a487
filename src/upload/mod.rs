//! # Upload Module
//!
//! Formats averaged readings into the query-string upload and sends it.
//!
//! ```text
//! <server>?api_key=<key>&field1=<p1>&...&field6=<p6>&field7=<avg>[&field8=<ref>]
//! ```
//!
//! Every value is rendered with two decimals. The destination picks the API key.

pub mod transport;

pub use transport::{HttpTransport, ReqwestTransport};

use crate::telemetry::types::{AveragedReading, PANEL_COUNT};
use tracing::{info, warn};

/// Default upload endpoint
pub const DEFAULT_SERVER: &str = "http://api.thingspeak.com/update";

/// Which channel an upload goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    FiveMinute,
    FifteenSecond,
    Calibration,
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Destination::FiveMinute => "5-minute",
            Destination::FifteenSecond => "15-second",
            Destination::Calibration => "calibration",
        };
        f.write_str(name)
    }
}

/// Ordered upload fields for one destination
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPayload {
    pub destination: Destination,
    pub fields: Vec<(String, f32)>,
}

impl UploadPayload {
    /// Render the full request URL
    pub fn render(&self, server: &str, api_key: &str) -> String {
        let mut url = format!("{}?api_key={}", server, api_key);
        for (name, value) in &self.fields {
            url.push_str(&format!("&{}={:.2}", name, value));
        }
        url
    }
}

/// Builds [`UploadPayload`]s from averaged readings
pub struct UploadPayloadBuilder;

impl UploadPayloadBuilder {
    /// Per-panel fields in panel order, then the cross-panel average, then the
    /// calibration reference if one is given
    ///
    /// # Examples
    ///
    /// ```
    /// use irradiance_node::telemetry::AveragedReading;
    /// use irradiance_node::upload::{Destination, UploadPayloadBuilder};
    ///
    /// let reading = AveragedReading {
    ///     irradiance_avg: 350.0,
    ///     per_panel_avg: [100.0, 200.0, 300.0, 400.0, 500.0, 600.0],
    ///     timestamp: String::new(),
    /// };
    /// let payload = UploadPayloadBuilder::build(&reading, Destination::FifteenSecond, None);
    /// assert_eq!(payload.fields.len(), 7);
    /// assert_eq!(payload.fields[6], ("field7".to_string(), 350.0));
    /// ```
    pub fn build(reading: &AveragedReading, destination: Destination, calibration_reference: Option<f32>) -> UploadPayload {
        let mut fields = Vec::with_capacity(PANEL_COUNT + 2);

        for (i, value) in reading.per_panel_avg.iter().enumerate() {
            fields.push((field_name(i + 1), *value));
        }
        fields.push((field_name(PANEL_COUNT + 1), reading.irradiance_avg));

        if let Some(reference) = calibration_reference {
            fields.push((field_name(PANEL_COUNT + 2), reference));
        }

        UploadPayload { destination, fields }
    }
}

fn field_name(index: usize) -> String {
    format!("field{}", index)
}

/// Endpoint and per-destination API keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTargets {
    pub server: String,
    pub five_minute_key: String,
    pub fifteen_second_key: String,
    pub calibration_key: String,
}

impl UploadTargets {
    pub fn key_for(&self, destination: Destination) -> &str {
        match destination {
            Destination::FiveMinute => &self.five_minute_key,
            Destination::FifteenSecond => &self.fifteen_second_key,
            Destination::Calibration => &self.calibration_key,
        }
    }

    /// Request URL for `payload`
    pub fn url_for(&self, payload: &UploadPayload) -> String {
        payload.render(&self.server, self.key_for(payload.destination))
    }
}

/// Result of one upload attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Server answered with a success status
    Uploaded { status: u16 },
    /// Transport error or non-success status; the reading is not retried
    Failed { reason: String },
}

impl UploadOutcome {
    pub fn is_uploaded(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

/// Sends payloads through an [`HttpTransport`]
pub struct Uploader<H: HttpTransport> {
    transport: H,
    targets: UploadTargets,
}

impl<H: HttpTransport> std::fmt::Debug for Uploader<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Uploader")
            .field("server", &self.targets.server)
            .finish_non_exhaustive()
    }
}

impl<H: HttpTransport> Uploader<H> {
    pub fn new(transport: H, targets: UploadTargets) -> Self {
        Self { transport, targets }
    }

    pub fn targets(&self) -> &UploadTargets {
        &self.targets
    }

    /// Send one payload; failures are reported, never raised
    pub async fn upload(&self, payload: &UploadPayload) -> UploadOutcome {
        let url = self.targets.url_for(payload);

        match self.transport.http_get(&url).await {
            Ok(status) if (200..300).contains(&status) => {
                info!("Uploaded {} average (HTTP {})", payload.destination, status);
                UploadOutcome::Uploaded { status }
            }
            Ok(status) => {
                warn!("{} upload rejected with HTTP {}", payload.destination, status);
                UploadOutcome::Failed {
                    reason: format!("HTTP status {}", status),
                }
            }
            Err(e) => {
                warn!("{} upload failed: {}", payload.destination, e);
                UploadOutcome::Failed { reason: e.to_string() }
            }
        }
    }
}
