//! # Link Session
//!
//! Gateway-polled exchange with a single ACK round.
//!
//! ```text
//! Idle -> AwaitingRequest -> Validating -> SendingAck -> SendingData -> AwaitingDataAck -> Idle
//! ```
//!
//! Every path ends in `Idle`: a timeout, a discarded frame, a missing gateway
//! ACK and a transport error all unwind there. Data is considered delivered
//! once it has been sent; a missing gateway ACK is logged and nothing is
//! retransmitted.

use super::decoder::decode;
use super::encoder::encode_packet;
use super::protocol::*;
use crate::error::Result;
use crate::radio::RadioTransport;
use crate::telemetry::mailbox::RadioBuffer;
use std::io;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Exchange state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    AwaitingRequest,
    Validating,
    SendingAck,
    SendingData,
    AwaitingDataAck,
}

/// Why an inbound frame produced no response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// Frame shorter than the header
    Malformed,
    /// Frame addressed to another node
    NotAddressed { to: u8 },
    /// Addressed to us, but not a data request
    Unrecognized,
}

/// Result of one [`LinkSession::poll_once`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Nothing arrived within the timeout
    NoActivity,
    /// A frame arrived and was ignored
    Discarded(DiscardReason),
    /// A request was answered
    Delivered {
        /// Address the ACK and data were sent to
        requester: u8,
        /// False when `NO_DATA` was sent
        had_data: bool,
        /// Whether the gateway confirmed receipt in time
        acknowledged: bool,
    },
}

/// Outcome of a bounded wait on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Frame(Vec<u8>),
    TimedOut,
}

/// Wait up to `timeout` for one inbound frame, sleeping `poll_interval` between attempts
pub async fn wait_for_frame<T: RadioTransport + ?Sized>(
    transport: &mut T,
    timeout: Duration,
    poll_interval: Duration,
) -> io::Result<WaitOutcome> {
    let deadline = Instant::now() + timeout;

    loop {
        if let Some(frame) = transport.try_receive_bytes().await? {
            return Ok(WaitOutcome::Frame(frame));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(WaitOutcome::TimedOut);
        }

        sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Addressing and timing for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// This node's radio address
    pub address: u8,
    /// Bound on each wait (request and gateway ACK)
    pub timeout: Duration,
    /// Sleep between receive attempts while waiting
    pub poll_interval: Duration,
}

/// Responds to gateway polls over a radio transport
pub struct LinkSession<T: RadioTransport> {
    transport: T,
    settings: LinkSettings,
    ids: MessageIdCounter,
    state: LinkState,
    request: Vec<u8>,
}

impl<T: RadioTransport> std::fmt::Debug for LinkSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSession")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<T: RadioTransport> LinkSession<T> {
    pub fn new(transport: T, settings: LinkSettings) -> Self {
        Self {
            transport,
            request: request_payload(settings.address),
            settings,
            ids: MessageIdCounter::default(),
            state: LinkState::Idle,
        }
    }

    /// Current state; `Idle` whenever no call is in progress
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Run one exchange: wait for a request, answer it, wait for the gateway ACK
    ///
    /// The ready payload in `mailbox` is taken once a valid request has been
    /// acknowledged, before the data frame goes out.
    ///
    /// # Errors
    ///
    /// Returns error only if the transport fails; the session is back in
    /// `Idle` either way.
    pub async fn poll_once(&mut self, mailbox: &mut RadioBuffer) -> Result<ExchangeOutcome> {
        let result = self.exchange(mailbox).await;
        self.enter(LinkState::Idle);
        result
    }

    async fn exchange(&mut self, mailbox: &mut RadioBuffer) -> Result<ExchangeOutcome> {
        self.enter(LinkState::AwaitingRequest);
        let frame = match self.wait(self.settings.timeout).await? {
            WaitOutcome::Frame(frame) => frame,
            WaitOutcome::TimedOut => return Ok(ExchangeOutcome::NoActivity),
        };

        self.enter(LinkState::Validating);
        let request = match decode(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                debug!("Discarding inbound frame: {}", e);
                return Ok(ExchangeOutcome::Discarded(DiscardReason::Malformed));
            }
        };

        if request.to != self.settings.address {
            debug!("Ignoring frame for node {} (we are {})", request.to, self.settings.address);
            return Ok(ExchangeOutcome::Discarded(DiscardReason::NotAddressed { to: request.to }));
        }

        if request.payload != self.request {
            debug!("Ignoring unrecognized request from {}: {:?}", request.from, request.payload_text());
            return Ok(ExchangeOutcome::Discarded(DiscardReason::Unrecognized));
        }

        self.enter(LinkState::SendingAck);
        self.send(request.from, ACK_PAYLOAD.to_vec()).await?;

        self.enter(LinkState::SendingData);
        let data = mailbox.take();
        let had_data = data.is_some();
        let payload = data.map(String::into_bytes).unwrap_or_else(|| NO_DATA_PAYLOAD.to_vec());
        self.send(request.from, payload).await?;

        self.enter(LinkState::AwaitingDataAck);
        let acknowledged = self.await_gateway_ack().await?;

        if acknowledged {
            info!("Gateway {} confirmed {}", request.from, if had_data { "data" } else { "NO_DATA" });
        } else {
            warn!("No ACK from gateway {} within {:?}; not retransmitting", request.from, self.settings.timeout);
        }

        Ok(ExchangeOutcome::Delivered {
            requester: request.from,
            had_data,
            acknowledged,
        })
    }

    /// Wait for an `ok` addressed to us, ignoring anything else until the deadline
    async fn await_gateway_ack(&mut self) -> Result<bool> {
        let deadline = Instant::now() + self.settings.timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let frame = match self.wait(remaining).await? {
                WaitOutcome::Frame(frame) => frame,
                WaitOutcome::TimedOut => return Ok(false),
            };

            match decode(&frame) {
                Ok(packet) if packet.to == self.settings.address && packet.payload == ACK_PAYLOAD => {
                    return Ok(true);
                }
                Ok(packet) => debug!("Ignoring frame while awaiting ACK: {:?}", packet.payload_text()),
                Err(e) => debug!("Discarding inbound frame while awaiting ACK: {}", e),
            }
        }
    }

    async fn wait(&mut self, timeout: Duration) -> io::Result<WaitOutcome> {
        wait_for_frame(&mut self.transport, timeout, self.settings.poll_interval).await
    }

    async fn send(&mut self, to: u8, payload: Vec<u8>) -> Result<()> {
        let packet = Packet::new(to, self.settings.address, self.ids.next_id(), FLAGS_NONE, payload)?;
        debug!("Sending {:?} to {} (id {})", packet.payload_text(), packet.to, packet.id);
        self.transport.send_bytes(&encode_packet(&packet)).await?;
        Ok(())
    }

    fn enter(&mut self, next: LinkState) {
        if self.state != next {
            debug!("Link state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
