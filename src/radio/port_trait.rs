//! Trait abstraction for the radio link so the session can be tested without a modem

use async_trait::async_trait;
use std::io;

/// Packet-oriented radio transport
///
/// Each call moves one whole radio frame; the transport owns frame
/// boundaries and discards frames its own integrity check rejects.
#[async_trait]
pub trait RadioTransport: Send {
    /// Transmit one frame
    async fn send_bytes(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Return the next received frame if one is already available, without waiting
    async fn try_receive_bytes(&mut self) -> io::Result<Option<Vec<u8>>>;
}
