//! # Radio Link Protocol Constants and Types
//!
//! Core definitions for the gateway-polled radio link.
//!
//! Frame layout on air: `[to][from][id][flags][payload...]`. The payload is
//! ASCII and carries no length field; the frame boundary comes from the radio
//! transport.

use crate::error::{NodeError, Result};

/// Header length in bytes (to, from, id, flags)
pub const HEADER_LEN: usize = 4;

/// Maximum radio frame size
pub const MAX_FRAME_SIZE: usize = 255;

/// Maximum payload size (frame minus header)
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_LEN;

/// Prefix of a gateway data request; the node address follows in decimal
pub const REQUEST_PREFIX: &str = "Data!";

/// Acknowledgement payload, used in both directions
pub const ACK_PAYLOAD: &[u8] = b"ok";

/// Sent instead of data when no buffer is ready
pub const NO_DATA_PAYLOAD: &[u8] = b"NO_DATA";

/// Reserved flags value
pub const FLAGS_NONE: u8 = 0;

/// Build the exact request payload a gateway sends to poll `address`.
///
/// # Examples
///
/// ```
/// use irradiance_node::link::protocol::request_payload;
///
/// assert_eq!(request_payload(22), b"Data!22".to_vec());
/// ```
pub fn request_payload(address: u8) -> Vec<u8> {
    format!("{}{}", REQUEST_PREFIX, address).into_bytes()
}

/// A single radio packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Destination address
    pub to: u8,

    /// Source address
    pub from: u8,

    /// Per-sender message counter (wraps at 256)
    pub id: u8,

    /// Reserved, always 0 in current use
    pub flags: u8,

    /// Payload bytes (ASCII in practice)
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a new packet
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds MAX_PAYLOAD_SIZE (251 bytes)
    pub fn new(to: u8, from: u8, id: u8, flags: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(NodeError::Frame(
                format!("Payload size {} exceeds maximum {}", payload.len(), MAX_PAYLOAD_SIZE)
            ));
        }

        Ok(Self {
            to,
            from,
            id,
            flags,
            payload,
        })
    }

    /// Total encoded length (header + payload)
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Header-only packet; its encoded length is still [`HEADER_LEN`]
    pub fn payload_is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload as text, lossy for non-UTF-8 bytes (for logging)
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Wrapping per-sender message id counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageIdCounter {
    next: u8,
}

impl MessageIdCounter {
    /// Start counting from `first`
    pub fn starting_at(first: u8) -> Self {
        Self { next: first }
    }

    /// Take the next id, wrapping 255 -> 0
    pub fn next_id(&mut self) -> u8 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }
}
