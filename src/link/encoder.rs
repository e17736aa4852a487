//! # Radio Packet Encoder
//!
//! Serializes packets into on-air frames.

use super::protocol::*;

/// Encode header fields and payload into a complete radio frame
///
/// # Arguments
///
/// * `to` - Destination address
/// * `from` - Source address
/// * `id` - Message id
/// * `flags` - Reserved flags (0)
/// * `payload` - Payload bytes, copied verbatim
///
/// # Returns
///
/// * `Vec<u8>` - `[to][from][id][flags][payload...]`
///
/// # Examples
///
/// ```
/// use irradiance_node::link::encoder::encode;
///
/// let frame = encode(30, 22, 1, 0, b"ok");
/// assert_eq!(frame, vec![30, 22, 1, 0, b'o', b'k']);
/// ```
pub fn encode(to: u8, from: u8, id: u8, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.push(to);
    frame.push(from);
    frame.push(id);
    frame.push(flags);
    frame.extend_from_slice(payload);
    frame
}

/// Encode a [`Packet`] into a complete radio frame
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    encode(packet.to, packet.from, packet.id, packet.flags, &packet.payload)
}
